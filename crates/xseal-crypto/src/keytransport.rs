#![forbid(unsafe_code)]

//! Key transport algorithms (RSA PKCS#1 v1.5, RSA-OAEP with MGF1-SHA1).

use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use xseal_core::{algorithm, Error};

/// Trait for key transport algorithms.
pub trait KeyTransportAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn encrypt(&self, public_key: &RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error>;
    fn decrypt(&self, private_key: &RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>, Error>;
}

/// RSA-OAEP parameters read from an `EncryptionMethod`.
#[derive(Debug, Clone, Default)]
pub struct OaepParams {
    /// `ds:DigestMethod` URI; SHA-1 when absent.
    pub digest_uri: Option<String>,
    /// Decoded `xenc:OAEPparams` label.
    pub label: Option<Vec<u8>>,
}

/// Create a key transport algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn KeyTransportAlgorithm>, Error> {
    from_uri_with_params(uri, OaepParams::default())
}

/// Create a key transport algorithm from its URI with RSA-OAEP parameters.
pub fn from_uri_with_params(
    uri: &str,
    params: OaepParams,
) -> Result<Box<dyn KeyTransportAlgorithm>, Error> {
    match uri {
        algorithm::RSA_PKCS1 => Ok(Box::new(RsaPkcs1Transport)),
        algorithm::RSA_OAEP => Ok(Box::new(RsaOaepTransport { params })),
        _ => Err(Error::UnsupportedAlgorithm(format!("key transport: {uri}"))),
    }
}

struct RsaPkcs1Transport;

impl KeyTransportAlgorithm for RsaPkcs1Transport {
    fn uri(&self) -> &'static str {
        algorithm::RSA_PKCS1
    }

    fn encrypt(&self, public_key: &RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut rng = rand::thread_rng();
        public_key
            .encrypt(&mut rng, Pkcs1v15Encrypt, key_data)
            .map_err(|e| Error::Crypto(format!("RSA PKCS#1 encrypt: {e}")))
    }

    fn decrypt(&self, private_key: &RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        private_key
            .decrypt(Pkcs1v15Encrypt, encrypted)
            .map_err(|e| Error::Crypto(format!("RSA PKCS#1 decrypt: {e}")))
    }
}

/// `rsa-oaep-mgf1p`: MGF1 always uses SHA-1, the digest method only drives
/// the label hash.
struct RsaOaepTransport {
    params: OaepParams,
}

impl RsaOaepTransport {
    fn padding(&self) -> Result<Oaep, Error> {
        let mut padding = match self.params.digest_uri.as_deref() {
            None | Some(algorithm::SHA1) => Oaep::new_with_mgf_hash::<sha1::Sha1, sha1::Sha1>(),
            Some(algorithm::SHA256) => Oaep::new_with_mgf_hash::<sha2::Sha256, sha1::Sha1>(),
            Some(algorithm::SHA384) => Oaep::new_with_mgf_hash::<sha2::Sha384, sha1::Sha1>(),
            Some(algorithm::SHA512) => Oaep::new_with_mgf_hash::<sha2::Sha512, sha1::Sha1>(),
            Some(other) => {
                return Err(Error::UnsupportedAlgorithm(format!("RSA-OAEP digest: {other}")))
            }
        };
        if let Some(label) = &self.params.label {
            let label = String::from_utf8(label.clone())
                .map_err(|_| Error::Crypto("RSA-OAEP label is not valid UTF-8".into()))?;
            padding.label = Some(label);
        }
        Ok(padding)
    }
}

impl KeyTransportAlgorithm for RsaOaepTransport {
    fn uri(&self) -> &'static str {
        algorithm::RSA_OAEP
    }

    fn encrypt(&self, public_key: &RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut rng = rand::thread_rng();
        public_key
            .encrypt(&mut rng, self.padding()?, key_data)
            .map_err(|e| Error::Crypto(format!("RSA-OAEP encrypt: {e}")))
    }

    fn decrypt(&self, private_key: &RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        private_key
            .decrypt(self.padding()?, encrypted)
            .map_err(|e| Error::Crypto(format!("RSA-OAEP decrypt: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkcs1_and_oaep_roundtrip() {
        let sk = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pk = sk.to_public_key();
        let session = [0x5au8; 32];

        let pkcs1 = from_uri(algorithm::RSA_PKCS1).unwrap();
        let wrapped = pkcs1.encrypt(&pk, &session).unwrap();
        assert_eq!(pkcs1.decrypt(&sk, &wrapped).unwrap(), session);

        let params = OaepParams {
            digest_uri: Some(algorithm::SHA256.into()),
            label: Some(b"ctx".to_vec()),
        };
        let oaep = from_uri_with_params(algorithm::RSA_OAEP, params).unwrap();
        let wrapped = oaep.encrypt(&pk, &session).unwrap();
        assert_eq!(oaep.decrypt(&sk, &wrapped).unwrap(), session);
        // A different label must not unwrap.
        let plain = from_uri(algorithm::RSA_OAEP).unwrap();
        assert!(plain.decrypt(&sk, &wrapped).is_err());
    }

    #[test]
    fn test_unknown_transport() {
        assert!(from_uri("http://www.w3.org/2009/xmlenc11#rsa-oaep").is_err());
    }
}

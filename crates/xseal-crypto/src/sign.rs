#![forbid(unsafe_code)]

//! Signature algorithm implementations (RSA PKCS#1 v1.5, ECDSA).
//!
//! ECDSA algorithms name only the digest; the curve comes from the key.
//! Signatures use the XML-DSig `r || s` encoding.

use signature::hazmat::{PrehashSigner, PrehashVerifier};
use signature::SignatureEncoding;
use xseal_core::{algorithm, Error};

use crate::digest;

/// Key material for signature operations.
#[derive(Clone)]
pub enum SigningKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP256Public(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::SigningKey),
    EcP384Public(p384::ecdsa::VerifyingKey),
}

impl SigningKey {
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Rsa(_) | Self::EcP256(_) | Self::EcP384(_))
    }

    /// The public half of this key.
    pub fn to_public(&self) -> SigningKey {
        match self {
            Self::Rsa(k) => Self::RsaPublic(k.to_public_key()),
            Self::EcP256(k) => Self::EcP256Public(*k.verifying_key()),
            Self::EcP384(k) => Self::EcP384Public(*k.verifying_key()),
            other => other.clone(),
        }
    }

    /// Short algorithm family name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rsa(_) | Self::RsaPublic(_) => "RSA",
            Self::EcP256(_) | Self::EcP256Public(_) => "EC P-256",
            Self::EcP384(_) | Self::EcP384Public(_) => "EC P-384",
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let visibility = if self.is_private() { "private" } else { "public" };
        write!(f, "SigningKey({} {visibility})", self.kind())
    }
}

/// Trait for signature algorithms.
pub trait SignatureAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error>;
    fn verify(&self, key: &SigningKey, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    use Family::{Ecdsa as E, Rsa as R};
    let (uri, family, hash) = match uri {
        algorithm::RSA_SHA1 => (algorithm::RSA_SHA1, R, HashType::Sha1),
        algorithm::RSA_SHA224 => (algorithm::RSA_SHA224, R, HashType::Sha224),
        algorithm::RSA_SHA256 => (algorithm::RSA_SHA256, R, HashType::Sha256),
        algorithm::RSA_SHA384 => (algorithm::RSA_SHA384, R, HashType::Sha384),
        algorithm::RSA_SHA512 => (algorithm::RSA_SHA512, R, HashType::Sha512),
        algorithm::ECDSA_SHA1 => (algorithm::ECDSA_SHA1, E, HashType::Sha1),
        algorithm::ECDSA_SHA224 => (algorithm::ECDSA_SHA224, E, HashType::Sha224),
        algorithm::ECDSA_SHA256 => (algorithm::ECDSA_SHA256, E, HashType::Sha256),
        algorithm::ECDSA_SHA384 => (algorithm::ECDSA_SHA384, E, HashType::Sha384),
        algorithm::ECDSA_SHA512 => (algorithm::ECDSA_SHA512, E, HashType::Sha512),
        _ => return Err(Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}"))),
    };
    let alg: Box<dyn SignatureAlgorithm> = match family {
        Family::Rsa => Box::new(RsaPkcs1v15 { uri, hash }),
        Family::Ecdsa => Box::new(Ecdsa { uri, hash }),
    };
    Ok(alg)
}

/// Whether `uri` names an ECDSA algorithm.
pub fn is_ecdsa(uri: &str) -> bool {
    uri.contains("#ecdsa-")
}

enum Family {
    Rsa,
    Ecdsa,
}

#[derive(Debug, Clone, Copy)]
enum HashType {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashType {
    fn digest_uri(self) -> &'static str {
        match self {
            HashType::Sha1 => algorithm::SHA1,
            HashType::Sha224 => algorithm::SHA224,
            HashType::Sha256 => algorithm::SHA256,
            HashType::Sha384 => algorithm::SHA384,
            HashType::Sha512 => algorithm::SHA512,
        }
    }
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    uri: &'static str,
    hash: HashType,
}

impl RsaPkcs1v15 {
    fn sign_with_key(&self, private_key: &rsa::RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        macro_rules! do_sign {
            ($hasher:ty) => {{
                let sk = rsa::pkcs1v15::SigningKey::<$hasher>::new(private_key.clone());
                let sig = sk
                    .try_sign(data)
                    .map_err(|e| Error::Crypto(format!("RSA sign: {e}")))?;
                Ok(sig.to_vec())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_sign!(sha1::Sha1),
            HashType::Sha224 => do_sign!(sha2::Sha224),
            HashType::Sha256 => do_sign!(sha2::Sha256),
            HashType::Sha384 => do_sign!(sha2::Sha384),
            HashType::Sha512 => do_sign!(sha2::Sha512),
        }
    }

    fn verify_with_key(
        &self,
        public_key: &rsa::RsaPublicKey,
        data: &[u8],
        sig_bytes: &[u8],
    ) -> Result<bool, Error> {
        use signature::Verifier;
        let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key.clone());
                Ok(vk.verify(data, &sig).is_ok())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_verify!(sha1::Sha1),
            HashType::Sha224 => do_verify!(sha2::Sha224),
            HashType::Sha256 => do_verify!(sha2::Sha256),
            HashType::Sha384 => do_verify!(sha2::Sha384),
            HashType::Sha512 => do_verify!(sha2::Sha512),
        }
    }
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        match key {
            SigningKey::Rsa(pk) => self.sign_with_key(pk, data),
            other => Err(Error::Key(format!(
                "{} requires an RSA private key, got {other:?}",
                self.uri
            ))),
        }
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let pubk = match key {
            SigningKey::Rsa(pk) => pk.to_public_key(),
            SigningKey::RsaPublic(pk) => pk.clone(),
            other => {
                return Err(Error::Key(format!(
                    "{} requires an RSA key, got {other:?}",
                    self.uri
                )))
            }
        };
        self.verify_with_key(&pubk, data, sig_bytes)
    }
}

// ── ECDSA ────────────────────────────────────────────────────────────

struct Ecdsa {
    uri: &'static str,
    hash: HashType,
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-256.
pub fn xmldsig_to_p256(rs: &[u8]) -> Result<p256::ecdsa::Signature, Error> {
    if rs.len() != 64 {
        return Err(Error::Crypto(format!(
            "P-256 signature must be 64 bytes, got {}",
            rs.len()
        )));
    }
    p256::ecdsa::Signature::from_slice(rs)
        .map_err(|e| Error::Crypto(format!("invalid P-256 signature: {e}")))
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-384.
pub fn xmldsig_to_p384(rs: &[u8]) -> Result<p384::ecdsa::Signature, Error> {
    if rs.len() != 96 {
        return Err(Error::Crypto(format!(
            "P-384 signature must be 96 bytes, got {}",
            rs.len()
        )));
    }
    p384::ecdsa::Signature::from_slice(rs)
        .map_err(|e| Error::Crypto(format!("invalid P-384 signature: {e}")))
}

impl SignatureAlgorithm for Ecdsa {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        let prehash = digest::digest(self.hash.digest_uri(), data)?;
        let err = |e: signature::Error| Error::Crypto(format!("ECDSA sign: {e}"));
        match key {
            SigningKey::EcP256(sk) => {
                let sig: p256::ecdsa::Signature = sk.sign_prehash(&prehash).map_err(err)?;
                Ok(sig.to_bytes().to_vec())
            }
            SigningKey::EcP384(sk) => {
                let sig: p384::ecdsa::Signature = sk.sign_prehash(&prehash).map_err(err)?;
                Ok(sig.to_bytes().to_vec())
            }
            other => Err(Error::Key(format!(
                "{} requires an EC private key, got {other:?}",
                self.uri
            ))),
        }
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let prehash = digest::digest(self.hash.digest_uri(), data)?;
        match key.to_public() {
            SigningKey::EcP256Public(vk) => {
                let sig = xmldsig_to_p256(sig_bytes)?;
                Ok(vk.verify_prehash(&prehash, &sig).is_ok())
            }
            SigningKey::EcP384Public(vk) => {
                let sig = xmldsig_to_p384(sig_bytes)?;
                Ok(vk.verify_prehash(&prehash, &sig).is_ok())
            }
            other => Err(Error::Key(format!(
                "{} requires an EC key, got {other:?}",
                self.uri
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_key() -> rsa::RsaPrivateKey {
        rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
    }

    #[test]
    fn test_rsa_sha256_sign_verify() {
        let key = SigningKey::Rsa(rsa_key());
        let alg = from_uri(algorithm::RSA_SHA256).unwrap();
        let sig = alg.sign(&key, b"payload").unwrap();
        assert_eq!(sig.len(), 128);
        let public = key.to_public();
        assert!(!public.is_private());
        assert!(alg.verify(&public, b"payload", &sig).unwrap());
        assert!(!alg.verify(&public, b"tampered", &sig).unwrap());
    }

    #[test]
    fn test_ecdsa_curve_follows_key() {
        let alg = from_uri(algorithm::ECDSA_SHA256).unwrap();
        let p256 = SigningKey::EcP256(p256::ecdsa::SigningKey::random(&mut rand::thread_rng()));
        let p384 = SigningKey::EcP384(p384::ecdsa::SigningKey::random(&mut rand::thread_rng()));
        let s256 = alg.sign(&p256, b"data").unwrap();
        let s384 = alg.sign(&p384, b"data").unwrap();
        assert_eq!(s256.len(), 64);
        assert_eq!(s384.len(), 96);
        assert!(alg.verify(&p256.to_public(), b"data", &s256).unwrap());
        assert!(alg.verify(&p384, b"data", &s384).unwrap());
        assert!(!alg.verify(&p256, b"other", &s256).unwrap());
    }

    #[test]
    fn test_key_family_mismatch() {
        let alg = from_uri(algorithm::RSA_SHA1).unwrap();
        let ec = SigningKey::EcP256(p256::ecdsa::SigningKey::random(&mut rand::thread_rng()));
        assert!(matches!(alg.sign(&ec, b"x"), Err(Error::Key(_))));
        let rsa = SigningKey::Rsa(rsa_key());
        assert!(alg.sign(&rsa.to_public(), b"x").is_err());
    }

    #[test]
    fn test_wrong_signature_length() {
        let alg = from_uri(algorithm::ECDSA_SHA256).unwrap();
        let key = SigningKey::EcP256(p256::ecdsa::SigningKey::random(&mut rand::thread_rng()));
        assert!(alg.verify(&key, b"x", &[0u8; 10]).is_err());
    }

    #[test]
    fn test_uri_lookup() {
        assert_eq!(from_uri(algorithm::ECDSA_SHA512).unwrap().uri(), algorithm::ECDSA_SHA512);
        assert!(is_ecdsa(algorithm::ECDSA_SHA1));
        assert!(!is_ecdsa(algorithm::RSA_SHA1));
        assert!(from_uri("http://www.w3.org/2000/09/xmldsig#hmac-sha1").is_err());
    }
}

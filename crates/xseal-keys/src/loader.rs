#![forbid(unsafe_code)]

//! Key loading from PEM, DER, PKCS#8 (plain and encrypted) and PKCS#12.

use std::path::Path;

use crate::key::{Key, KeyData};
use xseal_core::Error;

fn rsa_private(pk: rsa::RsaPrivateKey) -> Key {
    let public = pk.to_public_key();
    Key::new(KeyData::Rsa {
        private: Some(pk),
        public,
    })
}

fn rsa_public(public: rsa::RsaPublicKey) -> Key {
    Key::new(KeyData::Rsa {
        private: None,
        public,
    })
}

fn p256_private(sk: p256::ecdsa::SigningKey) -> Key {
    let public = *sk.verifying_key();
    Key::new(KeyData::EcP256 {
        private: Some(sk),
        public,
    })
}

fn p384_private(sk: p384::ecdsa::SigningKey) -> Key {
    let public = *sk.verifying_key();
    Key::new(KeyData::EcP384 {
        private: Some(sk),
        public,
    })
}

/// Load a private key from PKCS#8 DER bytes (as extracted from PKCS#12 or PEM).
///
/// Tries RSA, then EC P-256 and P-384.
pub fn load_private_key_pkcs8_der(der: &[u8]) -> Result<Key, Error> {
    use pkcs8::DecodePrivateKey;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
        return Ok(rsa_private(pk));
    }
    if let Ok(sk) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
        return Ok(p256_private(sk));
    }
    if let Ok(sk) = p384::ecdsa::SigningKey::from_pkcs8_der(der) {
        return Ok(p384_private(sk));
    }
    Err(Error::Key(
        "unable to parse PKCS#8 private key (tried RSA, P-256, P-384)".into(),
    ))
}

/// Load an EC private key from SEC1 DER (`EC PRIVATE KEY`).
pub fn load_ec_private_sec1_der(der: &[u8]) -> Result<Key, Error> {
    if let Ok(secret) = p256::SecretKey::from_sec1_der(der) {
        return Ok(p256_private(p256::ecdsa::SigningKey::from(&secret)));
    }
    if let Ok(secret) = p384::SecretKey::from_sec1_der(der) {
        return Ok(p384_private(p384::ecdsa::SigningKey::from(&secret)));
    }
    Err(Error::Key("unsupported curve in SEC1 EC private key".into()))
}

/// Load an RSA private key from PKCS#1 DER (`RSA PRIVATE KEY`).
pub fn load_rsa_private_pkcs1_der(der: &[u8]) -> Result<Key, Error> {
    use pkcs1::DecodeRsaPrivateKey;
    rsa::RsaPrivateKey::from_pkcs1_der(der)
        .map(rsa_private)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key: {e}")))
}

/// Load an RSA public key from PKCS#1 DER (`RSA PUBLIC KEY`).
pub fn load_rsa_public_pkcs1_der(der: &[u8]) -> Result<Key, Error> {
    use pkcs1::DecodeRsaPublicKey;
    rsa::RsaPublicKey::from_pkcs1_der(der)
        .map(rsa_public)
        .map_err(|e| Error::Key(format!("failed to parse RSA public key: {e}")))
}

/// Decrypt an `EncryptedPrivateKeyInfo` and load the key inside.
pub fn load_encrypted_pkcs8_der(der: &[u8], password: &str) -> Result<Key, Error> {
    use pkcs8::der::Decode;
    let info = pkcs8::EncryptedPrivateKeyInfo::from_der(der)
        .map_err(|e| Error::Key(format!("failed to parse encrypted PKCS#8: {e}")))?;
    let plain = info
        .decrypt(password)
        .map_err(|e| Error::Key(format!("failed to decrypt PKCS#8 private key: {e}")))?;
    load_private_key_pkcs8_der(plain.as_bytes())
}

/// Load a key from raw SubjectPublicKeyInfo DER bytes.
pub fn load_spki_der(spki_der: &[u8]) -> Result<Key, Error> {
    use spki::DecodePublicKey;

    if let Ok(pk) = rsa::RsaPublicKey::from_public_key_der(spki_der) {
        return Ok(rsa_public(pk));
    }
    if let Ok(vk) = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(Key::new(KeyData::EcP256 {
            private: None,
            public: vk,
        }));
    }
    if let Ok(vk) = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(Key::new(KeyData::EcP384 {
            private: None,
            public: vk,
        }));
    }
    Err(Error::Key("unsupported public key algorithm in SPKI".into()))
}

/// Load the public key of a DER-encoded X.509 certificate.
///
/// The certificate itself is kept as the key's single-element chain.
pub fn load_x509_cert_der(data: &[u8]) -> Result<Key, Error> {
    use der::{Decode, Encode};

    let cert = x509_cert::Certificate::from_der(data)
        .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;

    let mut key = load_spki_der(&spki_der).map_err(|_| {
        Error::Certificate("unsupported public key algorithm in X.509 certificate".into())
    })?;
    key.x509_chain = vec![data.to_vec()];
    Ok(key)
}

/// Split PEM text into its `BEGIN`/`END` blocks, skipping anything between
/// them (for example the "Bag Attributes" lines OpenSSL writes).
fn pem_blocks(text: &str) -> Vec<&str> {
    const END: &str = "-----END ";
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("-----BEGIN ") {
        let tail = &rest[start..];
        let Some(end_at) = tail.find(END) else { break };
        let after_end = &tail[end_at + END.len()..];
        let close = after_end.find("-----").map_or(after_end.len(), |i| i + 5);
        let len = end_at + END.len() + close;
        blocks.push(&tail[..len]);
        rest = &tail[len..];
    }
    blocks
}

fn decode_pem_block(block: &str) -> Result<(String, Vec<u8>), Error> {
    let (label, der) = pem_rfc7468::decode_vec(block.as_bytes())
        .map_err(|e| Error::Key(format!("failed to decode PEM: {e}")))?;
    Ok((label.to_string(), der))
}

/// Load the first key found in PEM data, dispatching on the PEM label.
///
/// Private keys in PKCS#1, SEC1, PKCS#8 and encrypted PKCS#8 form, public
/// keys in SPKI and PKCS#1 form, and certificates are accepted. Certificates
/// following a private key in the same file are attached to the key.
pub fn load_pem(pem_data: &[u8], password: Option<&str>) -> Result<Key, Error> {
    let text = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))?;
    let blocks = pem_blocks(text);
    if blocks.is_empty() {
        return Err(Error::Key("no PEM block found".into()));
    }

    let mut key: Option<Key> = None;
    let mut certs = Vec::new();
    for block in blocks {
        let (label, der) = decode_pem_block(block)?;
        match label.as_str() {
            "CERTIFICATE" => certs.push(der),
            _ if key.is_some() => {}
            "PRIVATE KEY" => key = Some(load_private_key_pkcs8_der(&der)?),
            "ENCRYPTED PRIVATE KEY" => {
                let password = password.ok_or_else(|| {
                    Error::Key("encrypted private key requires a password".into())
                })?;
                key = Some(load_encrypted_pkcs8_der(&der, password)?);
            }
            "RSA PRIVATE KEY" => key = Some(load_rsa_private_pkcs1_der(&der)?),
            "EC PRIVATE KEY" => key = Some(load_ec_private_sec1_der(&der)?),
            "PUBLIC KEY" => key = Some(load_spki_der(&der)?),
            "RSA PUBLIC KEY" => key = Some(load_rsa_public_pkcs1_der(&der)?),
            "EC PARAMETERS" => {}
            other => return Err(Error::Key(format!("unsupported PEM label: {other}"))),
        }
    }

    match key {
        Some(mut key) => {
            key.x509_chain = certs;
            Ok(key)
        }
        None => {
            let mut certs = certs.into_iter();
            let leaf = certs
                .next()
                .ok_or_else(|| Error::Key("no key or certificate in PEM data".into()))?;
            let mut key = load_x509_cert_der(&leaf)?;
            key.x509_chain.extend(certs);
            Ok(key)
        }
    }
}

/// Decode every certificate in PEM or DER `data` into DER.
pub fn load_certificates(data: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    use der::Decode;

    if let Ok(text) = std::str::from_utf8(data) {
        if text.contains("-----BEGIN ") {
            let mut certs = Vec::new();
            for block in pem_blocks(text) {
                let (label, der) = decode_pem_block(block)?;
                if label == "CERTIFICATE" {
                    certs.push(der);
                }
            }
            if certs.is_empty() {
                return Err(Error::Certificate("no CERTIFICATE block in PEM data".into()));
            }
            return Ok(certs);
        }
    }

    x509_cert::Certificate::from_der(data)
        .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
    Ok(vec![data.to_vec()])
}

/// Load the public key of a PEM or DER certificate; extra certificates in a
/// PEM bundle are appended to the chain.
pub fn load_certificate(data: &[u8]) -> Result<Key, Error> {
    let mut certs = load_certificates(data)?.into_iter();
    let leaf = certs
        .next()
        .ok_or_else(|| Error::Certificate("no certificate found".into()))?;
    let mut key = load_x509_cert_der(&leaf)?;
    key.x509_chain.extend(certs);
    Ok(key)
}

/// Load the private key of a PKCS#12 bundle with its certificates attached.
///
/// The certificate matching the private key, when present, is put first.
pub fn load_pkcs12(data: &[u8], password: &str) -> Result<Key, Error> {
    let contents = crate::pkcs12::parse(data, password)?;
    let first = contents
        .private_keys
        .first()
        .ok_or_else(|| Error::Key("PKCS#12 contains no private keys".into()))?;

    let mut key = load_private_key_pkcs8_der(first)?;
    let mut certs = contents.certificates;
    if let Some(pos) = certs.iter().position(|der| certificate_matches(&key, der)) {
        let leaf = certs.remove(pos);
        certs.insert(0, leaf);
    }
    key.x509_chain = certs;
    Ok(key)
}

/// Whether the certificate `cert_der` carries the public half of `key`.
pub fn certificate_matches(key: &Key, cert_der: &[u8]) -> bool {
    let Ok(cert_key) = load_x509_cert_der(cert_der) else {
        return false;
    };
    match (&key.data, &cert_key.data) {
        (KeyData::Rsa { public: a, .. }, KeyData::Rsa { public: b, .. }) => a == b,
        (KeyData::EcP256 { public: a, .. }, KeyData::EcP256 { public: b, .. }) => a == b,
        (KeyData::EcP384 { public: a, .. }, KeyData::EcP384 { public: b, .. }) => a == b,
        _ => false,
    }
}

/// Load a key from a file, auto-detecting the format.
///
/// `.p12`/`.pfx` files are read as PKCS#12 (with `password`, empty when
/// absent). Other files are read as PEM when they carry PEM armour, and as
/// PKCS#8, PKCS#1, SPKI or certificate DER otherwise.
pub fn load_key_file(path: &Path, password: Option<&str>) -> Result<Key, Error> {
    let data = std::fs::read(path)?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if ext.eq_ignore_ascii_case("p12") || ext.eq_ignore_ascii_case("pfx") {
        return load_pkcs12(&data, password.unwrap_or(""));
    }

    if data.windows(11).any(|w| w == b"-----BEGIN ") {
        return load_pem(&data, password);
    }

    load_private_key_pkcs8_der(&data)
        .or_else(|_| load_rsa_private_pkcs1_der(&data))
        .or_else(|_| load_spki_der(&data))
        .or_else(|_| load_x509_cert_der(&data))
        .map_err(|_| {
            Error::Key(format!(
                "unable to auto-detect key format from file: {}",
                path.display()
            ))
        })
}

/// Read a certificate file (PEM or DER) and load its public key.
pub fn load_certificate_file(path: &Path) -> Result<Key, Error> {
    load_certificate(&std::fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_dir() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test-data/keys")
    }

    fn read(name: &str) -> Vec<u8> {
        std::fs::read(keys_dir().join(name)).unwrap()
    }

    #[test]
    fn private_key_encodings_agree() {
        let pkcs8 = load_pem(&read("rsa-key.pem"), None).unwrap();
        let pkcs1 = load_pem(&read("rsa-key-pkcs1.pem"), None).unwrap();
        let encrypted = load_pem(&read("rsa-key-enc.pem"), Some("secret")).unwrap();

        assert!(pkcs8.has_private());
        assert_eq!(pkcs8.rsa_public_key(), pkcs1.rsa_public_key());
        assert_eq!(pkcs8.rsa_public_key(), encrypted.rsa_public_key());
    }

    #[test]
    fn encrypted_key_needs_the_right_password() {
        assert!(load_pem(&read("rsa-key-enc.pem"), None).is_err());
        assert!(load_pem(&read("rsa-key-enc.pem"), Some("wrong")).is_err());
    }

    #[test]
    fn ec_sec1_and_pkcs8() {
        let sec1 = load_pem(&read("ec-key-sec1.pem"), None).unwrap();
        let pkcs8 = load_pem(&read("ec-key.pem"), None).unwrap();
        assert!(matches!(sec1.data, KeyData::EcP256 { private: Some(_), .. }));
        match (&sec1.data, &pkcs8.data) {
            (KeyData::EcP256 { public: a, .. }, KeyData::EcP256 { public: b, .. }) => {
                assert_eq!(a, b)
            }
            other => panic!("unexpected key types: {other:?}"),
        }
    }

    #[test]
    fn public_keys() {
        let spki = load_pem(&read("rsa-pub.pem"), None).unwrap();
        let pkcs1 = load_pem(&read("rsa-pub-pkcs1.pem"), None).unwrap();
        assert!(!spki.has_private());
        assert_eq!(spki.rsa_public_key(), pkcs1.rsa_public_key());

        let ec = load_pem(&read("ec-pub.pem"), None).unwrap();
        assert!(matches!(ec.data, KeyData::EcP256 { private: None, .. }));
    }

    #[test]
    fn certificates_pem_and_der() {
        let from_pem = load_certificate(&read("rsa-cert.pem")).unwrap();
        let from_der = load_certificate(&read("rsa-cert.der")).unwrap();
        assert_eq!(from_pem.x509_chain, from_der.x509_chain);
        assert_eq!(from_pem.x509_chain.len(), 1);

        let private = load_pem(&read("rsa-key.pem"), None).unwrap();
        assert!(certificate_matches(&private, &from_der.x509_chain[0]));
        let other = load_pem(&read("other-key.pem"), None).unwrap();
        assert!(!certificate_matches(&other, &from_der.x509_chain[0]));
    }

    #[test]
    fn pkcs12_bundles() {
        for name in ["rsa.p12", "rsa-legacy.p12"] {
            let key = load_key_file(&keys_dir().join(name), Some("secret")).unwrap();
            assert!(key.rsa_private_key().is_some(), "{name}");
            assert_eq!(key.x509_chain.len(), 1, "{name}");
            assert!(certificate_matches(&key, &key.x509_chain[0]), "{name}");
        }

        let ec = load_key_file(&keys_dir().join("ec.p12"), Some("secret")).unwrap();
        assert!(matches!(ec.data, KeyData::EcP256 { private: Some(_), .. }));
    }

    #[test]
    fn pem_blocks_skip_preamble() {
        let text = "Bag Attributes\n    localKeyID: 01\n-----BEGIN A-----\nAA==\n-----END A-----\n\
                    junk\n-----BEGIN B-----\nAA==\n-----END B-----\n";
        let blocks = pem_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("-----BEGIN A-----"));
        assert!(blocks[1].ends_with("-----END B-----"));
    }

    #[test]
    fn unknown_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.bin");
        std::fs::write(&path, b"not a key").unwrap();
        assert!(load_key_file(&path, None).is_err());
        assert!(load_key_file(&dir.path().join("missing.pem"), None).is_err());
    }
}

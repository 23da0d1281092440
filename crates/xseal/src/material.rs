#![forbid(unsafe_code)]

//! Key and certificate loading for the orchestrators.
//!
//! Every failure maps to `KeyLoad` or `CertificateLoad` carrying the path.

use std::path::Path;

use xseal_core::Error as CoreError;
use xseal_keys::{loader, Key, KeysManager};

use crate::error::{Result, XsecError};
use crate::options::{KeySource, PublicKeySource};

fn key_error(path: &Path) -> impl FnOnce(CoreError) -> XsecError + '_ {
    move |source| XsecError::KeyLoad {
        path: path.to_path_buf(),
        source,
    }
}

fn cert_error(path: &Path) -> impl FnOnce(CoreError) -> XsecError + '_ {
    move |source| XsecError::CertificateLoad {
        path: path.to_path_buf(),
        source,
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| key_error(path)(CoreError::Io(e)))
}

fn load_pkcs12(path: &Path, password: Option<&str>) -> Result<Key> {
    let data = read(path)?;
    loader::load_pkcs12(&data, password.unwrap_or("")).map_err(key_error(path))
}

/// Load a private key.  A PKCS#12 bundle brings its certificates along.
pub fn load_private_key(source: &KeySource, password: Option<&str>) -> Result<Key> {
    let key = match source {
        KeySource::Pem(path) => {
            let data = read(path)?;
            if data.windows(11).any(|w| w == b"-----BEGIN ") {
                loader::load_pem(&data, password).map_err(key_error(path))?
            } else {
                loader::load_key_file(path, password).map_err(key_error(path))?
            }
        }
        KeySource::Pkcs12(path) => load_pkcs12(path, password)?,
    };
    if !key.has_private() {
        return Err(key_error(source.path())(CoreError::Key(
            "file holds no private key".into(),
        )));
    }
    Ok(key)
}

/// Load public key material: a bare key, a certificate, or a PKCS#12
/// bundle.
pub fn load_public_key(source: &PublicKeySource, password: Option<&str>) -> Result<Key> {
    match source {
        PublicKeySource::Pem(path) => {
            let data = read(path)?;
            loader::load_pem(&data, password).map_err(key_error(path))
        }
        PublicKeySource::Certificate(path) => {
            let data = std::fs::read(path).map_err(|e| cert_error(path)(CoreError::Io(e)))?;
            loader::load_certificate(&data).map_err(cert_error(path))
        }
        PublicKeySource::Pkcs12(path) => load_pkcs12(path, password),
    }
}

/// Attach the certificates in `path` to `key`, leaf first.
///
/// The leaf must carry the public half of `key`.
pub fn attach_certificate(key: &mut Key, path: &Path) -> Result<()> {
    let data = std::fs::read(path).map_err(|e| cert_error(path)(CoreError::Io(e)))?;
    let certs = loader::load_certificates(&data).map_err(cert_error(path))?;
    match certs.first() {
        Some(leaf) if loader::certificate_matches(key, leaf) => {
            key.x509_chain = certs;
            Ok(())
        }
        _ => Err(cert_error(path)(CoreError::Certificate(
            "certificate does not match the private key".into(),
        ))),
    }
}

/// Register the certificates travelling with `key` in the store, as trusted
/// or as untrusted intermediates.
pub fn register_certificates(keys: &mut KeysManager, key: &Key, trusted: bool) {
    for der in &key.x509_chain {
        if trusted {
            keys.add_trusted_cert(der.clone());
        } else {
            keys.add_untrusted_cert(der.clone());
        }
    }
    if !key.x509_chain.is_empty() {
        tracing::debug!(count = key.x509_chain.len(), trusted, "registered certificates");
    }
}

/// Wrap base64 certificate content in PEM armour, 64 columns per line.
pub fn certificate_pem(base64_body: &str) -> String {
    let body: String = base64_body.chars().filter(|c| !c.is_whitespace()).collect();
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for line in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

#![forbid(unsafe_code)]

//! Sign, verify, encrypt and decrypt XML documents.
//!
//! [`Xsec`] owns the key store and the operation defaults.  Each operation
//! builds the Signature or EncryptedData structure its options call for
//! and drives the `xseal-dsig` and `xseal-enc` engines to fill it in:
//!
//! ```no_run
//! use xseal::{Destination, DocumentSource, KeySource, SignOptions, Xsec};
//!
//! let xsec = Xsec::new();
//! let options = SignOptions {
//!     private_key: Some(KeySource::Pem("key.pem".into())),
//!     ..SignOptions::default()
//! };
//! xsec.sign(
//!     &DocumentSource::path("doc.xml"),
//!     &Destination::Path("signed.xml".into()),
//!     &options,
//! )?;
//! # Ok::<(), xseal::XsecError>(())
//! ```
//!
//! `Xsec` is not internally synchronized.  Use one per thread, or put it
//! behind a lock.

pub mod builder;
pub mod config;
mod decrypt;
mod document;
mod encrypt;
pub mod error;
pub mod material;
pub mod options;
pub mod inspect;
pub mod resolver;
mod sign;
mod verify;

pub use xseal_keys as keys;

pub use config::{Config, Defaults};
pub use error::{Result, Status, XsecError};
pub use options::{
    C14nAlgorithm, DecryptOptions, Destination, DocumentSource, EncAlgorithm, EncFormat,
    EncryptOptions, HashAlgorithm, KeySource, Output, PublicKeySource, Reference, SignAlgorithm,
    SignFormat, SignOptions, VerifyOptions,
};
pub use inspect::{has_signature, has_signature_str, is_encrypted, is_encrypted_str};
pub use verify::VerifyOutcome;

use xseal_keys::KeysManager;

/// Caller-owned context: the key store plus the defaults that replace
/// unset selectors.
///
/// Keys and trusted certificates adopted by an operation stay in the store
/// afterwards, including when the operation later fails.
#[derive(Debug, Default)]
pub struct Xsec {
    keys: KeysManager,
    defaults: Defaults,
}

impl Xsec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: Defaults) -> Self {
        Self {
            keys: KeysManager::new(),
            defaults,
        }
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn keys(&self) -> &KeysManager {
        &self.keys
    }

    /// The key store, for registering keys or trusted certificates up front.
    pub fn keys_mut(&mut self) -> &mut KeysManager {
        &mut self.keys
    }

    /// Sign a document.  The signing key is used for this call only.
    pub fn sign(
        &self,
        source: &DocumentSource,
        destination: &Destination,
        options: &SignOptions,
    ) -> Result<Output> {
        sign::sign(&self.keys, &self.defaults, source, destination, options)
    }

    /// Verify the first signature of a document.
    ///
    /// `Ok` means verification ran; whether the signature holds is in the
    /// outcome.
    pub fn verify(&mut self, source: &DocumentSource, options: &VerifyOptions) -> Result<VerifyOutcome> {
        verify::verify(&mut self.keys, source, options)
    }

    /// Encrypt the targets `options.xpaths` selects, or the root element.
    pub fn encrypt(
        &mut self,
        source: &DocumentSource,
        destination: &Destination,
        options: &EncryptOptions,
    ) -> Result<Output> {
        encrypt::encrypt(&mut self.keys, &self.defaults, source, destination, options)
    }

    /// Decrypt every EncryptedData of a document, or the first one whose
    /// plaintext is not XML.
    pub fn decrypt(
        &mut self,
        source: &DocumentSource,
        destination: &Destination,
        options: &DecryptOptions,
    ) -> Result<Output> {
        decrypt::decrypt(&mut self.keys, source, destination, options)
    }
}

#![forbid(unsafe_code)]

//! Key management for xseal.
//!
//! Loads keys from PEM, DER, PKCS#8 and PKCS#12, keeps them in a
//! caller-owned `KeysManager`, reads and writes `ds:KeyInfo` content and
//! validates X.509 chains against the store's trusted certificates.

pub mod key;
pub mod keyinfo;
pub mod loader;
pub mod manager;
pub mod pkcs12;
pub mod x509;

pub use key::{Key, KeyData};
pub use manager::KeysManager;

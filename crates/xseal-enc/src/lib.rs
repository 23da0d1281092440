#![forbid(unsafe_code)]

//! XML Encryption for xseal.
//!
//! Fills `<EncryptedData>` templates for an element or its content, wraps
//! the session key in `<EncryptedKey>` for an RSA recipient and decrypts
//! EncryptedData back into the document.

pub mod context;
pub mod decrypt;
pub mod encrypt;

pub use context::EncContext;
pub use decrypt::{decrypt, find_encrypted_data, Decrypted};
pub use encrypt::encrypt;

#![forbid(unsafe_code)]

//! Cryptographic algorithm implementations for xseal.
//!
//! Provides traits and implementations for the primitives needed by
//! XML-DSig and XML-Enc: digests, signatures, block ciphers and key
//! transport.  Every algorithm is looked up by its W3C URI.

pub mod cipher;
pub mod digest;
pub mod keytransport;
pub mod sign;

pub use cipher::CipherAlgorithm;
pub use digest::DigestAlgorithm;
pub use keytransport::KeyTransportAlgorithm;
pub use sign::{SignatureAlgorithm, SigningKey};

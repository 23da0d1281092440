#![forbid(unsafe_code)]

//! XML Digital Signature (XML-DSig) processing.
//!
//! Fills in signature templates (digests, `SignatureValue`, `KeyInfo`
//! material) and verifies signed documents.

pub mod context;
pub mod reference;
pub mod sign;
pub mod verify;

pub use context::DsigContext;
pub use sign::sign;
pub use verify::{find_signature, verify, VerifyResult};

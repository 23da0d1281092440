#![forbid(unsafe_code)]

//! Shared building blocks for the xseal crates: the primitive-level error
//! type, XML namespace constants and algorithm identifiers.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};

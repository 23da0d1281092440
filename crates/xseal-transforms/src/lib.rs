#![forbid(unsafe_code)]

//! Transform pipeline for xseal.
//!
//! A `<Reference>` is dereferenced into [`TransformData`] and then run
//! through its `<Transforms>` in order; whatever comes out is digested.

pub mod base64_transform;
pub mod enveloped;
pub mod pipeline;
pub mod uri;
pub mod xpath_filter;

pub use pipeline::{C14nTransform, Transform, TransformData, TransformPipeline};

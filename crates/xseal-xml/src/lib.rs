#![forbid(unsafe_code)]

//! XML document handling for xseal.
//!
//! Provides parsing and ID maps over `roxmltree`, `NodeSet` operations for
//! canonicalization and transforms, an XPath 1.0 subset evaluator, a
//! text-splice editor for in-place document changes and a template writer
//! on top of uppsala's `XmlWriter`.

pub mod document;
pub mod edit;
pub mod nodeset;
pub mod writer;
pub mod xpath;

pub use edit::Splicer;
pub use nodeset::NodeSet;
pub use writer::XmlWriter;

/// Return roxmltree parsing options that allow DTD.
///
/// roxmltree does not resolve external entities, so internal DTD subsets
/// (commonly used to declare ID attributes) are safe to accept.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

/// Parse `text` with [`parsing_options`].
pub fn parse(text: &str) -> Result<roxmltree::Document<'_>, xseal_core::Error> {
    roxmltree::Document::parse_with_options(text, parsing_options())
        .map_err(|e| xseal_core::Error::XmlParse(e.to_string()))
}

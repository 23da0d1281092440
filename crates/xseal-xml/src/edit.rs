#![forbid(unsafe_code)]

//! In-place document edits expressed as text splices.
//!
//! roxmltree trees are read-only, so changes are recorded against byte
//! ranges of the source text and applied in one pass.  Untouched regions of
//! the document are preserved byte for byte.

use std::ops::Range;

use roxmltree::Node;
use xseal_core::Error;

use crate::document::element_qname;

/// A batch of non-overlapping text replacements over one source string.
#[derive(Debug)]
pub struct Splicer<'t> {
    text: &'t str,
    edits: Vec<(Range<usize>, String)>,
}

impl<'t> Splicer<'t> {
    pub fn new(text: &'t str) -> Self {
        Self {
            text,
            edits: Vec::new(),
        }
    }

    /// Replace `range` of the source with `with`.
    pub fn replace(&mut self, range: Range<usize>, with: impl Into<String>) {
        self.edits.push((range, with.into()));
    }

    /// Insert `with` at byte offset `at`.
    pub fn insert(&mut self, at: usize, with: impl Into<String>) {
        self.edits.push((at..at, with.into()));
    }

    /// Replace an entire node (element, text, comment) with `with`.
    pub fn replace_node(&mut self, node: &Node<'_, '_>, with: impl Into<String>) {
        self.replace(node.range(), with);
    }

    /// Insert markup as the last child of `element`.
    ///
    /// A self-closing element is rewritten into start/end tag form.
    pub fn append_child(&mut self, element: &Node<'_, '_>, markup: &str) -> Result<(), Error> {
        let inner = content_range(self.text, element)?;
        match inner {
            Some(r) => self.insert(r.end, markup),
            None => self.expand_empty(element, markup)?,
        }
        Ok(())
    }

    /// Replace all children of `element` with `markup`.
    pub fn set_content(&mut self, element: &Node<'_, '_>, markup: &str) -> Result<(), Error> {
        match content_range(self.text, element)? {
            Some(r) => self.replace(r, markup),
            None => self.expand_empty(element, markup)?,
        }
        Ok(())
    }

    /// Apply all recorded edits and return the new text.
    pub fn apply(mut self) -> Result<String, Error> {
        self.edits.sort_by_key(|(r, _)| (r.start, r.end));
        let mut out = String::with_capacity(self.text.len());
        let mut pos = 0;
        for (range, with) in &self.edits {
            if range.start < pos || range.end > self.text.len() || range.start > range.end {
                return Err(Error::XmlStructure(format!(
                    "overlapping document edit at byte {}",
                    range.start
                )));
            }
            out.push_str(&self.text[pos..range.start]);
            out.push_str(with);
            pos = range.end;
        }
        out.push_str(&self.text[pos..]);
        Ok(out)
    }

    fn expand_empty(&mut self, element: &Node<'_, '_>, markup: &str) -> Result<(), Error> {
        let range = element.range();
        let tag = &self.text[range.clone()];
        let open = tag
            .strip_suffix("/>")
            .ok_or_else(|| Error::XmlStructure("malformed empty element".into()))?
            .trim_end();
        let qname = element_qname(element);
        let replacement = format!("{open}>{markup}</{qname}>");
        self.replace(range, replacement);
        Ok(())
    }
}

/// Offset just past the `>` that closes the start tag of `element`.
pub fn start_tag_end(text: &str, element: &Node<'_, '_>) -> Result<usize, Error> {
    let start = element.range().start;
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Ok(i + 1),
            None => {}
        }
    }
    Err(Error::XmlStructure("unterminated start tag".into()))
}

/// Range of an element's content between its start and end tags, or `None`
/// when the element is written self-closing.
pub fn content_range(text: &str, element: &Node<'_, '_>) -> Result<Option<Range<usize>>, Error> {
    let open_end = start_tag_end(text, element)?;
    let range = element.range();
    if open_end == range.end {
        return Ok(None);
    }
    let close = text[..range.end]
        .rfind("</")
        .filter(|&p| p >= open_end)
        .ok_or_else(|| Error::XmlStructure("missing end tag".into()))?;
    Ok(Some(open_end..close))
}

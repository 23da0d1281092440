#![forbid(unsafe_code)]

//! Base64 decode transform.

use base64::Engine;
use xseal_core::{algorithm, Error};

use crate::pipeline::{Transform, TransformData};

/// Decodes Base64 content.  A node set contributes the text of its text
/// nodes in document order.
pub struct Base64DecodeTransform;

impl Transform for Base64DecodeTransform {
    fn uri(&self) -> &str {
        algorithm::BASE64
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let text = match input {
            TransformData::Binary(data) => String::from_utf8(data)
                .map_err(|e| Error::Transform(format!("base64 input not UTF-8: {e}")))?,
            TransformData::Xml { xml_text, node_set } => {
                let doc = xseal_xml::parse(&xml_text)?;
                let texts = match &node_set {
                    Some(set) => set.nodes_in_order(&doc),
                    None => doc.descendants().collect(),
                };
                texts
                    .into_iter()
                    .filter(|n| n.is_text())
                    .filter_map(|n| n.text())
                    .collect()
            }
        };

        let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(cleaned)
            .map_err(|e| Error::Base64(format!("decode error: {e}")))?;
        Ok(TransformData::Binary(decoded))
    }
}

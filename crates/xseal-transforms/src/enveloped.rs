#![forbid(unsafe_code)]

//! Enveloped signature transform.
//!
//! Removes the `<Signature>` element that holds the reference, with all of
//! its descendants, from the node set.

use roxmltree::NodeId;
use xseal_core::{algorithm, Error};
use xseal_xml::NodeSet;

use crate::pipeline::{Transform, TransformData};

pub struct EnvelopedSignatureTransform {
    /// `<Signature>` in the document the pipeline carries.
    signature: NodeId,
}

impl EnvelopedSignatureTransform {
    pub fn new(signature: NodeId) -> Self {
        Self { signature }
    }

    /// Build from the `<Signature>` node of the document being processed.
    pub fn from_node(signature: roxmltree::Node<'_, '_>) -> Self {
        Self::new(signature.id())
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let TransformData::Xml { xml_text, node_set } = input else {
            return Err(Error::Transform(
                "enveloped-signature transform requires XML input".into(),
            ));
        };

        let doc = xseal_xml::parse(&xml_text)?;
        let signature = doc
            .get_node(self.signature)
            .filter(|n| n.is_element() && n.tag_name().name() == xseal_core::ns::node::SIGNATURE)
            .ok_or_else(|| {
                Error::Transform("enveloped-signature: Signature is not in this document".into())
            })?;

        let mut set = node_set.unwrap_or_else(|| NodeSet::all(&doc));
        set.remove_subtree(signature);

        Ok(TransformData::Xml {
            xml_text,
            node_set: Some(set),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xseal_core::ns;

    fn signed_doc() -> String {
        format!(
            r#"<doc><a>1</a><ds:Signature xmlns:ds="{}"><ds:SignedInfo/></ds:Signature><b>2</b></doc>"#,
            ns::DSIG
        )
    }

    #[test]
    fn removes_signature_subtree() {
        let xml = signed_doc();
        let doc = xseal_xml::parse(&xml).unwrap();
        let sig = doc
            .descendants()
            .find(|n| n.tag_name().name() == ns::node::SIGNATURE)
            .unwrap();
        let t = EnvelopedSignatureTransform::from_node(sig);

        let out = t
            .execute(TransformData::Xml {
                xml_text: xml.clone(),
                node_set: Some(NodeSet::all_without_comments(&doc)),
            })
            .unwrap();
        assert_eq!(out.to_binary().unwrap(), b"<doc><a>1</a><b>2</b></doc>");
    }

    #[test]
    fn rejects_binary_and_foreign_nodes() {
        let xml = signed_doc();
        let doc = xseal_xml::parse(&xml).unwrap();
        let not_a_signature = doc.root_element().first_child().unwrap();
        let t = EnvelopedSignatureTransform::from_node(not_a_signature);
        assert!(t
            .execute(TransformData::Xml {
                xml_text: xml.clone(),
                node_set: None,
            })
            .is_err());
        assert!(t.execute(TransformData::Binary(Vec::new())).is_err());
    }
}

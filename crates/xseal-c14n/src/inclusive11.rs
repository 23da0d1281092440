#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.1 (C14N 1.1).
//!
//! Algorithm URI: `http://www.w3.org/2006/12/xml-c14n11`
//! With comments: `http://www.w3.org/2006/12/xml-c14n11#WithComments`
//!
//! Identical to C14N 1.0 except that a document subset does not inherit
//! `xml:id` or `xml:base` from omitted ancestors.
// TODO: xml:base fixup (joining relative bases of omitted ancestors).

use roxmltree::Document;
use xseal_core::Error;
use xseal_xml::NodeSet;

use crate::inclusive::{run, Version};

/// Canonicalize using Inclusive C14N 1.1.
pub fn canonicalize(
    doc: &Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    run(doc, with_comments, node_set, Version::V11)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_id_not_inherited() {
        let xml = r#"<r xml:id="top" xml:lang="de"><a/></r>"#;
        let doc = xseal_xml::parse(xml).unwrap();
        let a = doc.descendants().find(|n| n.has_tag_name("a")).unwrap();
        let set = NodeSet::tree(a, false);
        let v11 = String::from_utf8(canonicalize(&doc, false, Some(&set)).unwrap()).unwrap();
        assert_eq!(v11, r#"<a xml:lang="de"></a>"#);
        let v10 =
            String::from_utf8(crate::inclusive::canonicalize(&doc, false, Some(&set)).unwrap())
                .unwrap();
        assert_eq!(v10, r#"<a xml:id="top" xml:lang="de"></a>"#);
    }
}

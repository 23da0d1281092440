#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 (C14N 1.0).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! The canonical form:
//! - outputs namespace declarations sorted by prefix (default first)
//! - outputs attributes sorted by (namespace-URI, local-name)
//! - escapes text and attribute values
//! - optionally preserves or strips comments
//! - supports document-subset canonicalization via `NodeSet`

use std::collections::BTreeMap;

use roxmltree::{Document, Node, NodeType};
use xseal_core::Error;
use xseal_xml::NodeSet;

use crate::render::{self, NsDecl};

/// Which inclusive variant is being produced.  They differ only in which
/// `xml:*` attributes a document subset inherits from omitted ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Version {
    V10,
    V11,
}

impl Version {
    fn non_inherited(self) -> &'static [&'static str] {
        match self {
            Version::V10 => &[],
            Version::V11 => &["id", "base"],
        }
    }
}

/// Canonicalize a document using Inclusive C14N 1.0.
pub fn canonicalize(
    doc: &Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    run(doc, with_comments, node_set, Version::V10)
}

pub(crate) fn run(
    doc: &Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    version: Version,
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    let ctx = C14nContext {
        doc,
        with_comments,
        node_set,
        version,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new());
    Ok(output)
}

struct C14nContext<'a, 'input> {
    doc: &'a Document<'input>,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    version: Version,
}

impl C14nContext<'_, '_> {
    fn is_visible(&self, node: &Node<'_, '_>) -> bool {
        self.node_set.map_or(true, |ns| ns.contains(node))
    }

    /// `rendered` holds the namespaces in scope on the nearest output ancestor.
    fn process_node(
        &self,
        node: Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered: &BTreeMap<String, String>,
    ) {
        match node.node_type() {
            NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, rendered);
                }
            }
            NodeType::Element => self.process_element(node, output, rendered),
            NodeType::Comment if !self.with_comments => {}
            NodeType::Text | NodeType::Comment | NodeType::PI => {
                if self.is_visible(&node) {
                    render::write_leaf(output, &node);
                }
            }
        }
    }

    fn process_element(
        &self,
        node: Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered: &BTreeMap<String, String>,
    ) {
        if !self.is_visible(&node) {
            // Omitted elements still contribute their visible descendants.
            for child in node.children() {
                self.process_node(child, output, rendered);
            }
            return;
        }

        let in_scope = render::inscope_namespaces(&node);
        let mut decls: Vec<NsDecl> = in_scope
            .iter()
            .filter(|(prefix, uri)| rendered.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl {
                prefix: prefix.clone(),
                uri: uri.clone(),
            })
            .collect();
        if !in_scope.contains_key("") && rendered.get("").is_some_and(|d| !d.is_empty()) {
            decls.push(NsDecl {
                prefix: String::new(),
                uri: String::new(),
            });
        }
        decls.sort();

        let mut attrs = render::element_attrs(self.doc, &node);
        if self.node_set.is_some() {
            let parent_omitted = node
                .parent()
                .map_or(true, |p| !p.is_element() || !self.is_visible(&p));
            if parent_omitted {
                let extra =
                    render::inherited_xml_attrs(&node, &attrs, self.version.non_inherited());
                attrs.extend(extra);
            }
        }
        attrs.sort();

        render::write_start_tag(output, &node, &decls, &attrs);
        for child in node.children() {
            self.process_node(child, output, &in_scope);
        }
        render::write_end_tag(output, &node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14n(xml: &str) -> String {
        let doc = xseal_xml::parse(xml).unwrap();
        String::from_utf8(canonicalize(&doc, false, None).unwrap()).unwrap()
    }

    #[test]
    fn test_simple_c14n() {
        assert_eq!(c14n(r#"<root><a b="1" a="2"/></root>"#), r#"<root><a a="2" b="1"></a></root>"#);
    }

    #[test]
    fn test_namespaces_rendered_once() {
        let out = c14n(r#"<root xmlns:b="http://b" xmlns:a="http://a"><a:child/></root>"#);
        assert_eq!(
            out,
            r#"<root xmlns:a="http://a" xmlns:b="http://b"><a:child></a:child></root>"#
        );
    }

    #[test]
    fn test_default_namespace_undeclared() {
        let out = c14n(r#"<r xmlns="urn:d"><c xmlns=""/></r>"#);
        assert_eq!(out, r#"<r xmlns="urn:d"><c xmlns=""></c></r>"#);
    }

    #[test]
    fn test_text_escaping_and_comments() {
        let xml = "<?xml version=\"1.0\"?>\n<!--top--><root>a &amp; b &lt; c<!--x--><![CDATA[<d>]]></root>";
        let doc = xseal_xml::parse(xml).unwrap();
        let plain = String::from_utf8(canonicalize(&doc, false, None).unwrap()).unwrap();
        assert_eq!(plain, "<root>a &amp; b &lt; c&lt;d&gt;</root>");
        let commented = String::from_utf8(canonicalize(&doc, true, None).unwrap()).unwrap();
        assert_eq!(commented, "<!--top-->\n<root>a &amp; b &lt; c<!--x-->&lt;d&gt;</root>");
    }

    #[test]
    fn test_subset_inherits_namespaces_and_xml_attrs() {
        let xml = r#"<r xmlns:p="urn:p" xml:lang="en"><p:a x="1">t</p:a></r>"#;
        let doc = xseal_xml::parse(xml).unwrap();
        let a = doc.descendants().find(|n| n.has_tag_name("a")).unwrap();
        let set = NodeSet::tree(a, false);
        let out = String::from_utf8(canonicalize(&doc, false, Some(&set)).unwrap()).unwrap();
        assert_eq!(out, r#"<p:a xmlns:p="urn:p" x="1" xml:lang="en">t</p:a>"#);
    }
}

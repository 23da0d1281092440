#![forbid(unsafe_code)]

//! Shared rendering utilities for canonical output.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use roxmltree::{Document, Node, NodeType};
use xseal_core::ns;
use xseal_xml::document::{attribute_qname, element_qname};

use crate::escape::{escape_into, Escape};

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// The prefix ("" for the default namespace).
    pub prefix: String,
    pub uri: String,
}

impl NsDecl {
    pub fn write(&self, out: &mut Vec<u8>) {
        if self.prefix.is_empty() {
            out.extend_from_slice(b" xmlns=\"");
        } else {
            out.extend_from_slice(b" xmlns:");
            out.extend_from_slice(self.prefix.as_bytes());
            out.extend_from_slice(b"=\"");
        }
        escape_into(out, &self.uri, Escape::Attr);
        out.push(b'"');
    }
}

// The default namespace sorts first, then by prefix.
impl Ord for NsDecl {
    fn cmp(&self, other: &Self) -> Ordering {
        (!self.prefix.is_empty(), &self.prefix).cmp(&(!other.prefix.is_empty(), &other.prefix))
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// "" for no namespace.
    pub ns_uri: String,
    pub local_name: String,
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(b' ');
        out.extend_from_slice(self.qualified_name.as_bytes());
        out.extend_from_slice(b"=\"");
        escape_into(out, &self.value, Escape::Attr);
        out.push(b'"');
    }
}

// Unqualified attributes first, then by (namespace URI, local name).
impl Ord for Attr {
    fn cmp(&self, other: &Self) -> Ordering {
        (!self.ns_uri.is_empty(), &self.ns_uri, &self.local_name).cmp(&(
            !other.ns_uri.is_empty(),
            &other.ns_uri,
            &other.local_name,
        ))
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The namespaces in scope on `node`, excluding `xml` and undeclared defaults.
pub fn inscope_namespaces(node: &Node<'_, '_>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for n in node.namespaces() {
        let prefix = n.name().unwrap_or("");
        if prefix == "xml" || n.uri().is_empty() {
            continue;
        }
        out.entry(prefix.to_owned()).or_insert_with(|| n.uri().to_owned());
    }
    out
}

/// The element's own attributes, unsorted.
pub fn element_attrs(doc: &Document<'_>, node: &Node<'_, '_>) -> Vec<Attr> {
    node.attributes()
        .map(|a| Attr {
            ns_uri: a.namespace().unwrap_or("").to_owned(),
            local_name: a.name().to_owned(),
            qualified_name: attribute_qname(doc, &a).to_owned(),
            value: a.value().to_owned(),
        })
        .collect()
}

/// `xml:*` attributes found on ancestors of `node` (nearest wins) that the
/// element does not carry itself.  `skip` names attributes that are never
/// inherited.
pub fn inherited_xml_attrs(node: &Node<'_, '_>, own: &[Attr], skip: &[&str]) -> Vec<Attr> {
    let mut found: BTreeMap<&str, &str> = BTreeMap::new();
    for ancestor in node.ancestors().skip(1).filter(|a| a.is_element()) {
        for a in ancestor.attributes() {
            if a.namespace() == Some(ns::XML) && !skip.contains(&a.name()) {
                found.entry(a.name()).or_insert(a.value());
            }
        }
    }
    found
        .into_iter()
        .filter(|(name, _)| !own.iter().any(|a| a.ns_uri == ns::XML && a.local_name == *name))
        .map(|(name, value)| Attr {
            ns_uri: ns::XML.to_owned(),
            local_name: name.to_owned(),
            qualified_name: format!("xml:{name}"),
            value: value.to_owned(),
        })
        .collect()
}

/// Write a start tag with its namespace declarations and attributes.
pub fn write_start_tag(out: &mut Vec<u8>, node: &Node<'_, '_>, decls: &[NsDecl], attrs: &[Attr]) {
    out.push(b'<');
    out.extend_from_slice(element_qname(node).as_bytes());
    for d in decls {
        d.write(out);
    }
    for a in attrs {
        a.write(out);
    }
    out.push(b'>');
}

pub fn write_end_tag(out: &mut Vec<u8>, node: &Node<'_, '_>) {
    out.extend_from_slice(b"</");
    out.extend_from_slice(element_qname(node).as_bytes());
    out.push(b'>');
}

/// Write a text, comment or PI node.  Comments and PIs that are children of
/// the document node get a line break towards the document element.
pub fn write_leaf(out: &mut Vec<u8>, node: &Node<'_, '_>) {
    let top_level = node.parent().is_some_and(|p| p.is_root());
    let after_root = top_level && node.prev_siblings().any(|s| s.is_element());
    let before_root = top_level && node.next_siblings().any(|s| s.is_element());
    match node.node_type() {
        NodeType::Text => {
            escape_into(out, node.text().unwrap_or(""), Escape::Text);
            return;
        }
        NodeType::Comment | NodeType::PI if after_root => out.push(b'\n'),
        _ => {}
    }
    match node.node_type() {
        NodeType::Comment => {
            out.extend_from_slice(b"<!--");
            out.extend_from_slice(node.text().unwrap_or("").as_bytes());
            out.extend_from_slice(b"-->");
        }
        NodeType::PI => {
            if let Some(pi) = node.pi() {
                out.extend_from_slice(b"<?");
                out.extend_from_slice(pi.target.as_bytes());
                if let Some(value) = pi.value.filter(|v| !v.is_empty()) {
                    out.push(b' ');
                    escape_into(out, value, Escape::Pi);
                }
                out.extend_from_slice(b"?>");
            }
        }
        _ => return,
    }
    if before_root {
        out.push(b'\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ns_decl_order() {
        let mut decls = vec![
            NsDecl { prefix: "b".into(), uri: "u".into() },
            NsDecl { prefix: String::new(), uri: "d".into() },
            NsDecl { prefix: "a".into(), uri: "u".into() },
        ];
        decls.sort();
        let prefixes: Vec<_> = decls.iter().map(|d| d.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["", "a", "b"]);
    }

    #[test]
    fn test_attr_order() {
        let attr = |ns: &str, local: &str| Attr {
            ns_uri: ns.into(),
            local_name: local.into(),
            qualified_name: local.into(),
            value: String::new(),
        };
        let mut attrs = vec![attr("urn:b", "a"), attr("", "z"), attr("urn:a", "z"), attr("", "b")];
        attrs.sort();
        let keys: Vec<_> = attrs
            .iter()
            .map(|a| format!("{}|{}", a.ns_uri, a.local_name))
            .collect();
        assert_eq!(keys, vec!["|b", "|z", "urn:a|z", "urn:b|a"]);
    }

    #[test]
    fn test_inscope_skips_undeclared_default() {
        let xml = r#"<a xmlns="urn:d" xmlns:p="urn:p"><b xmlns=""/></a>"#;
        let doc = xseal_xml::parse(xml).unwrap();
        let b = doc.descendants().find(|n| n.has_tag_name("b")).unwrap();
        let ns = inscope_namespaces(&b);
        assert_eq!(ns.get("p").map(String::as_str), Some("urn:p"));
        assert!(!ns.contains_key(""));
    }
}

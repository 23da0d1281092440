#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! Only "visibly utilized" namespace declarations are output.  A namespace
//! is visibly utilized if its prefix is used by the element's tag name or by
//! one of its attributes, or if the prefix appears in the
//! InclusiveNamespaces PrefixList (`#default` naming the default namespace).

use std::collections::{BTreeMap, BTreeSet};

use roxmltree::{Document, Node, NodeType};
use xseal_core::Error;
use xseal_xml::document::{attribute_prefix, element_prefix};
use xseal_xml::NodeSet;

use crate::render::{self, NsDecl};

/// Canonicalize using Exclusive C14N 1.0.
pub fn canonicalize(
    doc: &Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let inclusive_prefixes = inclusive_prefixes
        .iter()
        .map(|p| if p == "#default" { String::new() } else { p.clone() })
        .collect();
    let ctx = ExcC14nContext {
        doc,
        with_comments,
        node_set,
        inclusive_prefixes,
    };
    let mut output = Vec::new();
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new());
    Ok(output)
}

struct ExcC14nContext<'a, 'input> {
    doc: &'a Document<'input>,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: BTreeSet<String>,
}

impl ExcC14nContext<'_, '_> {
    fn is_visible(&self, node: &Node<'_, '_>) -> bool {
        self.node_set.map_or(true, |ns| ns.contains(node))
    }

    /// `rendered` maps prefixes to the URI last declared on an output ancestor.
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

    fn visibly_utilized(&self, node: &Node<'_, '_>) -> BTreeSet<String> {
        let mut used = self.inclusive_prefixes.clone();
        used.insert(element_prefix(node).unwrap_or("").to_owned());
        for attr in node.attributes() {
            if let Some(p) = attribute_prefix(self.doc, &attr) {
                used.insert(p.to_owned());
            }
        }
        used.remove("xml");
        used
    }

    fn process_element(
        &self,
        node: Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered: &BTreeMap<String, String>,
    ) {
        if !self.is_visible(&node) {
            for child in node.children() {
                self.process_node(child, output, rendered);
            }
            return;
        }

        let in_scope = render::inscope_namespaces(&node);
        let mut decls = Vec::new();
        for prefix in self.visibly_utilized(&node) {
            match in_scope.get(&prefix) {
                Some(uri) if rendered.get(&prefix) != Some(uri) => decls.push(NsDecl {
                    prefix,
                    uri: uri.clone(),
                }),
                None if prefix.is_empty() && rendered.get("").is_some_and(|d| !d.is_empty()) => {
                    decls.push(NsDecl {
                        prefix,
                        uri: String::new(),
                    })
                }
                _ => {}
            }
        }
        decls.sort();

        let mut attrs = render::element_attrs(self.doc, &node);
        attrs.sort();

        render::write_start_tag(output, &node, &decls, &attrs);
        let mut child_rendered = rendered.clone();
        for d in &decls {
            child_rendered.insert(d.prefix.clone(), d.uri.clone());
        }
        for child in node.children() {
            self.process_node(child, output, &child_rendered);
        }
        render::write_end_tag(output, &node);
    }
}

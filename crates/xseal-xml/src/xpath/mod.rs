#![forbid(unsafe_code)]

//! XPath support for XML-DSig and XML-Enc processing.
//!
//! Covers the same-document URI forms used by references (`#id`,
//! `#xpointer(id('...'))`) and an XPath 1.0 evaluator used for encryption
//! target selection and the XPath Filter 2.0 transform.

mod eval;
pub mod parser;

use std::collections::HashMap;

use roxmltree::{Document, Node, NodeId};
use xseal_core::Error;

pub use eval::{number_to_string, string_to_number};

/// A node in the XPath data model.
///
/// roxmltree does not give attributes their own ids, so an attribute is
/// addressed by its owner element and its index in the attribute list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XNode {
    Node(NodeId),
    Attr(NodeId, usize),
}

impl XNode {
    /// The tree node this XPath node belongs to (itself, or an attribute's owner).
    pub fn owner(&self) -> NodeId {
        match *self {
            XNode::Node(id) | XNode::Attr(id, _) => id,
        }
    }

    /// Sort key in document order: attributes follow their owner and precede
    /// its children.
    pub fn order_key(&self) -> (usize, usize) {
        match *self {
            XNode::Node(id) => (id.get_usize(), 0),
            XNode::Attr(id, i) => (id.get_usize(), i + 1),
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, XNode::Attr(..))
    }
}

/// The result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nodes(Vec<XNode>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Value {
    /// Unwrap a node-set, failing for other value types.
    pub fn into_nodes(self) -> Result<Vec<XNode>, Error> {
        match self {
            Value::Nodes(n) => Ok(n),
            other => Err(Error::XPath(format!("expected a node-set, got {other:?}"))),
        }
    }
}

/// XPath evaluator bound to one parsed document.
pub struct Evaluator<'a, 'input> {
    doc: &'a Document<'input>,
    namespaces: HashMap<String, String>,
    here: Option<XNode>,
    ids: HashMap<String, NodeId>,
}

impl<'a, 'input> Evaluator<'a, 'input> {
    /// Create an evaluator whose prefixes resolve against the namespaces in
    /// scope on the document element.  `id()` uses the default ID attributes.
    pub fn new(doc: &'a Document<'input>) -> Self {
        Self {
            doc,
            namespaces: in_scope_prefixes(doc.root_element()),
            here: None,
            ids: crate::document::build_id_map(doc, &[]),
        }
    }

    /// Bind an extra prefix.
    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.insert(prefix.to_owned(), uri.to_owned());
        self
    }

    /// Set the node returned by `here()`.
    pub fn with_here(mut self, node: NodeId) -> Self {
        self.here = Some(XNode::Node(node));
        self
    }

    /// Evaluate `expr` with `context` as the context node.
    pub fn evaluate(&self, expr: &str, context: XNode) -> Result<Value, Error> {
        let ast = parser::parse(expr, &self.namespaces)?;
        let env = eval::Env {
            doc: self.doc,
            here: self.here,
            ids: &self.ids,
        };
        env.eval_at(&ast, context)
    }

    /// Evaluate `expr` against the document root and return the node-set
    /// in document order.
    pub fn select(&self, expr: &str) -> Result<Vec<XNode>, Error> {
        let root = XNode::Node(self.doc.root().id());
        let nodes = self.evaluate(expr, root)?.into_nodes()?;
        Ok(eval::sort_dedup(nodes))
    }

    /// The XPath string-value of `node`.
    pub fn string_value(&self, node: XNode) -> String {
        eval::Env {
            doc: self.doc,
            here: self.here,
            ids: &self.ids,
        }
        .string_value(node)
    }
}

fn in_scope_prefixes(node: Node<'_, '_>) -> HashMap<String, String> {
    node.namespaces()
        .filter_map(|ns| ns.name().map(|p| (p.to_owned(), ns.uri().to_owned())))
        .collect()
}

/// Parse a same-document reference (e.g., `#foo` → `foo`).
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    uri.strip_prefix('#')
}

/// Parse an `xpointer(id('...'))` expression and return the ID value.
pub fn parse_xpointer_id(expr: &str) -> Option<&str> {
    let inner = expr
        .strip_prefix("xpointer(id('")
        .and_then(|s| s.strip_suffix("'))"))
        .or_else(|| {
            expr.strip_prefix("xpointer(id(\"")
                .and_then(|s| s.strip_suffix("\"))"))
        })?;
    Some(inner)
}

/// Resolve an ID value in a parsed document using a pre-built ID map.
pub fn resolve_id<'a, 'input>(
    doc: &'a Document<'input>,
    id_map: &HashMap<String, NodeId>,
    id: &str,
) -> Result<Node<'a, 'input>, Error> {
    id_map
        .get(id)
        .and_then(|nid| doc.get_node(*nid))
        .ok_or_else(|| Error::InvalidUri(format!("ID not found: {id}")))
}

/// Check if `ancestor` is an ancestor-or-self of `node`.
pub fn is_ancestor_or_self(ancestor: Node<'_, '_>, node: Node<'_, '_>) -> bool {
    node.ancestors().any(|n| n.id() == ancestor.id())
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<doc xmlns:p="urn:p">
  <p:item n="1" Id="first">alpha</p:item>
  <item n="2">beta</item>
  <!-- note -->
  <p:item n="3"><sub>gamma</sub></p:item>
  <?pi data?>
</doc>"#;

    fn names(doc: &Document<'_>, nodes: &[XNode]) -> Vec<String> {
        nodes
            .iter()
            .map(|n| match n {
                XNode::Node(id) => doc.get_node(*id).unwrap().tag_name().name().to_owned(),
                XNode::Attr(..) => "@".to_owned(),
            })
            .collect()
    }

    #[test]
    fn test_namespaced_descendants() {
        let doc = crate::parse(XML).unwrap();
        let ev = Evaluator::new(&doc);
        let nodes = ev.select("//p:item").unwrap();
        assert_eq!(nodes.len(), 2);
        // Unprefixed names only match the null namespace.
        assert_eq!(ev.select("//item").unwrap().len(), 1);
        assert_eq!(ev.select("/doc/*").unwrap().len(), 3);
    }

    #[test]
    fn test_predicates_and_positions() {
        let doc = crate::parse(XML).unwrap();
        let ev = Evaluator::new(&doc);
        let second = ev.select("/doc/*[2]").unwrap();
        assert_eq!(names(&doc, &second), vec!["item"]);
        let last = ev.select("/doc/*[last()]").unwrap();
        assert_eq!(ev.string_value(last[0]), "gamma");
        let by_attr = ev.select("//*[@n > 1 and @n != '3']").unwrap();
        assert_eq!(ev.string_value(by_attr[0]), "beta");
        // Reverse axis positions count from the context node outwards.
        let nearest = ev.select("//sub/ancestor::*[1]").unwrap();
        assert_eq!(ev.string_value(nearest[0]), "gamma");
    }

    #[test]
    fn test_attributes_and_union_order() {
        let doc = crate::parse(XML).unwrap();
        let ev = Evaluator::new(&doc);
        let attrs = ev.select("//@n").unwrap();
        assert_eq!(attrs.len(), 3);
        assert!(attrs.iter().all(XNode::is_attribute));
        let u = ev.select("//sub | //p:item[1] | //comment()").unwrap();
        let keys: Vec<_> = u.iter().map(XNode::order_key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(u.len(), 3);
    }

    #[test]
    fn test_scalar_functions() {
        let doc = crate::parse(XML).unwrap();
        let ev = Evaluator::new(&doc);
        let root = XNode::Node(doc.root().id());
        let eval = |e: &str| ev.evaluate(e, root).unwrap();
        assert_eq!(eval("count(//p:item)"), Value::Number(2.0));
        assert_eq!(eval("string(1 div 0)"), Value::String("Infinity".into()));
        assert_eq!(eval("7 mod 3 + -1"), Value::Number(0.0));
        assert_eq!(
            eval("concat(name(//p:item[1]), '-', local-name(//p:item[1]))"),
            Value::String("p:item-item".into())
        );
        assert_eq!(eval("namespace-uri(//p:item[1])"), Value::String("urn:p".into()));
        assert_eq!(eval("normalize-space('  a   b ')"), Value::String("a b".into()));
        assert_eq!(eval("starts-with('abc', 'ab')"), Value::Boolean(true));
        assert_eq!(eval("substring('12345', 1.5, 2.6)"), Value::String("234".into()));
        assert_eq!(eval("number('x') = number('x')"), Value::Boolean(false));
        assert_eq!(eval("string(id('first'))"), Value::String("alpha".into()));
        assert_eq!(eval("boolean(//processing-instruction('pi'))"), Value::Boolean(true));
    }

    #[test]
    fn test_here_requires_binding() {
        let doc = crate::parse(XML).unwrap();
        let root = XNode::Node(doc.root().id());
        assert!(Evaluator::new(&doc).evaluate("here()", root).is_err());
        let sub = doc.descendants().find(|n| n.has_tag_name("sub")).unwrap();
        let v = Evaluator::new(&doc)
            .with_here(sub.id())
            .evaluate("count(here()/ancestor::*)", root)
            .unwrap();
        assert_eq!(v, Value::Number(2.0));
    }

    #[test]
    fn test_non_nodeset_select_fails() {
        let doc = crate::parse(XML).unwrap();
        assert!(Evaluator::new(&doc).select("1 + 1").is_err());
    }

    #[test]
    fn test_same_document_refs() {
        assert_eq!(parse_same_document_ref("#abc"), Some("abc"));
        assert_eq!(parse_same_document_ref("abc"), None);
        assert_eq!(parse_xpointer_id("xpointer(id('x1'))"), Some("x1"));
        assert_eq!(parse_xpointer_id("xpointer(/)"), None);
    }

    #[test]
    fn test_ancestor_check() {
        let doc = crate::parse(XML).unwrap();
        let sub = doc.descendants().find(|n| n.has_tag_name("sub")).unwrap();
        assert!(is_ancestor_or_self(doc.root_element(), sub));
        assert!(is_ancestor_or_self(sub, sub));
        assert!(!is_ancestor_or_self(sub, doc.root_element()));
    }
}

#![forbid(unsafe_code)]

//! XPath Filter 2.0 transform.
//!
//! Each `dsig-xpath:XPath` child selects a node-set whose subtrees are
//! intersected with, subtracted from or united with a filter set that starts
//! as the whole document.  The transform output is the input node set
//! intersected with the final filter set.

use roxmltree::NodeId;
use xseal_core::{algorithm, ns, Error};
use xseal_xml::document::is_element;
use xseal_xml::nodeset::NodeSetOp;
use xseal_xml::xpath::{Evaluator, XNode};
use xseal_xml::NodeSet;

use crate::pipeline::{Transform, TransformData};

/// One `Filter="..."` expression.
#[derive(Debug, Clone)]
pub struct Filter {
    pub op: NodeSetOp,
    pub expr: String,
    /// Prefix bindings in scope on the `XPath` element.
    pub namespaces: Vec<(String, String)>,
    /// The `XPath` element itself, for `here()`.
    pub here: Option<NodeId>,
}

impl Filter {
    pub fn new(op: NodeSetOp, expr: impl Into<String>) -> Self {
        Self {
            op,
            expr: expr.into(),
            namespaces: Vec::new(),
            here: None,
        }
    }
}

/// Map a `Filter` attribute value to a set operation.
pub fn parse_filter_op(value: &str) -> Result<NodeSetOp, Error> {
    match value {
        ns::XPATH2_FILTER_INTERSECT => Ok(NodeSetOp::Intersection),
        ns::XPATH2_FILTER_SUBTRACT => Ok(NodeSetOp::Subtraction),
        ns::XPATH2_FILTER_UNION => Ok(NodeSetOp::Union),
        other => Err(Error::Transform(format!("unknown XPath filter type: {other}"))),
    }
}

/// The `Filter` attribute value for a set operation.
pub fn filter_name(op: NodeSetOp) -> &'static str {
    match op {
        NodeSetOp::Intersection => ns::XPATH2_FILTER_INTERSECT,
        NodeSetOp::Subtraction => ns::XPATH2_FILTER_SUBTRACT,
        NodeSetOp::Union => ns::XPATH2_FILTER_UNION,
    }
}

pub struct XPathFilter2Transform {
    filters: Vec<Filter>,
}

impl XPathFilter2Transform {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    /// Read the filters from a `<Transform>` element.
    pub fn from_element(transform: roxmltree::Node<'_, '_>) -> Result<Self, Error> {
        let mut filters = Vec::new();
        for xpath in transform
            .children()
            .filter(|n| is_element(n, ns::XPATH2, ns::node::XPATH))
        {
            let op = parse_filter_op(xpath.attribute(ns::attr::FILTER).ok_or_else(|| {
                Error::MissingAttribute("Filter on XPath".into())
            })?)?;
            let namespaces = xpath
                .namespaces()
                .filter_map(|d| d.name().map(|p| (p.to_owned(), d.uri().to_owned())))
                .collect();
            filters.push(Filter {
                op,
                expr: xpath.text().unwrap_or("").trim().to_owned(),
                namespaces,
                here: Some(xpath.id()),
            });
        }
        if filters.is_empty() {
            return Err(Error::MissingElement("XPath in XPath Filter 2.0 transform".into()));
        }
        Ok(Self { filters })
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }
}

impl Transform for XPathFilter2Transform {
    fn uri(&self) -> &str {
        algorithm::XPATH2
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let TransformData::Xml { xml_text, node_set } = input else {
            return Err(Error::Transform(
                "XPath Filter 2.0 transform requires XML input".into(),
            ));
        };

        let doc = xseal_xml::parse(&xml_text)?;
        let mut filter_set = NodeSet::all(&doc);
        for filter in &self.filters {
            let mut evaluator = Evaluator::new(&doc);
            for (prefix, uri) in &filter.namespaces {
                evaluator = evaluator.with_namespace(prefix, uri);
            }
            if let Some(here) = filter.here.filter(|id| doc.get_node(*id).is_some()) {
                evaluator = evaluator.with_here(here);
            }

            let mut selected = NodeSet::new();
            for node in evaluator.select(&filter.expr)? {
                // Attributes are rendered through their owner element and
                // never enter a node set on their own.
                if let XNode::Node(id) = node {
                    if let Some(n) = doc.get_node(id) {
                        selected = selected.union(&NodeSet::tree(n, true));
                    }
                }
            }
            tracing::debug!(
                filter = filter_name(filter.op),
                expr = %filter.expr,
                selected = selected.len(),
                "applying XPath filter"
            );
            filter_set = filter_set.combine(filter.op, &selected);
        }

        let output = match node_set {
            Some(input) => input.intersection(&filter_set),
            None => filter_set,
        };
        Ok(TransformData::Xml {
            xml_text,
            node_set: Some(output),
        })
    }
}

#![forbid(unsafe_code)]

//! NodeSet type for XML canonicalization and transforms.
//!
//! A `NodeSet` is a set of document nodes identified by their `NodeId`
//! index.  Attributes and namespace declarations are not members on their
//! own: they are rendered whenever their owner element is in the set.

use std::collections::HashSet;

use roxmltree::{Document, Node, NodeId};

/// An operation to combine two node sets (XPath Filter 2.0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSetOp {
    Intersection,
    Subtraction,
    Union,
}

/// A set of XML document nodes identified by `NodeId`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    nodes: HashSet<usize>,
}

impl NodeSet {
    /// Create an empty node set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node set containing every node in the document.
    pub fn all(doc: &Document<'_>) -> Self {
        Self::tree(doc.root(), true)
    }

    /// Create a node set containing all nodes except comments.
    /// `URI=""` selects the document this way.
    pub fn all_without_comments(doc: &Document<'_>) -> Self {
        Self::tree(doc.root(), false)
    }

    /// Create a node set for the subtree rooted at `node`.
    pub fn tree(node: Node<'_, '_>, with_comments: bool) -> Self {
        let mut nodes = HashSet::new();
        collect_subtree(node, &mut nodes, with_comments);
        Self { nodes }
    }

    /// Check if a node is in this set.
    pub fn contains(&self, node: &Node<'_, '_>) -> bool {
        self.nodes.contains(&node.id().get_usize())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node to this set.
    pub fn insert(&mut self, id: NodeId) {
        self.nodes.insert(id.get_usize());
    }

    /// Remove a node from this set.
    pub fn remove(&mut self, id: NodeId) {
        self.nodes.remove(&id.get_usize());
    }

    /// Remove `node` and all of its descendants.
    pub fn remove_subtree(&mut self, node: Node<'_, '_>) {
        for d in node.descendants() {
            self.nodes.remove(&d.id().get_usize());
        }
    }

    /// Compute the intersection of two node sets.
    pub fn intersection(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.intersection(&other.nodes).copied().collect(),
        }
    }

    /// Compute the union of two node sets.
    pub fn union(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.union(&other.nodes).copied().collect(),
        }
    }

    /// Compute self - other.
    pub fn subtract(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.difference(&other.nodes).copied().collect(),
        }
    }

    /// Apply a set operation.
    pub fn combine(&self, op: NodeSetOp, other: &NodeSet) -> NodeSet {
        match op {
            NodeSetOp::Intersection => self.intersection(other),
            NodeSetOp::Subtraction => self.subtract(other),
            NodeSetOp::Union => self.union(other),
        }
    }

    /// Member nodes in document order.
    pub fn nodes_in_order<'a, 'input>(&self, doc: &'a Document<'input>) -> Vec<Node<'a, 'input>> {
        doc.descendants()
            .filter(|n| self.nodes.contains(&n.id().get_usize()))
            .collect()
    }
}

/// Collect all node indices in a subtree, optionally skipping comments.
pub fn collect_subtree(node: Node<'_, '_>, out: &mut HashSet<usize>, with_comments: bool) {
    for d in node.descendants() {
        if with_comments || !d.is_comment() {
            out.insert(d.id().get_usize());
        }
    }
}

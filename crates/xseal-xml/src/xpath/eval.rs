#![forbid(unsafe_code)]

//! XPath 1.0 evaluation over a `roxmltree` document.

use std::collections::HashMap;

use roxmltree::{Document, Node, NodeId, NodeType};
use xseal_core::Error;

use super::parser::{Axis, BinOp, Expr, NodeTest, PathStart, Step};
use super::{Value, XNode};

/// Evaluation state shared by every sub-expression.
pub(super) struct Env<'a, 'input> {
    pub doc: &'a Document<'input>,
    pub here: Option<XNode>,
    pub ids: &'a HashMap<String, NodeId>,
}

#[derive(Clone, Copy)]
struct Focus {
    node: XNode,
    position: usize,
    size: usize,
}

impl<'a, 'input> Env<'a, 'input> {
    fn node(&self, id: NodeId) -> Result<Node<'a, 'input>, Error> {
        self.doc
            .get_node(id)
            .ok_or_else(|| Error::XPath(format!("stale node id {}", id.get_usize())))
    }

    pub fn eval_at(&self, expr: &Expr, node: XNode) -> Result<Value, Error> {
        self.eval(
            expr,
            Focus {
                node,
                position: 1,
                size: 1,
            },
        )
    }

    fn eval(&self, expr: &Expr, f: Focus) -> Result<Value, Error> {
        match expr {
            Expr::Literal(s) => Ok(Value::String(s.clone())),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Negate(e) => Ok(Value::Number(-self.number(&self.eval(e, f)?)?)),
            Expr::Binary(l, op, r) => self.binary(l, *op, r, f),
            Expr::Call(name, args) => self.call(name, args, f),
            Expr::Filter(primary, preds) => {
                let nodes = self.eval(primary, f)?.into_nodes()?;
                let mut nodes = sort_dedup(nodes);
                for p in preds {
                    nodes = self.apply_predicate(nodes, p)?;
                }
                Ok(Value::Nodes(nodes))
            }
            Expr::Path { start, steps } => {
                let mut current = match start {
                    PathStart::Context => vec![f.node],
                    PathStart::Root => vec![XNode::Node(self.doc.root().id())],
                    PathStart::Filter(e) => sort_dedup(self.eval(e, f)?.into_nodes()?),
                };
                for step in steps {
                    current = self.step(&current, step)?;
                }
                Ok(Value::Nodes(current))
            }
        }
    }

    fn step(&self, input: &[XNode], step: &Step) -> Result<Vec<XNode>, Error> {
        let mut out = Vec::new();
        for &ctx in input {
            let mut matched: Vec<XNode> = self
                .axis(ctx, step.axis)?
                .into_iter()
                .filter(|n| self.test(*n, &step.test, step.axis))
                .collect();
            for p in &step.predicates {
                matched = self.apply_predicate(matched, p)?;
            }
            out.extend(matched);
        }
        Ok(sort_dedup(out))
    }

    /// Filter `nodes` (already in proximity order) by a predicate.
    fn apply_predicate(&self, nodes: Vec<XNode>, pred: &Expr) -> Result<Vec<XNode>, Error> {
        let size = nodes.len();
        let mut kept = Vec::new();
        for (i, node) in nodes.into_iter().enumerate() {
            let focus = Focus {
                node,
                position: i + 1,
                size,
            };
            let keep = match self.eval(pred, focus)? {
                Value::Number(n) => n == (i + 1) as f64,
                other => self.boolean(&other),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    /// Nodes on `axis` from `ctx`, nearest-first for reverse axes.
    fn axis(&self, ctx: XNode, axis: Axis) -> Result<Vec<XNode>, Error> {
        let owner = self.node(ctx.owner())?;
        let v = match (ctx, axis) {
            (_, Axis::SelfAxis) => vec![ctx],
            (XNode::Attr(..), Axis::Parent) => vec![XNode::Node(owner.id())],
            (XNode::Attr(..), Axis::Ancestor | Axis::AncestorOrSelf) => {
                let mut v = Vec::new();
                if axis == Axis::AncestorOrSelf {
                    v.push(ctx);
                }
                v.extend(owner.ancestors().map(as_x));
                v
            }
            (XNode::Attr(..), Axis::DescendantOrSelf) => vec![ctx],
            (XNode::Attr(..), _) => Vec::new(),
            (XNode::Node(_), Axis::Child) => owner.children().map(as_x).collect(),
            (XNode::Node(_), Axis::Descendant) => owner.descendants().skip(1).map(as_x).collect(),
            (XNode::Node(_), Axis::DescendantOrSelf) => owner.descendants().map(as_x).collect(),
            (XNode::Node(_), Axis::Parent) => owner.parent().map(as_x).into_iter().collect(),
            (XNode::Node(_), Axis::Ancestor) => owner.ancestors().skip(1).map(as_x).collect(),
            (XNode::Node(_), Axis::AncestorOrSelf) => owner.ancestors().map(as_x).collect(),
            (XNode::Node(_), Axis::FollowingSibling) => {
                owner.next_siblings().skip(1).map(as_x).collect()
            }
            (XNode::Node(_), Axis::PrecedingSibling) => {
                owner.prev_siblings().skip(1).map(as_x).collect()
            }
            (XNode::Node(_), Axis::Attribute) => {
                if owner.is_element() {
                    (0..owner.attributes().count())
                        .map(|i| XNode::Attr(owner.id(), i))
                        .collect()
                } else {
                    Vec::new()
                }
            }
        };
        Ok(v)
    }

    fn test(&self, node: XNode, test: &NodeTest, axis: Axis) -> bool {
        let Some(owner) = self.doc.get_node(node.owner()) else {
            return false;
        };
        match node {
            XNode::Attr(_, i) => {
                let Some(attr) = owner.attributes().nth(i) else {
                    return false;
                };
                match test {
                    NodeTest::Node => true,
                    NodeTest::Any => axis == Axis::Attribute,
                    NodeTest::AnyInNamespace(uri) => {
                        axis == Axis::Attribute && attr.namespace() == Some(uri.as_str())
                    }
                    NodeTest::Name { ns, local } => {
                        axis == Axis::Attribute
                            && attr.name() == local
                            && attr.namespace() == ns.as_deref()
                    }
                    _ => false,
                }
            }
            XNode::Node(_) => match test {
                NodeTest::Node => true,
                NodeTest::Text => owner.is_text(),
                NodeTest::Comment => owner.is_comment(),
                NodeTest::ProcessingInstruction(target) => match owner.pi() {
                    Some(pi) => target.as_deref().map_or(true, |t| t == pi.target),
                    None => false,
                },
                _ if axis == Axis::Attribute || !owner.is_element() => false,
                NodeTest::Any => true,
                NodeTest::AnyInNamespace(uri) => {
                    owner.tag_name().namespace() == Some(uri.as_str())
                }
                NodeTest::Name { ns, local } => {
                    owner.tag_name().name() == local
                        && owner.tag_name().namespace() == ns.as_deref()
                }
            },
        }
    }

    fn binary(&self, l: &Expr, op: BinOp, r: &Expr, f: Focus) -> Result<Value, Error> {
        match op {
            BinOp::Or => {
                let lv = self.eval(l, f)?;
                if self.boolean(&lv) {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(self.boolean(&self.eval(r, f)?)))
            }
            BinOp::And => {
                let lv = self.eval(l, f)?;
                if !self.boolean(&lv) {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(self.boolean(&self.eval(r, f)?)))
            }
            BinOp::Union => {
                let mut a = self.eval(l, f)?.into_nodes()?;
                a.extend(self.eval(r, f)?.into_nodes()?);
                Ok(Value::Nodes(sort_dedup(a)))
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                let a = self.number(&self.eval(l, f)?)?;
                let b = self.number(&self.eval(r, f)?)?;
                Ok(Value::Number(match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    _ => a % b,
                }))
            }
            _ => {
                let a = self.eval(l, f)?;
                let b = self.eval(r, f)?;
                Ok(Value::Boolean(self.compare(&a, op, &b)?))
            }
        }
    }

    fn compare(&self, a: &Value, op: BinOp, b: &Value) -> Result<bool, Error> {
        match (a, b) {
            (Value::Nodes(x), Value::Nodes(y)) => {
                let ys: Vec<String> = y.iter().map(|n| self.string_value(*n)).collect();
                for n in x {
                    let xs = self.string_value(*n);
                    for s in &ys {
                        if compare_atoms(&Value::String(xs.clone()), op, &Value::String(s.clone())) {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            (Value::Nodes(x), other) => self.compare_nodes_atom(x, op, other, false),
            (other, Value::Nodes(y)) => self.compare_nodes_atom(y, op, other, true),
            _ => Ok(compare_atoms(a, op, b)),
        }
    }

    fn compare_nodes_atom(
        &self,
        nodes: &[XNode],
        op: BinOp,
        atom: &Value,
        swapped: bool,
    ) -> Result<bool, Error> {
        if let Value::Boolean(b) = atom {
            let nb = Value::Boolean(!nodes.is_empty());
            let ab = Value::Boolean(*b);
            return Ok(if swapped {
                compare_atoms(&ab, op, &nb)
            } else {
                compare_atoms(&nb, op, &ab)
            });
        }
        for n in nodes {
            let s = self.string_value(*n);
            let nv = match atom {
                Value::Number(_) => Value::Number(string_to_number(&s)),
                _ => Value::String(s),
            };
            let hit = if swapped {
                compare_atoms(atom, op, &nv)
            } else {
                compare_atoms(&nv, op, atom)
            };
            if hit {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn call(&self, name: &str, args: &[Expr], f: Focus) -> Result<Value, Error> {
        let arity = |min: usize, max: usize| -> Result<(), Error> {
            if args.len() < min || args.len() > max {
                Err(Error::XPath(format!(
                    "{name}() takes {min}..{max} arguments, got {}",
                    args.len()
                )))
            } else {
                Ok(())
            }
        };
        let arg = |i: usize| self.eval(&args[i], f);
        let string_arg = |i: usize| -> Result<String, Error> {
            match args.get(i) {
                Some(e) => Ok(self.string(&self.eval(e, f)?)),
                None => Ok(self.string_value(f.node)),
            }
        };
        let node_arg = |i: usize| -> Result<Option<XNode>, Error> {
            match args.get(i) {
                Some(e) => Ok(sort_dedup(self.eval(e, f)?.into_nodes()?).first().copied()),
                None => Ok(Some(f.node)),
            }
        };

        let v = match name {
            "last" => {
                arity(0, 0)?;
                Value::Number(f.size as f64)
            }
            "position" => {
                arity(0, 0)?;
                Value::Number(f.position as f64)
            }
            "count" => {
                arity(1, 1)?;
                Value::Number(arg(0)?.into_nodes()?.len() as f64)
            }
            "id" => {
                arity(1, 1)?;
                let tokens: Vec<String> = match arg(0)? {
                    Value::Nodes(ns) => ns.iter().map(|n| self.string_value(*n)).collect(),
                    other => vec![self.string(&other)],
                };
                let found = tokens
                    .iter()
                    .flat_map(|t| t.split_whitespace())
                    .filter_map(|t| self.ids.get(t))
                    .map(|id| XNode::Node(*id))
                    .collect();
                Value::Nodes(sort_dedup(found))
            }
            "here" => {
                arity(0, 0)?;
                let here = self
                    .here
                    .ok_or_else(|| Error::XPath("here() is not available in this context".into()))?;
                Value::Nodes(vec![here])
            }
            "local-name" | "namespace-uri" | "name" => {
                arity(0, 1)?;
                let s = match node_arg(0)? {
                    Some(n) => self.name_part(n, name),
                    None => String::new(),
                };
                Value::String(s)
            }
            "string" => {
                arity(0, 1)?;
                Value::String(string_arg(0)?)
            }
            "concat" => {
                if args.len() < 2 {
                    return Err(Error::XPath("concat() needs at least two arguments".into()));
                }
                let mut s = String::new();
                for i in 0..args.len() {
                    s.push_str(&string_arg(i)?);
                }
                Value::String(s)
            }
            "starts-with" => {
                arity(2, 2)?;
                Value::Boolean(string_arg(0)?.starts_with(&string_arg(1)?))
            }
            "contains" => {
                arity(2, 2)?;
                Value::Boolean(string_arg(0)?.contains(&string_arg(1)?))
            }
            "substring-before" => {
                arity(2, 2)?;
                let (s, p) = (string_arg(0)?, string_arg(1)?);
                Value::String(s.find(&p).map(|i| s[..i].to_owned()).unwrap_or_default())
            }
            "substring-after" => {
                arity(2, 2)?;
                let (s, p) = (string_arg(0)?, string_arg(1)?);
                Value::String(
                    s.find(&p)
                        .map(|i| s[i + p.len()..].to_owned())
                        .unwrap_or_default(),
                )
            }
            "substring" => {
                arity(2, 3)?;
                let s = string_arg(0)?;
                let start = round(self.number(&arg(1)?)?);
                let end = match args.get(2) {
                    Some(_) => start + round(self.number(&arg(2)?)?),
                    None => f64::INFINITY,
                };
                let out: String = s
                    .chars()
                    .enumerate()
                    .filter(|(i, _)| {
                        let p = (*i + 1) as f64;
                        p >= start && p < end
                    })
                    .map(|(_, c)| c)
                    .collect();
                Value::String(out)
            }
            "string-length" => {
                arity(0, 1)?;
                Value::Number(string_arg(0)?.chars().count() as f64)
            }
            "normalize-space" => {
                arity(0, 1)?;
                Value::String(
                    string_arg(0)?
                        .split_ascii_whitespace()
                        .collect::<Vec<_>>()
                        .join(" "),
                )
            }
            "translate" => {
                arity(3, 3)?;
                let s = string_arg(0)?;
                let from: Vec<char> = string_arg(1)?.chars().collect();
                let to: Vec<char> = string_arg(2)?.chars().collect();
                let out = s
                    .chars()
                    .filter_map(|c| match from.iter().position(|&x| x == c) {
                        Some(i) => to.get(i).copied(),
                        None => Some(c),
                    })
                    .collect();
                Value::String(out)
            }
            "boolean" => {
                arity(1, 1)?;
                Value::Boolean(self.boolean(&arg(0)?))
            }
            "not" => {
                arity(1, 1)?;
                Value::Boolean(!self.boolean(&arg(0)?))
            }
            "true" => {
                arity(0, 0)?;
                Value::Boolean(true)
            }
            "false" => {
                arity(0, 0)?;
                Value::Boolean(false)
            }
            "lang" => {
                arity(1, 1)?;
                let want = string_arg(0)?.to_ascii_lowercase();
                let owner = self.node(f.node.owner())?;
                let lang = owner
                    .ancestors()
                    .find_map(|n| n.attribute((roxmltree::NS_XML_URI, "lang")));
                Value::Boolean(lang.is_some_and(|l| {
                    let l = l.to_ascii_lowercase();
                    l == want || l.strip_prefix(&want).is_some_and(|r| r.starts_with('-'))
                }))
            }
            "number" => {
                arity(0, 1)?;
                match args.first() {
                    Some(_) => Value::Number(self.number(&arg(0)?)?),
                    None => Value::Number(string_to_number(&self.string_value(f.node))),
                }
            }
            "sum" => {
                arity(1, 1)?;
                let total = arg(0)?
                    .into_nodes()?
                    .iter()
                    .map(|n| string_to_number(&self.string_value(*n)))
                    .sum();
                Value::Number(total)
            }
            "floor" => {
                arity(1, 1)?;
                Value::Number(self.number(&arg(0)?)?.floor())
            }
            "ceiling" => {
                arity(1, 1)?;
                Value::Number(self.number(&arg(0)?)?.ceil())
            }
            "round" => {
                arity(1, 1)?;
                Value::Number(round(self.number(&arg(0)?)?))
            }
            other => return Err(Error::XPath(format!("unknown function {other}()"))),
        };
        Ok(v)
    }

    fn name_part(&self, node: XNode, which: &str) -> String {
        let Some(owner) = self.doc.get_node(node.owner()) else {
            return String::new();
        };
        match node {
            XNode::Attr(_, i) => match owner.attributes().nth(i) {
                Some(a) => match which {
                    "local-name" => a.name().to_owned(),
                    "namespace-uri" => a.namespace().unwrap_or("").to_owned(),
                    _ => crate::document::attribute_qname(self.doc, &a).to_owned(),
                },
                None => String::new(),
            },
            XNode::Node(_) => match owner.node_type() {
                NodeType::Element => match which {
                    "local-name" => owner.tag_name().name().to_owned(),
                    "namespace-uri" => owner.tag_name().namespace().unwrap_or("").to_owned(),
                    _ => crate::document::element_qname(&owner).to_owned(),
                },
                NodeType::PI if which != "namespace-uri" => {
                    owner.pi().map(|p| p.target.to_owned()).unwrap_or_default()
                }
                _ => String::new(),
            },
        }
    }

    /// The XPath string-value of a node.
    pub fn string_value(&self, node: XNode) -> String {
        let Some(owner) = self.doc.get_node(node.owner()) else {
            return String::new();
        };
        match node {
            XNode::Attr(_, i) => owner
                .attributes()
                .nth(i)
                .map(|a| a.value().to_owned())
                .unwrap_or_default(),
            XNode::Node(_) => match owner.node_type() {
                NodeType::Root | NodeType::Element => owner
                    .descendants()
                    .filter(|d| d.is_text())
                    .filter_map(|d| d.text())
                    .collect(),
                NodeType::Text | NodeType::Comment => owner.text().unwrap_or("").to_owned(),
                NodeType::PI => owner
                    .pi()
                    .and_then(|p| p.value)
                    .unwrap_or("")
                    .to_owned(),
            },
        }
    }

    pub fn boolean(&self, v: &Value) -> bool {
        match v {
            Value::Nodes(n) => !n.is_empty(),
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
        }
    }

    pub fn number(&self, v: &Value) -> Result<f64, Error> {
        Ok(match v {
            Value::Number(n) => *n,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::String(s) => string_to_number(s),
            Value::Nodes(_) => string_to_number(&self.string(v)),
        })
    }

    pub fn string(&self, v: &Value) -> String {
        match v {
            Value::String(s) => s.clone(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Nodes(ns) => ns
                .iter()
                .min_by_key(|n| n.order_key())
                .map(|n| self.string_value(*n))
                .unwrap_or_default(),
        }
    }
}

fn as_x(n: Node<'_, '_>) -> XNode {
    XNode::Node(n.id())
}

/// Compare two non-node-set values per XPath 1.0.
fn compare_atoms(a: &Value, op: BinOp, b: &Value) -> bool {
    let num = |v: &Value| -> f64 {
        match v {
            Value::Number(n) => *n,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::String(s) => string_to_number(s),
            Value::Nodes(_) => f64::NAN,
        }
    };
    let boolean = |v: &Value| -> bool {
        match v {
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Nodes(n) => !n.is_empty(),
        }
    };
    match op {
        BinOp::Eq | BinOp::Neq => {
            let eq = if matches!(a, Value::Boolean(_)) || matches!(b, Value::Boolean(_)) {
                boolean(a) == boolean(b)
            } else if matches!(a, Value::Number(_)) || matches!(b, Value::Number(_)) {
                num(a) == num(b)
            } else {
                let s = |v: &Value| match v {
                    Value::String(s) => s.clone(),
                    _ => String::new(),
                };
                s(a) == s(b)
            };
            if op == BinOp::Eq {
                eq
            } else {
                !eq
            }
        }
        BinOp::Lt => num(a) < num(b),
        BinOp::Le => num(a) <= num(b),
        BinOp::Gt => num(a) > num(b),
        BinOp::Ge => num(a) >= num(b),
        _ => false,
    }
}

/// Sort into document order and drop duplicates.
pub(super) fn sort_dedup(mut nodes: Vec<XNode>) -> Vec<XNode> {
    nodes.sort_by_key(|n| n.order_key());
    nodes.dedup();
    nodes
}

/// XPath `round()`: halves round towards positive infinity.
fn round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

/// Convert a string to a number per the XPath `Number` production.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r'));
    let digits = t.strip_prefix('-').unwrap_or(t);
    let valid = !digits.is_empty()
        && digits != "."
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1;
    if valid {
        t.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// Convert a number to its XPath string form.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_owned()
    } else if n == 0.0 {
        "0".to_owned()
    } else {
        format!("{n}")
    }
}

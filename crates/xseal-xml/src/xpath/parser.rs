#![forbid(unsafe_code)]

//! XPath 1.0 tokenizer and recursive-descent parser.

use std::collections::HashMap;

use xseal_core::Error;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    DotDot,
    At,
    Comma,
    AxisSep,
    Slash,
    DoubleSlash,
    Pipe,
    Plus,
    Minus,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    /// `*` in operator position.
    Mul,
    /// `*` as a name test.
    Star,
    And,
    Or,
    Mod,
    Div,
    Literal(String),
    Number(f64),
    /// NCName, QName or `prefix:*`.
    Name(String),
    Var(String),
}

impl Tok {
    /// Whether a following `*` or NCName must be read as an operator.
    fn puts_operator_next(&self) -> bool {
        !matches!(
            self,
            Tok::At
                | Tok::AxisSep
                | Tok::LParen
                | Tok::LBracket
                | Tok::Comma
                | Tok::And
                | Tok::Or
                | Tok::Mod
                | Tok::Div
                | Tok::Mul
                | Tok::Slash
                | Tok::DoubleSlash
                | Tok::Pipe
                | Tok::Plus
                | Tok::Minus
                | Tok::Eq
                | Tok::Neq
                | Tok::Lt
                | Tok::Le
                | Tok::Gt
                | Tok::Ge
        )
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{b7}')
}

fn tokenize(expr: &str) -> Result<Vec<Tok>, Error> {
    let chars: Vec<char> = expr.chars().collect();
    let mut toks: Vec<Tok> = Vec::new();
    let mut i = 0;

    let read_ncname = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && is_name_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };

    while i < chars.len() {
        let c = chars[i];
        let operator_pos = toks.last().is_some_and(Tok::puts_operator_next);
        let next = chars.get(i + 1).copied();
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
                continue;
            }
            '(' => toks.push(Tok::LParen),
            ')' => toks.push(Tok::RParen),
            '[' => toks.push(Tok::LBracket),
            ']' => toks.push(Tok::RBracket),
            '@' => toks.push(Tok::At),
            ',' => toks.push(Tok::Comma),
            '|' => toks.push(Tok::Pipe),
            '+' => toks.push(Tok::Plus),
            '-' => toks.push(Tok::Minus),
            '=' => toks.push(Tok::Eq),
            '!' if next == Some('=') => {
                toks.push(Tok::Neq);
                i += 1;
            }
            '<' if next == Some('=') => {
                toks.push(Tok::Le);
                i += 1;
            }
            '<' => toks.push(Tok::Lt),
            '>' if next == Some('=') => {
                toks.push(Tok::Ge);
                i += 1;
            }
            '>' => toks.push(Tok::Gt),
            ':' if next == Some(':') => {
                toks.push(Tok::AxisSep);
                i += 1;
            }
            '/' if next == Some('/') => {
                toks.push(Tok::DoubleSlash);
                i += 1;
            }
            '/' => toks.push(Tok::Slash),
            '*' => toks.push(if operator_pos { Tok::Mul } else { Tok::Star }),
            '.' if next == Some('.') => {
                toks.push(Tok::DotDot);
                i += 1;
            }
            '.' if !next.is_some_and(|n| n.is_ascii_digit()) => toks.push(Tok::Dot),
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| Error::XPath(format!("unterminated literal in '{expr}'")))?;
                toks.push(Tok::Literal(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
                continue;
            }
            '$' => {
                i += 1;
                let name = read_ncname(&mut i);
                toks.push(Tok::Var(name));
                continue;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i < chars.len() && chars[i] == '.' {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let s: String = chars[start..i].iter().collect();
                let n = s
                    .parse::<f64>()
                    .map_err(|_| Error::XPath(format!("bad number '{s}'")))?;
                toks.push(Tok::Number(n));
                continue;
            }
            c if is_name_start(c) => {
                let mut name = read_ncname(&mut i);
                if operator_pos {
                    let op = match name.as_str() {
                        "and" => Tok::And,
                        "or" => Tok::Or,
                        "mod" => Tok::Mod,
                        "div" => Tok::Div,
                        _ => {
                            return Err(Error::XPath(format!(
                                "unexpected name '{name}' in '{expr}'"
                            )))
                        }
                    };
                    toks.push(op);
                    continue;
                }
                if i + 1 < chars.len() && chars[i] == ':' && chars[i + 1] != ':' {
                    if chars[i + 1] == '*' {
                        name.push_str(":*");
                        i += 2;
                    } else if is_name_start(chars[i + 1]) {
                        i += 1;
                        let local = read_ncname(&mut i);
                        name.push(':');
                        name.push_str(&local);
                    }
                }
                toks.push(Tok::Name(name));
                continue;
            }
            other => {
                return Err(Error::XPath(format!(
                    "unexpected character '{other}' in '{expr}'"
                )))
            }
        }
        i += 1;
    }
    Ok(toks)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    Attribute,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Self::Child,
            "descendant" => Self::Descendant,
            "descendant-or-self" => Self::DescendantOrSelf,
            "self" => Self::SelfAxis,
            "parent" => Self::Parent,
            "ancestor" => Self::Ancestor,
            "ancestor-or-self" => Self::AncestorOrSelf,
            "attribute" => Self::Attribute,
            "following-sibling" => Self::FollowingSibling,
            "preceding-sibling" => Self::PrecedingSibling,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// `*`
    Any,
    /// `prefix:*`, holding the resolved namespace URI.
    AnyInNamespace(String),
    /// A QName. `ns` is `None` for the null namespace.
    Name { ns: Option<String>, local: String },
    Node,
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathStart {
    /// Relative to the context node.
    Context,
    /// `/`
    Root,
    /// A filter expression such as `id('x')` or `(a|b)[1]`.
    Filter(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Union,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Negate(Box<Expr>),
    Literal(String),
    Number(f64),
    Call(String, Vec<Expr>),
    /// A primary expression followed by predicates.
    Filter(Box<Expr>, Vec<Expr>),
    Path { start: PathStart, steps: Vec<Step> },
}

/// Parse an XPath expression, resolving prefixes through `namespaces`.
pub fn parse(expr: &str, namespaces: &HashMap<String, String>) -> Result<Expr, Error> {
    let toks = tokenize(expr)?;
    let mut p = Parser {
        toks,
        pos: 0,
        namespaces,
        source: expr,
    };
    let e = p.or_expr()?;
    if p.pos != p.toks.len() {
        return Err(p.error("trailing tokens"));
    }
    Ok(e)
}

struct Parser<'a> {
    toks: Vec<Tok>,
    pos: usize,
    namespaces: &'a HashMap<String, String>,
    source: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.toks.get(self.pos + offset)
    }

    fn eat(&mut self, t: &Tok) -> bool {
        if self.peek() == Some(t) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, t: &Tok) -> Result<(), Error> {
        if self.eat(t) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {t:?}")))
        }
    }

    fn error(&self, msg: &str) -> Error {
        Error::XPath(format!("{msg} at token {} in '{}'", self.pos, self.source))
    }

    fn binary_level(
        &mut self,
        ops: &[(Tok, BinOp)],
        next: fn(&mut Self) -> Result<Expr, Error>,
    ) -> Result<Expr, Error> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (tok, op) in ops {
                if self.eat(tok) {
                    let rhs = next(self)?;
                    lhs = Expr::Binary(Box::new(lhs), *op, Box::new(rhs));
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn or_expr(&mut self) -> Result<Expr, Error> {
        self.binary_level(&[(Tok::Or, BinOp::Or)], Self::and_expr)
    }

    fn and_expr(&mut self) -> Result<Expr, Error> {
        self.binary_level(&[(Tok::And, BinOp::And)], Self::equality_expr)
    }

    fn equality_expr(&mut self) -> Result<Expr, Error> {
        self.binary_level(
            &[(Tok::Eq, BinOp::Eq), (Tok::Neq, BinOp::Neq)],
            Self::relational_expr,
        )
    }

    fn relational_expr(&mut self) -> Result<Expr, Error> {
        self.binary_level(
            &[
                (Tok::Le, BinOp::Le),
                (Tok::Ge, BinOp::Ge),
                (Tok::Lt, BinOp::Lt),
                (Tok::Gt, BinOp::Gt),
            ],
            Self::additive_expr,
        )
    }

    fn additive_expr(&mut self) -> Result<Expr, Error> {
        self.binary_level(
            &[(Tok::Plus, BinOp::Add), (Tok::Minus, BinOp::Sub)],
            Self::multiplicative_expr,
        )
    }

    fn multiplicative_expr(&mut self) -> Result<Expr, Error> {
        self.binary_level(
            &[
                (Tok::Mul, BinOp::Mul),
                (Tok::Div, BinOp::Div),
                (Tok::Mod, BinOp::Mod),
            ],
            Self::unary_expr,
        )
    }

    fn unary_expr(&mut self) -> Result<Expr, Error> {
        if self.eat(&Tok::Minus) {
            return Ok(Expr::Negate(Box::new(self.unary_expr()?)));
        }
        self.binary_level(&[(Tok::Pipe, BinOp::Union)], Self::path_expr)
    }

    fn path_expr(&mut self) -> Result<Expr, Error> {
        match self.peek() {
            Some(Tok::Slash) => {
                self.pos += 1;
                let steps = if self.starts_step() {
                    self.relative_steps()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path {
                    start: PathStart::Root,
                    steps,
                })
            }
            Some(Tok::DoubleSlash) => {
                self.pos += 1;
                let mut steps = vec![descendant_or_self_step()];
                steps.extend(self.relative_steps()?);
                Ok(Expr::Path {
                    start: PathStart::Root,
                    steps,
                })
            }
            _ if self.starts_filter() => {
                let primary = self.primary_expr()?;
                let predicates = self.predicates()?;
                let filter = if predicates.is_empty() {
                    primary
                } else {
                    Expr::Filter(Box::new(primary), predicates)
                };
                let mut steps = Vec::new();
                if self.eat(&Tok::Slash) {
                    steps = self.relative_steps()?;
                } else if self.eat(&Tok::DoubleSlash) {
                    steps.push(descendant_or_self_step());
                    steps.extend(self.relative_steps()?);
                }
                if steps.is_empty() {
                    Ok(filter)
                } else {
                    Ok(Expr::Path {
                        start: PathStart::Filter(Box::new(filter)),
                        steps,
                    })
                }
            }
            _ => Ok(Expr::Path {
                start: PathStart::Context,
                steps: self.relative_steps()?,
            }),
        }
    }

    fn starts_filter(&self) -> bool {
        match self.peek() {
            Some(Tok::Literal(_) | Tok::Number(_) | Tok::Var(_) | Tok::LParen) => true,
            Some(Tok::Name(n)) => {
                self.peek_at(1) == Some(&Tok::LParen) && !is_node_type(n)
            }
            _ => false,
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Tok::Name(_) | Tok::Star | Tok::Dot | Tok::DotDot | Tok::At)
        )
    }

    fn relative_steps(&mut self) -> Result<Vec<Step>, Error> {
        let mut steps = vec![self.step()?];
        loop {
            if self.eat(&Tok::Slash) {
                steps.push(self.step()?);
            } else if self.eat(&Tok::DoubleSlash) {
                steps.push(descendant_or_self_step());
                steps.push(self.step()?);
            } else {
                return Ok(steps);
            }
        }
    }

    fn step(&mut self) -> Result<Step, Error> {
        if self.eat(&Tok::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Tok::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        let axis = if self.eat(&Tok::At) {
            Axis::Attribute
        } else if let (Some(Tok::Name(n)), Some(Tok::AxisSep)) = (self.peek(), self.peek_at(1)) {
            let axis = Axis::from_name(n)
                .ok_or_else(|| self.error(&format!("unsupported axis '{n}'")))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };
        let test = self.node_test()?;
        let predicates = self.predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn node_test(&mut self) -> Result<NodeTest, Error> {
        match self.peek().cloned() {
            Some(Tok::Star) => {
                self.pos += 1;
                Ok(NodeTest::Any)
            }
            Some(Tok::Name(name)) => {
                self.pos += 1;
                if is_node_type(&name) && self.eat(&Tok::LParen) {
                    let test = match name.as_str() {
                        "node" => NodeTest::Node,
                        "text" => NodeTest::Text,
                        "comment" => NodeTest::Comment,
                        _ => match self.peek().cloned() {
                            Some(Tok::Literal(target)) => {
                                self.pos += 1;
                                NodeTest::ProcessingInstruction(Some(target))
                            }
                            _ => NodeTest::ProcessingInstruction(None),
                        },
                    };
                    self.expect(&Tok::RParen)?;
                    return Ok(test);
                }
                if let Some(prefix) = name.strip_suffix(":*") {
                    return Ok(NodeTest::AnyInNamespace(self.resolve(prefix)?));
                }
                match name.split_once(':') {
                    Some((prefix, local)) => Ok(NodeTest::Name {
                        ns: Some(self.resolve(prefix)?),
                        local: local.to_owned(),
                    }),
                    None => Ok(NodeTest::Name {
                        ns: None,
                        local: name,
                    }),
                }
            }
            _ => Err(self.error("expected node test")),
        }
    }

    fn resolve(&self, prefix: &str) -> Result<String, Error> {
        self.namespaces
            .get(prefix)
            .cloned()
            .ok_or_else(|| Error::XPath(format!("unbound prefix '{prefix}' in '{}'", self.source)))
    }

    fn predicates(&mut self) -> Result<Vec<Expr>, Error> {
        let mut preds = Vec::new();
        while self.eat(&Tok::LBracket) {
            preds.push(self.or_expr()?);
            self.expect(&Tok::RBracket)?;
        }
        Ok(preds)
    }

    fn primary_expr(&mut self) -> Result<Expr, Error> {
        match self.peek().cloned() {
            Some(Tok::Literal(s)) => {
                self.pos += 1;
                Ok(Expr::Literal(s))
            }
            Some(Tok::Number(n)) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Some(Tok::Var(v)) => Err(self.error(&format!("variable ${v} is not bound"))),
            Some(Tok::LParen) => {
                self.pos += 1;
                let e = self.or_expr()?;
                self.expect(&Tok::RParen)?;
                Ok(e)
            }
            Some(Tok::Name(name)) => {
                self.pos += 1;
                self.expect(&Tok::LParen)?;
                let mut args = Vec::new();
                if !self.eat(&Tok::RParen) {
                    loop {
                        args.push(self.or_expr()?);
                        if self.eat(&Tok::RParen) {
                            break;
                        }
                        self.expect(&Tok::Comma)?;
                    }
                }
                Ok(Expr::Call(name, args))
            }
            _ => Err(self.error("expected primary expression")),
        }
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "node" | "text" | "comment" | "processing-instruction")
}

fn descendant_or_self_step() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}

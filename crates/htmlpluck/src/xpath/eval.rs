//! Expression evaluation over a [`Dom`]

use super::dom::{Dom, NodeKind, ROOT};
use super::parser::{Axis, CmpOp, Expr, Function, NodeTest, Step};
use crate::error::ExtractError;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    /// Node indices in document order, without duplicates
    Nodes(Vec<usize>),
    Str(String),
    Num(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy)]
struct Context {
    node: usize,
    position: usize,
    size: usize,
}

pub(crate) struct Evaluator<'d, 'a> {
    dom: &'d Dom<'a>,
}

impl<'d, 'a> Evaluator<'d, 'a> {
    pub fn new(dom: &'d Dom<'a>) -> Self {
        Self { dom }
    }

    /// Evaluate `expr` with the document root as context node
    pub fn select(&self, expr: &Expr) -> Result<Vec<usize>, ExtractError> {
        let root = Context {
            node: ROOT,
            position: 1,
            size: 1,
        };
        match self.eval(expr, root)? {
            Value::Nodes(nodes) => Ok(nodes),
            _ => Err(ExtractError::NotNodeSet),
        }
    }

    fn eval(&self, expr: &Expr, ctx: Context) -> Result<Value, ExtractError> {
        match expr {
            Expr::Path { absolute, steps } => {
                let start = if *absolute { ROOT } else { ctx.node };
                Ok(Value::Nodes(self.apply_steps(vec![start], steps)?))
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let Value::Nodes(mut nodes) = self.eval(primary, ctx)? else {
                    return Err(ExtractError::Evaluation(
                        "predicates and paths require a node-set".to_string(),
                    ));
                };
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                Ok(Value::Nodes(self.apply_steps(nodes, steps)?))
            }
            Expr::Union(left, right) => {
                let (Value::Nodes(l), Value::Nodes(r)) =
                    (self.eval(left, ctx)?, self.eval(right, ctx)?)
                else {
                    return Err(ExtractError::Evaluation(
                        "union operands must be node-sets".to_string(),
                    ));
                };
                let merged: BTreeSet<usize> = l.into_iter().chain(r).collect();
                Ok(Value::Nodes(merged.into_iter().collect()))
            }
            Expr::Or(left, right) => Ok(Value::Bool(
                self.boolean(&self.eval(left, ctx)?) || self.boolean(&self.eval(right, ctx)?),
            )),
            Expr::And(left, right) => Ok(Value::Bool(
                self.boolean(&self.eval(left, ctx)?) && self.boolean(&self.eval(right, ctx)?),
            )),
            Expr::Compare(op, left, right) => {
                let l = self.eval(left, ctx)?;
                let r = self.eval(right, ctx)?;
                Ok(Value::Bool(self.compare(*op, &l, &r)))
            }
            Expr::Add(left, right) => Ok(Value::Num(
                self.number(&self.eval(left, ctx)?) + self.number(&self.eval(right, ctx)?),
            )),
            Expr::Sub(left, right) => Ok(Value::Num(
                self.number(&self.eval(left, ctx)?) - self.number(&self.eval(right, ctx)?),
            )),
            Expr::Mul(left, right) => Ok(Value::Num(
                self.number(&self.eval(left, ctx)?) * self.number(&self.eval(right, ctx)?),
            )),
            Expr::Div(left, right) => Ok(Value::Num(
                self.number(&self.eval(left, ctx)?) / self.number(&self.eval(right, ctx)?),
            )),
            Expr::Mod(left, right) => Ok(Value::Num(
                self.number(&self.eval(left, ctx)?) % self.number(&self.eval(right, ctx)?),
            )),
            Expr::Neg(inner) => Ok(Value::Num(-self.number(&self.eval(inner, ctx)?))),
            Expr::Literal(s) => Ok(Value::Str(s.clone())),
            Expr::Number(n) => Ok(Value::Num(*n)),
            Expr::Call(function, args) => self.call(*function, args, ctx),
        }
    }

    fn apply_steps(&self, start: Vec<usize>, steps: &[Step]) -> Result<Vec<usize>, ExtractError> {
        let mut current = start;
        for step in steps {
            let mut next = BTreeSet::new();
            for &node in &current {
                let mut candidates: Vec<usize> = self
                    .axis(step.axis, node)
                    .into_iter()
                    .filter(|&id| self.matches(step.axis, &step.test, id))
                    .collect();
                for predicate in &step.predicates {
                    candidates = self.filter(candidates, predicate)?;
                }
                next.extend(candidates);
            }
            current = next.into_iter().collect();
        }
        Ok(current)
    }

    /// Keep the nodes for which `predicate` holds, in the given order
    fn filter(&self, nodes: Vec<usize>, predicate: &Expr) -> Result<Vec<usize>, ExtractError> {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (index, node) in nodes.into_iter().enumerate() {
            let ctx = Context {
                node,
                position: index + 1,
                size,
            };
            let keep = match self.eval(predicate, ctx)? {
                Value::Num(n) => n == ctx.position as f64,
                other => self.boolean(&other),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    /// Nodes on `axis` from `node`, in axis order (reverse axes nearest first)
    fn axis(&self, axis: Axis, node: usize) -> Vec<usize> {
        let dom = self.dom;
        let current = dom.node(node);
        let non_attribute = |id: &usize| !dom.is_attribute(*id);

        match axis {
            Axis::Child => current.children.clone(),
            Axis::Attribute => current.attributes.clone(),
            Axis::SelfAxis => vec![node],
            Axis::Parent => current.parent.into_iter().collect(),
            Axis::Descendant => (node + 1..current.end).filter(non_attribute).collect(),
            Axis::DescendantOrSelf => std::iter::once(node)
                .chain((node + 1..current.end).filter(non_attribute))
                .collect(),
            Axis::Ancestor => self.ancestors(node),
            Axis::AncestorOrSelf => std::iter::once(node).chain(self.ancestors(node)).collect(),
            Axis::FollowingSibling | Axis::PrecedingSibling => {
                if dom.is_attribute(node) {
                    return Vec::new();
                }
                let Some(parent) = current.parent else {
                    return Vec::new();
                };
                let siblings = &dom.node(parent).children;
                let Some(at) = siblings.iter().position(|&id| id == node) else {
                    return Vec::new();
                };
                if axis == Axis::FollowingSibling {
                    siblings[at + 1..].to_vec()
                } else {
                    siblings[..at].iter().rev().copied().collect()
                }
            }
            Axis::Following => {
                // An attribute has no descendants, so its owner's children follow it.
                let from = if dom.is_attribute(node) {
                    node + 1
                } else {
                    current.end
                };
                (from..dom.len()).filter(non_attribute).collect()
            }
            Axis::Preceding => {
                let ancestors = self.ancestors(node);
                (0..node)
                    .rev()
                    .filter(non_attribute)
                    .filter(|id| !ancestors.contains(id))
                    .collect()
            }
        }
    }

    fn ancestors(&self, node: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut current = self.dom.node(node).parent;
        while let Some(id) = current {
            out.push(id);
            current = self.dom.node(id).parent;
        }
        out
    }

    fn matches(&self, axis: Axis, test: &NodeTest, id: usize) -> bool {
        let kind = self.dom.node(id).kind;
        let principal = match axis {
            Axis::Attribute => matches!(kind, NodeKind::Attribute { .. }),
            _ => matches!(kind, NodeKind::Element(_)),
        };
        match test {
            NodeTest::Node => true,
            NodeTest::Any => principal,
            NodeTest::Name(name) => principal && self.dom.name(id).eq_ignore_ascii_case(name),
            NodeTest::Text => matches!(kind, NodeKind::Text(_)),
            NodeTest::Comment => matches!(kind, NodeKind::Comment(_)),
        }
    }

    fn call(&self, function: Function, args: &[Expr], ctx: Context) -> Result<Value, ExtractError> {
        let arg = |index: usize| -> Result<Value, ExtractError> {
            match args.get(index) {
                Some(expr) => self.eval(expr, ctx),
                None => Ok(Value::Nodes(vec![ctx.node])),
            }
        };
        let node_arg = |index: usize| -> Result<Vec<usize>, ExtractError> {
            match arg(index)? {
                Value::Nodes(nodes) => Ok(nodes),
                _ => Err(ExtractError::Evaluation(format!(
                    "{:?}() expects a node-set argument",
                    function
                ))),
            }
        };

        Ok(match function {
            Function::Last => Value::Num(ctx.size as f64),
            Function::Position => Value::Num(ctx.position as f64),
            Function::True => Value::Bool(true),
            Function::False => Value::Bool(false),
            Function::Count => Value::Num(node_arg(0)?.len() as f64),
            Function::Not => Value::Bool(!self.boolean(&arg(0)?)),
            Function::Boolean => Value::Bool(self.boolean(&arg(0)?)),
            Function::Number => Value::Num(self.number(&arg(0)?)),
            Function::String => Value::Str(self.string(&arg(0)?)),
            Function::StringLength => {
                Value::Num(self.string(&arg(0)?).chars().count() as f64)
            }
            Function::NormalizeSpace => Value::Str(
                self.string(&arg(0)?)
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Function::Contains => {
                let haystack = self.string(&arg(0)?);
                Value::Bool(haystack.contains(self.string(&arg(1)?).as_str()))
            }
            Function::StartsWith => {
                let haystack = self.string(&arg(0)?);
                Value::Bool(haystack.starts_with(self.string(&arg(1)?).as_str()))
            }
            Function::Concat => {
                let mut out = String::new();
                for index in 0..args.len() {
                    out.push_str(&self.string(&arg(index)?));
                }
                Value::Str(out)
            }
            Function::Substring => {
                let text = self.string(&arg(0)?);
                let start = round(self.number(&arg(1)?));
                let end = match args.get(2) {
                    Some(_) => start + round(self.number(&arg(2)?)),
                    None => f64::INFINITY,
                };
                Value::Str(substring(&text, start, end))
            }
            Function::SubstringBefore => {
                let text = self.string(&arg(0)?);
                let needle = self.string(&arg(1)?);
                let before = text.find(needle.as_str()).map(|at| &text[..at]);
                Value::Str(before.unwrap_or_default().to_string())
            }
            Function::SubstringAfter => {
                let text = self.string(&arg(0)?);
                let needle = self.string(&arg(1)?);
                let after = text.find(needle.as_str()).map(|at| &text[at + needle.len()..]);
                Value::Str(after.unwrap_or_default().to_string())
            }
            Function::Translate => {
                let text = self.string(&arg(0)?);
                let from: Vec<char> = self.string(&arg(1)?).chars().collect();
                let to: Vec<char> = self.string(&arg(2)?).chars().collect();
                Value::Str(translate(&text, &from, &to))
            }
            Function::Sum => Value::Num(
                node_arg(0)?
                    .iter()
                    .map(|&id| parse_number(&self.dom.string_value(id)))
                    .sum(),
            ),
            Function::Floor => Value::Num(self.number(&arg(0)?).floor()),
            Function::Ceiling => Value::Num(self.number(&arg(0)?).ceil()),
            Function::Round => Value::Num(round(self.number(&arg(0)?))),
            Function::Lang => {
                let wanted = self.string(&arg(0)?);
                Value::Bool(self.lang(ctx.node).is_some_and(|lang| lang_matches(lang, &wanted)))
            }
            Function::Name | Function::LocalName => {
                let name = node_arg(0)?
                    .first()
                    .map(|&id| self.dom.name(id).to_string())
                    .unwrap_or_default();
                Value::Str(name)
            }
        })
    }

    /// Nearest `lang` or `xml:lang` attribute on `node` or its ancestors
    fn lang(&self, node: usize) -> Option<&'a str> {
        let mut current = Some(node);
        while let Some(id) = current {
            let found = self.dom.node(id).attributes.iter().find_map(|&attr| {
                match self.dom.node(attr).kind {
                    NodeKind::Attribute { name, value }
                        if name.eq_ignore_ascii_case("lang")
                            || name.eq_ignore_ascii_case("xml:lang") =>
                    {
                        Some(value)
                    }
                    _ => None,
                }
            });
            if found.is_some() {
                return found;
            }
            current = self.dom.node(id).parent;
        }
        None
    }

    fn boolean(&self, value: &Value) -> bool {
        match value {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn number(&self, value: &Value) -> f64 {
        match value {
            Value::Num(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            other => parse_number(&self.string(other)),
        }
    }

    fn string(&self, value: &Value) -> String {
        match value {
            Value::Nodes(nodes) => nodes
                .first()
                .map(|&id| self.dom.string_value(id))
                .unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn compare(&self, op: CmpOp, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Nodes(l), Value::Nodes(r)) => {
                let rs: Vec<String> = r.iter().map(|&id| self.dom.string_value(id)).collect();
                l.iter().any(|&id| {
                    let ls = self.dom.string_value(id);
                    rs.iter().any(|rv| {
                        self.compare_atoms(op, &Value::Str(ls.clone()), &Value::Str(rv.clone()))
                    })
                })
            }
            (Value::Nodes(nodes), Value::Bool(_)) | (Value::Bool(_), Value::Nodes(nodes)) => {
                let as_bool = Value::Bool(!nodes.is_empty());
                if matches!(left, Value::Nodes(_)) {
                    self.compare_atoms(op, &as_bool, right)
                } else {
                    self.compare_atoms(op, left, &as_bool)
                }
            }
            (Value::Nodes(nodes), other) => nodes.iter().any(|&id| {
                let atom = self.node_atom(id, other);
                self.compare_atoms(op, &atom, other)
            }),
            (other, Value::Nodes(nodes)) => nodes.iter().any(|&id| {
                let atom = self.node_atom(id, other);
                self.compare_atoms(op, other, &atom)
            }),
            _ => self.compare_atoms(op, left, right),
        }
    }

    /// Convert a node to the same type as the value it is compared with
    fn node_atom(&self, id: usize, other: &Value) -> Value {
        let text = self.dom.string_value(id);
        match other {
            Value::Num(_) => Value::Num(parse_number(&text)),
            _ => Value::Str(text),
        }
    }

    fn compare_atoms(&self, op: CmpOp, left: &Value, right: &Value) -> bool {
        match op {
            CmpOp::Eq | CmpOp::Neq => {
                let equal = if matches!(left, Value::Bool(_)) || matches!(right, Value::Bool(_)) {
                    self.boolean(left) == self.boolean(right)
                } else if matches!(left, Value::Num(_)) || matches!(right, Value::Num(_)) {
                    self.number(left) == self.number(right)
                } else {
                    self.string(left) == self.string(right)
                };
                equal == (op == CmpOp::Eq)
            }
            CmpOp::Lt => self.number(left) < self.number(right),
            CmpOp::Le => self.number(left) <= self.number(right),
            CmpOp::Gt => self.number(left) > self.number(right),
            CmpOp::Ge => self.number(left) >= self.number(right),
        }
    }
}

/// XPath `number()` conversion of a string: optional minus, digits, dot
fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    let digits = t.strip_prefix('-').unwrap_or(t);
    let well_formed = !digits.is_empty()
        && digits != "."
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1;
    if well_formed {
        t.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// XPath `round()`: halves round towards positive infinity
fn round(n: f64) -> f64 {
    if n.is_finite() {
        (n + 0.5).floor()
    } else {
        n
    }
}

/// Characters at 1-based positions `p` with `start <= p < end`
fn substring(text: &str, start: f64, end: f64) -> String {
    text.chars()
        .zip(1u32..)
        .filter(|&(_, p)| {
            let p = f64::from(p);
            p >= start && p < end
        })
        .map(|(c, _)| c)
        .collect()
}

/// Replace each char found in `from` with the char at the same index in
/// `to`, dropping it when `to` is shorter
fn translate(text: &str, from: &[char], to: &[char]) -> String {
    text.chars()
        .filter_map(|c| match from.iter().position(|&f| f == c) {
            Some(index) => to.get(index).copied(),
            None => Some(c),
        })
        .collect()
}

/// `lang` equals `wanted` or is a subtag of it, ignoring ASCII case
fn lang_matches(lang: &str, wanted: &str) -> bool {
    let lang = lang.to_ascii_lowercase();
    let wanted = wanted.to_ascii_lowercase();
    lang == wanted
        || lang
            .strip_prefix(wanted.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

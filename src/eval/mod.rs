//! Path program evaluation.
//!
//! The walk is written once against [`JsonNode`], a `Copy` view into some
//! JSON representation. `&Value` (parsed trees) and
//! [`FlatValue`](crate::flat_value::FlatValue) (flat sub-column buffers)
//! both implement it, so the native and flat evaluators share one
//! definition of extraction semantics.
//!
//! Evaluation never copies: results point into the document. Only
//! wildcards and slices allocate, for the `Vec` that gathers their hits.

pub mod terminal;

use crate::path::{PathProgram, PathToken};
use crate::value::Value;

/// JSON kind of a node, with numbers split into int and double.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Null,
    Bool,
    Int,
    Double,
    String,
    Array,
    Object,
}

/// Read-only view of one JSON value living for `'a`.
pub trait JsonNode<'a>: Copy + 'a {
    fn kind(self) -> JsonKind;

    fn as_bool(self) -> Option<bool>;

    fn as_int(self) -> Option<i64>;

    fn as_double(self) -> Option<f64>;

    fn as_str(self) -> Option<&'a str>;

    /// Object member by key. With duplicate keys the last one wins.
    /// `None` for non-objects, including JSON null.
    fn field(self, name: &str) -> Option<Self>;

    /// Array element. `None` when out of range or not an array.
    fn index(self, idx: usize) -> Option<Self>;

    /// Element count of arrays, member count of objects, `None` for scalars.
    fn container_len(self) -> Option<usize>;

    /// Array elements in order; empty for non-arrays.
    fn elements(self) -> impl Iterator<Item = Self> + 'a;

    /// Object members in document order; empty for non-objects.
    fn entries(self) -> impl Iterator<Item = (&'a str, Self)> + 'a;

    /// Materialize an owned tree.
    fn to_value(self) -> Value {
        match self.kind() {
            JsonKind::Null => Value::Null,
            JsonKind::Bool => Value::Bool(self.as_bool().unwrap_or_default()),
            JsonKind::Int => Value::Int(self.as_int().unwrap_or_default()),
            JsonKind::Double => Value::Double(self.as_double().unwrap_or_default()),
            JsonKind::String => Value::String(self.as_str().unwrap_or_default().to_string()),
            JsonKind::Array => Value::Array(self.elements().map(|e| e.to_value()).collect()),
            JsonKind::Object => Value::Object(
                self.entries()
                    .map(|(k, v)| (k.to_string(), v.to_value()))
                    .collect(),
            ),
        }
    }
}

impl<'a> JsonNode<'a> for &'a Value {
    fn kind(self) -> JsonKind {
        match self {
            Value::Null => JsonKind::Null,
            Value::Bool(_) => JsonKind::Bool,
            Value::Int(_) => JsonKind::Int,
            Value::Double(_) => JsonKind::Double,
            Value::String(_) => JsonKind::String,
            Value::Array(_) => JsonKind::Array,
            Value::Object(_) => JsonKind::Object,
        }
    }

    fn as_bool(self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    fn as_double(self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(*f),
            _ => None,
        }
    }

    fn as_str(self) -> Option<&'a str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn field(self, name: &str) -> Option<Self> {
        self.get(name)
    }

    fn index(self, idx: usize) -> Option<Self> {
        match self {
            Value::Array(items) => items.get(idx),
            _ => None,
        }
    }

    fn container_len(self) -> Option<usize> {
        match self {
            Value::Array(items) => Some(items.len()),
            Value::Object(entries) => Some(entries.len()),
            _ => None,
        }
    }

    fn elements(self) -> impl Iterator<Item = Self> + 'a {
        let items: &'a [Value] = match self {
            Value::Array(items) => items.as_slice(),
            _ => &[],
        };
        items.iter()
    }

    fn entries(self) -> impl Iterator<Item = (&'a str, Self)> + 'a {
        let entries: &'a [(String, Value)] = match self {
            Value::Object(entries) => entries.as_slice(),
            _ => &[],
        };
        entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn to_value(self) -> Value {
        self.clone()
    }
}

/// A successful evaluation result.
///
/// `Node` points into the document. `Array` holds the hits of a wildcard or
/// slice, itself possibly nested when several fan-out tokens are chained.
#[derive(Clone)]
pub enum Extracted<N> {
    Node(N),
    Array(Vec<Extracted<N>>),
}

impl<'a, N: JsonNode<'a>> Extracted<N> {
    pub fn kind(&self) -> JsonKind {
        match self {
            Extracted::Node(node) => node.kind(),
            Extracted::Array(_) => JsonKind::Array,
        }
    }

    /// The single node, when the result was not gathered by a fan-out.
    pub fn as_node(&self) -> Option<N> {
        match self {
            Extracted::Node(node) => Some(*node),
            Extracted::Array(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Extracted::Node(node) => node.to_value(),
            Extracted::Array(items) => Value::Array(items.iter().map(Extracted::to_value).collect()),
        }
    }
}

/// Walk `program` from `root`. `None` means "not found".
pub fn evaluate<'a, N: JsonNode<'a>>(program: &PathProgram, root: N) -> Option<Extracted<N>> {
    walk(program.tokens(), root)
}

pub(crate) fn walk<'a, N: JsonNode<'a>>(tokens: &[PathToken], root: N) -> Option<Extracted<N>> {
    let mut current = root;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            PathToken::Key(name) => current = current.field(name)?,
            PathToken::Index(idx) => current = current.index(*idx)?,
            PathToken::Wildcard => {
                if current.kind() != JsonKind::Array {
                    return None;
                }
                let rest = &tokens[i + 1..];
                let hits = current.elements().filter_map(|e| walk(rest, e)).collect();
                return Some(Extracted::Array(hits));
            }
            PathToken::Slice { start, end } => {
                let len = match (current.kind(), current.container_len()) {
                    (JsonKind::Array, Some(len)) => len,
                    _ => return None,
                };
                let lo = start.unwrap_or(0).min(len);
                let hi = end.unwrap_or(len).min(len);
                let rest = &tokens[i + 1..];
                let hits = current
                    .elements()
                    .skip(lo)
                    .take(hi.saturating_sub(lo))
                    .filter_map(|e| walk(rest, e))
                    .collect();
                return Some(Extracted::Array(hits));
            }
        }
    }
    Some(Extracted::Node(current))
}

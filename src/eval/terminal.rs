//! Terminal operations: turn "found value or not found" into a typed result.
//!
//! Each terminal is a unit struct so the row drivers in
//! [`crate::functions`] can be written once, generic over both the terminal
//! and the node representation.

use super::{Extracted, JsonKind, JsonNode};
use crate::output;
use crate::value::Value;

pub trait Terminal {
    type Output;

    /// Result when the path does not resolve.
    fn not_found(&self) -> Option<Self::Output> {
        None
    }

    /// Result for a resolved path. `None` is a SQL null.
    fn extract<'a, N: JsonNode<'a>>(&self, found: &Extracted<N>) -> Option<Self::Output>;

    /// Apply to an evaluation outcome.
    fn finish<'a, N: JsonNode<'a>>(&self, outcome: Option<&Extracted<N>>) -> Option<Self::Output> {
        match outcome {
            Some(found) => self.extract(found),
            None => self.not_found(),
        }
    }
}

/// `json_query`: the found value as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct Query;

/// `get_json_int`: ints as-is, doubles truncated toward zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetInt;

/// `get_json_double`: doubles as-is, ints widened.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetDouble;

/// `get_json_string`: string content, or canonical text for other kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetString;

/// `get_json_bool`: only JSON booleans.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetBool;

/// `json_exists`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exists;

/// `json_length`: container size, 1 for scalars, 0 when not found.
#[derive(Debug, Clone, Copy, Default)]
pub struct Length;

/// `json_keys`: object keys as a JSON array of strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Keys;

impl Terminal for Query {
    type Output = Value;

    fn extract<'a, N: JsonNode<'a>>(&self, found: &Extracted<N>) -> Option<Value> {
        Some(found.to_value())
    }
}

impl Terminal for GetInt {
    type Output = i64;

    fn extract<'a, N: JsonNode<'a>>(&self, found: &Extracted<N>) -> Option<i64> {
        let node = found.as_node()?;
        match node.kind() {
            JsonKind::Int => node.as_int(),
            JsonKind::Double => node.as_double().and_then(truncate_to_i64),
            _ => None,
        }
    }
}

fn truncate_to_i64(f: f64) -> Option<i64> {
    let t = f.trunc();
    // i64::MAX is not representable; 2^63 is the exclusive bound.
    if t >= -9_223_372_036_854_775_808.0 && t < 9_223_372_036_854_775_808.0 {
        Some(t as i64)
    } else {
        None
    }
}

impl Terminal for GetDouble {
    type Output = f64;

    fn extract<'a, N: JsonNode<'a>>(&self, found: &Extracted<N>) -> Option<f64> {
        let node = found.as_node()?;
        match node.kind() {
            JsonKind::Double => node.as_double(),
            JsonKind::Int => node.as_int().map(|n| n as f64),
            _ => None,
        }
    }
}

impl Terminal for GetString {
    type Output = String;

    fn extract<'a, N: JsonNode<'a>>(&self, found: &Extracted<N>) -> Option<String> {
        match found.as_node().map(|node| (node.kind(), node)) {
            Some((JsonKind::Null, _)) => None,
            Some((JsonKind::String, node)) => node.as_str().map(str::to_string),
            _ => output::format_extracted(found).ok(),
        }
    }
}

impl Terminal for GetBool {
    type Output = bool;

    fn extract<'a, N: JsonNode<'a>>(&self, found: &Extracted<N>) -> Option<bool> {
        found.as_node()?.as_bool()
    }
}

impl Terminal for Exists {
    type Output = bool;

    fn not_found(&self) -> Option<bool> {
        Some(false)
    }

    fn extract<'a, N: JsonNode<'a>>(&self, _found: &Extracted<N>) -> Option<bool> {
        Some(true)
    }
}

impl Terminal for Length {
    type Output = i64;

    fn not_found(&self) -> Option<i64> {
        Some(0)
    }

    fn extract<'a, N: JsonNode<'a>>(&self, found: &Extracted<N>) -> Option<i64> {
        let len = match found {
            Extracted::Array(items) => items.len(),
            Extracted::Node(node) => node.container_len().unwrap_or(1),
        };
        Some(len as i64)
    }
}

impl Terminal for Keys {
    type Output = Value;

    fn extract<'a, N: JsonNode<'a>>(&self, found: &Extracted<N>) -> Option<Value> {
        let node = found.as_node()?;
        if node.kind() != JsonKind::Object {
            return None;
        }
        let mut keys: Vec<&str> = Vec::new();
        for (key, _) in node.entries() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Some(Value::Array(keys.into_iter().map(Value::from).collect()))
    }
}

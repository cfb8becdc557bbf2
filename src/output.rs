//! Canonical JSON text.
//!
//! One serialization is externally observable: `{"k": v}` and `[a, b]` with a
//! single space after `:` and `,`, double-quoted strings, and doubles that
//! never use exponent notation. Writers go straight to a `Write` sink and are
//! generic over [`JsonNode`], so a parsed tree and a flat sub-column view
//! serialize through the same code.
use std::io::{self, Write};

use crate::eval::{Extracted, JsonKind, JsonNode};
use crate::value::Value;

/// Canonical text of an owned value.
pub fn format_canonical(value: &Value) -> io::Result<String> {
    render(|buf| write_node(buf, value))
}

/// Canonical text of any node.
pub fn format_node<'a, N: JsonNode<'a>>(node: N) -> io::Result<String> {
    render(|buf| write_node(buf, node))
}

/// Canonical text of an evaluation result.
pub fn format_extracted<'a, N: JsonNode<'a>>(found: &Extracted<N>) -> io::Result<String> {
    render(|buf| write_extracted(buf, found))
}

fn render(write: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> io::Result<String> {
    let mut buf = Vec::with_capacity(64);
    write(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn write_value<W: Write>(w: &mut W, value: &Value) -> io::Result<()> {
    write_node(w, value)
}

pub fn write_extracted<'a, N: JsonNode<'a>, W: Write>(
    w: &mut W,
    found: &Extracted<N>,
) -> io::Result<()> {
    match found {
        Extracted::Node(node) => write_node(w, *node),
        Extracted::Array(items) => {
            w.write_all(b"[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    w.write_all(b", ")?;
                }
                write_extracted(w, item)?;
            }
            w.write_all(b"]")
        }
    }
}

pub fn write_node<'a, N: JsonNode<'a>, W: Write>(w: &mut W, node: N) -> io::Result<()> {
    match node.kind() {
        JsonKind::Null => w.write_all(b"null"),
        JsonKind::Bool => {
            if node.as_bool().unwrap_or_default() {
                w.write_all(b"true")
            } else {
                w.write_all(b"false")
            }
        }
        JsonKind::Int => {
            let mut buf = itoa::Buffer::new();
            w.write_all(buf.format(node.as_int().unwrap_or_default()).as_bytes())
        }
        JsonKind::Double => write_double(w, node.as_double().unwrap_or_default()),
        JsonKind::String => write_json_string(w, node.as_str().unwrap_or_default()),
        JsonKind::Array => {
            w.write_all(b"[")?;
            for (i, item) in node.elements().enumerate() {
                if i > 0 {
                    w.write_all(b", ")?;
                }
                write_node(w, item)?;
            }
            w.write_all(b"]")
        }
        JsonKind::Object => {
            w.write_all(b"{")?;
            for (i, (key, item)) in node.entries().enumerate() {
                if i > 0 {
                    w.write_all(b", ")?;
                }
                write_json_string(w, key)?;
                w.write_all(b": ")?;
                write_node(w, item)?;
            }
            w.write_all(b"}")
        }
    }
}

/// Write a JSON-escaped string with surrounding quotes.
pub fn write_json_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_all(b"\"")?;
    let bytes = s.as_bytes();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        let escape: Option<&[u8]> = match b {
            b'"' => Some(b"\\\""),
            b'\\' => Some(b"\\\\"),
            b'\n' => Some(b"\\n"),
            b'\r' => Some(b"\\r"),
            b'\t' => Some(b"\\t"),
            b'\x08' => Some(b"\\b"),
            b'\x0c' => Some(b"\\f"),
            0..=0x1f => None, // handled below
            _ => continue,
        };
        if start < i {
            w.write_all(&bytes[start..i])?;
        }
        match escape {
            Some(esc) => w.write_all(esc)?,
            None => write!(w, "\\u{:04x}", b)?,
        }
        start = i + 1;
    }
    if start < bytes.len() {
        w.write_all(&bytes[start..])?;
    }
    w.write_all(b"\"")
}

/// Shortest round-trip decimal, `.0` appended to integral values.
///
/// `Display` for `f64` never switches to exponent notation, which keeps the
/// output re-parseable as the same double by the lenient parser.
pub fn write_double<W: Write>(w: &mut W, f: f64) -> io::Result<()> {
    if !f.is_finite() {
        return w.write_all(b"null");
    }
    let f = if f == 0.0 { 0.0 } else { f };
    if f.fract() == 0.0 {
        write!(w, "{f}.0")
    } else {
        write!(w, "{f}")
    }
}

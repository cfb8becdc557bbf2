//! Zero-copy navigation of flat token buffers.
//!
//! Flat sub-columns store each cell as a tagged byte sequence. `FlatValue<'a>`
//! is a `Copy` view into such a buffer that lets the evaluator walk objects
//! and arrays without heap-allocating a `Value` tree. Only results that a
//! terminal operation needs as owned JSON get materialized.
//!
//! Layout (all integers little-endian):
//!
//! | tag | payload |
//! |---|---|
//! | `TAG_NULL` | none |
//! | `TAG_BOOL` | 1 byte, 0 or 1 |
//! | `TAG_INT` | i64 |
//! | `TAG_DOUBLE` | f64 |
//! | `TAG_STRING` | u32 byte length, UTF-8 bytes |
//! | `TAG_ARRAY_START` | u32 count, elements, `TAG_ARRAY_END` |
//! | `TAG_OBJECT_START` | u32 count, (string key, value) pairs, `TAG_OBJECT_END` |

use std::fmt;

use crate::eval::{JsonKind, JsonNode};
use crate::value::Value;

pub const TAG_NULL: u8 = 0;
pub const TAG_BOOL: u8 = 1;
pub const TAG_INT: u8 = 2;
pub const TAG_DOUBLE: u8 = 3;
pub const TAG_STRING: u8 = 4;
pub const TAG_ARRAY_START: u8 = 5;
pub const TAG_ARRAY_END: u8 = 6;
pub const TAG_OBJECT_START: u8 = 7;
pub const TAG_OBJECT_END: u8 = 8;

/// Append the flat encoding of `value` to `buf`.
pub fn encode_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => buf.push(TAG_NULL),
        Value::Bool(b) => {
            buf.push(TAG_BOOL);
            buf.push(u8::from(*b));
        }
        Value::Int(n) => {
            buf.push(TAG_INT);
            buf.extend_from_slice(&n.to_le_bytes());
        }
        Value::Double(f) => {
            buf.push(TAG_DOUBLE);
            buf.extend_from_slice(&f.to_le_bytes());
        }
        Value::String(s) => encode_str(buf, s),
        Value::Array(items) => {
            buf.push(TAG_ARRAY_START);
            buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                encode_value(buf, item);
            }
            buf.push(TAG_ARRAY_END);
        }
        Value::Object(entries) => encode_object(buf, entries.iter().map(|(k, v)| (k.as_str(), v))),
    }
}

/// Append an object built from `entries`, in iteration order.
pub fn encode_object<'v>(
    buf: &mut Vec<u8>,
    entries: impl ExactSizeIterator<Item = (&'v str, &'v Value)>,
) {
    buf.push(TAG_OBJECT_START);
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (key, value) in entries {
        encode_str(buf, key);
        encode_value(buf, value);
    }
    buf.push(TAG_OBJECT_END);
}

fn encode_str(buf: &mut Vec<u8>, s: &str) {
    buf.push(TAG_STRING);
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// A zero-copy, `Copy`-able view into a flat token buffer.
///
/// Navigation (`get_field`, `array_iter`, ...) returns new views into the
/// same buffer. A truncated buffer reads as nulls and empty containers
/// rather than panicking.
#[derive(Clone, Copy)]
pub struct FlatValue<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FlatValue<'a> {
    #[inline]
    pub fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    /// Type tag at the current position.
    #[inline]
    pub fn tag(&self) -> u8 {
        self.buf.get(self.pos).copied().unwrap_or(TAG_NULL)
    }

    #[inline]
    fn read_u32(&self, at: usize) -> usize {
        self.buf
            .get(at..at + 4)
            .and_then(|b| <[u8; 4]>::try_from(b).ok())
            .map_or(0, |b| u32::from_le_bytes(b) as usize)
    }

    #[inline]
    fn read_8(&self, at: usize) -> [u8; 8] {
        self.buf
            .get(at..at + 8)
            .and_then(|b| <[u8; 8]>::try_from(b).ok())
            .unwrap_or_default()
    }

    fn read_str(&self, at: usize) -> &'a str {
        let len = self.read_u32(at + 1);
        self.buf
            .get(at + 5..at + 5 + len)
            .and_then(|b| std::str::from_utf8(b).ok())
            .unwrap_or_default()
    }

    /// Element count for arrays and objects.
    pub fn len(&self) -> Option<usize> {
        match self.tag() {
            TAG_ARRAY_START | TAG_OBJECT_START => Some(self.read_u32(self.pos + 1)),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Object member by key; the last occurrence of a duplicated key wins.
    pub fn get_field(&self, key: &str) -> Option<FlatValue<'a>> {
        self.object_iter()
            .filter(|(k, _)| *k == key)
            .last()
            .map(|(_, v)| v)
    }

    /// Array element, `None` when out of bounds or not an array.
    pub fn get_index(&self, idx: usize) -> Option<FlatValue<'a>> {
        self.array_iter().nth(idx)
    }

    pub fn array_iter(&self) -> FlatArrayIter<'a> {
        let remaining = match self.tag() {
            TAG_ARRAY_START => self.read_u32(self.pos + 1),
            _ => 0,
        };
        FlatArrayIter {
            buf: self.buf,
            pos: self.pos + 5,
            remaining,
        }
    }

    pub fn object_iter(&self) -> FlatObjectIter<'a> {
        let remaining = match self.tag() {
            TAG_OBJECT_START => self.read_u32(self.pos + 1),
            _ => 0,
        };
        FlatObjectIter {
            buf: self.buf,
            pos: self.pos + 5,
            remaining,
        }
    }

    /// Byte size of this value in the buffer, tag included.
    pub fn skip_bytes(&self) -> usize {
        match self.tag() {
            TAG_NULL => 1,
            TAG_BOOL => 2,
            TAG_INT | TAG_DOUBLE => 9,
            TAG_STRING => 5 + self.read_u32(self.pos + 1),
            TAG_ARRAY_START => {
                let mut iter = self.array_iter();
                iter.by_ref().for_each(drop);
                iter.pos - self.pos + 1
            }
            TAG_OBJECT_START => {
                let mut iter = self.object_iter();
                iter.by_ref().for_each(drop);
                iter.pos - self.pos + 1
            }
            _ => 1,
        }
    }

    /// The encoded bytes of this value.
    pub fn as_bytes(&self) -> &'a [u8] {
        let end = (self.pos + self.skip_bytes()).min(self.buf.len());
        self.buf.get(self.pos..end).unwrap_or_default()
    }
}

impl<'a> JsonNode<'a> for FlatValue<'a> {
    fn kind(self) -> JsonKind {
        match self.tag() {
            TAG_BOOL => JsonKind::Bool,
            TAG_INT => JsonKind::Int,
            TAG_DOUBLE => JsonKind::Double,
            TAG_STRING => JsonKind::String,
            TAG_ARRAY_START => JsonKind::Array,
            TAG_OBJECT_START => JsonKind::Object,
            _ => JsonKind::Null,
        }
    }

    fn as_bool(self) -> Option<bool> {
        match self.tag() {
            TAG_BOOL => Some(self.buf.get(self.pos + 1).is_some_and(|b| *b != 0)),
            _ => None,
        }
    }

    fn as_int(self) -> Option<i64> {
        match self.tag() {
            TAG_INT => Some(i64::from_le_bytes(self.read_8(self.pos + 1))),
            _ => None,
        }
    }

    fn as_double(self) -> Option<f64> {
        match self.tag() {
            TAG_DOUBLE => Some(f64::from_le_bytes(self.read_8(self.pos + 1))),
            _ => None,
        }
    }

    fn as_str(self) -> Option<&'a str> {
        match self.tag() {
            TAG_STRING => Some(self.read_str(self.pos)),
            _ => None,
        }
    }

    fn field(self, name: &str) -> Option<Self> {
        self.get_field(name)
    }

    fn index(self, idx: usize) -> Option<Self> {
        self.get_index(idx)
    }

    fn container_len(self) -> Option<usize> {
        self.len()
    }

    fn elements(self) -> impl Iterator<Item = Self> + 'a {
        self.array_iter()
    }

    fn entries(self) -> impl Iterator<Item = (&'a str, Self)> + 'a {
        self.object_iter()
    }
}

impl fmt::Debug for FlatValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = crate::output::format_node(*self).map_err(|_| fmt::Error)?;
        write!(f, "FlatValue({text})")
    }
}

/// Iterator over array elements in a flat buffer.
pub struct FlatArrayIter<'a> {
    buf: &'a [u8],
    pos: usize,
    remaining: usize,
}

impl<'a> Iterator for FlatArrayIter<'a> {
    type Item = FlatValue<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.pos >= self.buf.len() {
            return None;
        }
        let fv = FlatValue::new(self.buf, self.pos);
        self.pos += fv.skip_bytes();
        self.remaining -= 1;
        Some(fv)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// Iterator over object key-value pairs in a flat buffer.
pub struct FlatObjectIter<'a> {
    buf: &'a [u8],
    pos: usize,
    remaining: usize,
}

impl<'a> Iterator for FlatObjectIter<'a> {
    type Item = (&'a str, FlatValue<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.pos >= self.buf.len() {
            return None;
        }
        // Key: TAG_STRING + u32 len + bytes
        let key_view = FlatValue::new(self.buf, self.pos);
        debug_assert_eq!(key_view.tag(), TAG_STRING);
        let key = key_view.read_str(self.pos);
        let value = FlatValue::new(self.buf, self.pos + key_view.skip_bytes());
        self.pos = value.pos + value.skip_bytes();
        self.remaining -= 1;
        Some((key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

//! Composite builders: `json_array`, `json_object`, `to_json`.
//!
//! Objects built here never hold duplicate keys. A repeated key keeps the
//! position of its first occurrence and the value of its last.

use crate::column::{Arg, Column, CompositeColumn, Datum};
use crate::error::{JsonError, JsonResult};
use crate::value::Value;

fn check_rows(args: &[Arg<Value>], num_rows: usize) -> JsonResult<()> {
    match args.iter().filter_map(Arg::rows).find(|n| *n != num_rows) {
        Some(n) => Err(JsonError::InvalidArgument(format!(
            "argument column has {n} rows, expected {num_rows}"
        ))),
        None => Ok(()),
    }
}

fn upsert(entries: &mut Vec<(String, Value)>, key: String, value: Value) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some((_, slot)) => *slot = value,
        None => entries.push((key, value)),
    }
}

/// Key text of a JSON argument: string content, or canonical text.
fn key_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_canonical(),
    }
}

/// One array per row, arguments in order. SQL nulls become JSON nulls.
pub fn json_array(args: &[Arg<Value>], num_rows: usize) -> JsonResult<Column<Value>> {
    check_rows(args, num_rows)?;
    Ok((0..num_rows)
        .map(|row| {
            let items = args
                .iter()
                .map(|arg| arg.get(row).cloned().unwrap_or(Value::Null))
                .collect();
            Some(Value::Array(items))
        })
        .collect())
}

/// One object per row from key/value argument pairs.
///
/// A SQL-null or empty key makes the row null. A trailing key without a
/// value gets `null`.
pub fn json_object(args: &[Arg<Value>], num_rows: usize) -> JsonResult<Column<Value>> {
    check_rows(args, num_rows)?;
    Ok((0..num_rows).map(|row| object_row(args, row)).collect())
}

fn object_row(args: &[Arg<Value>], row: usize) -> Option<Value> {
    let mut entries = Vec::with_capacity(args.len().div_ceil(2));
    for pair in args.chunks(2) {
        let key = key_text(pair[0].get(row)?);
        if key.is_empty() {
            return None;
        }
        let value = pair
            .get(1)
            .and_then(|arg| arg.get(row))
            .cloned()
            .unwrap_or(Value::Null);
        upsert(&mut entries, key, value);
    }
    Some(Value::Object(entries))
}

/// Struct rows become objects keyed by field name; map rows become objects
/// keyed by the text of each map key.
pub fn to_json(column: &CompositeColumn) -> JsonResult<Column<Value>> {
    match column {
        CompositeColumn::Struct { fields, rows } => rows
            .iter()
            .map(|row| {
                let Some(values) = row else {
                    return Ok(None);
                };
                if values.len() != fields.len() {
                    return Err(JsonError::InvalidArgument(format!(
                        "struct row has {} values for {} fields",
                        values.len(),
                        fields.len()
                    )));
                }
                let entries = fields
                    .iter()
                    .zip(values)
                    .map(|(name, datum)| (name.clone(), datum.to_json()))
                    .collect();
                Ok(Some(Value::Object(entries)))
            })
            .collect(),
        CompositeColumn::Map { rows } => Ok(rows
            .iter()
            .map(|row| row.as_deref().map(map_to_json))
            .collect()),
    }
}

fn map_to_json(entries: &[(Datum, Datum)]) -> Value {
    let mut out = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        match key.key_text() {
            Some(key) if !key.is_empty() => upsert(&mut out, key, value.to_json()),
            _ => {}
        }
    }
    Value::Object(out)
}

impl Datum {
    /// Convert to a JSON value, recursing into arrays, structs and maps.
    pub fn to_json(&self) -> Value {
        match self {
            Datum::Null => Value::Null,
            Datum::Bool(b) => Value::Bool(*b),
            Datum::Int(n) => Value::Int(*n),
            Datum::Double(f) => Value::Double(*f),
            Datum::Varchar(s) => Value::String(s.clone()),
            Datum::Json(v) => v.clone(),
            Datum::Array(items) => Value::Array(items.iter().map(Datum::to_json).collect()),
            Datum::Struct(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, datum)| (name.clone(), datum.to_json()))
                    .collect(),
            ),
            Datum::Map(entries) => map_to_json(entries),
        }
    }

    /// Text of this datum used as an object key; `None` for nulls.
    fn key_text(&self) -> Option<String> {
        match self {
            Datum::Null | Datum::Json(Value::Null) => None,
            Datum::Varchar(s) => Some(s.clone()),
            Datum::Int(n) => Some(itoa::Buffer::new().format(*n).to_string()),
            Datum::Json(v) => Some(key_text(v)),
            other => Some(other.to_json().to_canonical()),
        }
    }
}

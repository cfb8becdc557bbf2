//! Flattened JSON columns and their evaluator.
//!
//! A flat column hoists a fixed set of top-level keys into dedicated
//! sub-columns and keeps everything else in a remainder sub-column. Each
//! sub-column is one contiguous flat token buffer plus per-row offsets, so
//! evaluation navigates [`FlatValue`] views and never builds a `Value` tree.
//!
//! Only the first path token is special: it picks the sub-column. The rest
//! of the program runs through the shared [`walk`], which is what keeps flat
//! and native results identical.

use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{JsonError, JsonResult};
use crate::eval::{Extracted, JsonKind, JsonNode, walk};
use crate::flat_value::{self, FlatValue, TAG_OBJECT_END, TAG_OBJECT_START, TAG_STRING};
use crate::path::{PathProgram, PathToken};
use crate::value::Value;

/// Declared type of a hoisted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlatType {
    /// Any JSON value.
    Json,
    /// JSON integers.
    Bigint,
    /// JSON numbers; integers keep their integer encoding.
    Double,
    /// JSON strings.
    Varchar,
    /// JSON booleans.
    Boolean,
}

impl FlatType {
    /// Whether `value` can live in a sub-column of this type.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FlatType::Json => true,
            FlatType::Bigint => matches!(value, Value::Int(_)),
            FlatType::Double => matches!(value, Value::Int(_) | Value::Double(_)),
            FlatType::Varchar => matches!(value, Value::String(_)),
            FlatType::Boolean => matches!(value, Value::Bool(_)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FlatType::Json => "json",
            FlatType::Bigint => "bigint",
            FlatType::Double => "double",
            FlatType::Varchar => "varchar",
            FlatType::Boolean => "boolean",
        }
    }
}

impl FromStr for FlatType {
    type Err = JsonError;

    fn from_str(s: &str) -> JsonResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(FlatType::Json),
            "bigint" | "int" => Ok(FlatType::Bigint),
            "double" => Ok(FlatType::Double),
            "varchar" | "string" => Ok(FlatType::Varchar),
            "boolean" | "bool" => Ok(FlatType::Boolean),
            other => Err(JsonError::InvalidArgument(format!(
                "unknown flat column type {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatField {
    pub name: String,
    pub ty: FlatType,
}

impl FlatField {
    pub fn new(name: impl Into<String>, ty: FlatType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// `name` or `name:type`; the type defaults to `json`.
impl FromStr for FlatField {
    type Err = JsonError;

    fn from_str(s: &str) -> JsonResult<Self> {
        let (name, ty) = match s.rsplit_once(':') {
            Some((name, ty)) => (name, ty.parse()?),
            None => (s, FlatType::Json),
        };
        if name.is_empty() {
            return Err(JsonError::InvalidArgument(format!(
                "empty flat key in {s:?}"
            )));
        }
        Ok(Self::new(name, ty))
    }
}

/// Hoisted keys in declaration order, and whether a remainder exists.
///
/// Immutable once built. A schema without a remainder is not extensible:
/// keys outside it cannot be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatSchema {
    fields: Vec<FlatField>,
    has_remainder: bool,
}

impl FlatSchema {
    pub fn new(fields: Vec<FlatField>, has_remainder: bool) -> JsonResult<Self> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(JsonError::InvalidArgument(format!(
                    "flat key {:?} declared twice",
                    field.name
                )));
            }
        }
        Ok(Self {
            fields,
            has_remainder,
        })
    }

    pub fn fields(&self) -> &[FlatField] {
        &self.fields
    }

    pub fn has_remainder(&self) -> bool {
        self.has_remainder
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// One sub-column: cells encoded back to back in `buf`.
#[derive(Debug, Clone, Default)]
pub struct FlatSubColumn {
    buf: Vec<u8>,
    cells: Vec<Option<usize>>,
}

impl FlatSubColumn {
    fn push(&mut self, value: Option<&Value>) {
        let offset = value.map(|v| {
            let offset = self.buf.len();
            flat_value::encode_value(&mut self.buf, v);
            offset
        });
        self.cells.push(offset);
    }

    fn push_object<'v>(&mut self, entries: impl ExactSizeIterator<Item = (&'v str, &'v Value)>) {
        let offset = self.buf.len();
        flat_value::encode_object(&mut self.buf, entries);
        self.cells.push(Some(offset));
    }

    /// The cell at `row`, `None` when the row has no value here.
    pub fn get(&self, row: usize) -> Option<FlatValue<'_>> {
        let offset = (*self.cells.get(row)?)?;
        Some(FlatValue::new(&self.buf, offset))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Bytes held by the cell buffer.
    pub fn byte_size(&self) -> usize {
        self.buf.len()
    }
}

/// Where one top-level entry of an object row went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntrySlot {
    /// The hoisted sub-column at this schema position.
    Hoisted(usize),
    /// The next entry of the remainder object.
    Remainder,
}

/// A JSON column in flattened form.
#[derive(Debug, Clone)]
pub struct FlatJsonColumn {
    schema: Arc<FlatSchema>,
    columns: Vec<FlatSubColumn>,
    remainder: Option<FlatSubColumn>,
    nulls: Vec<bool>,
    /// Document order of every object row: row `r` owns
    /// `slots[slot_offsets[r]..slot_offsets[r + 1]]`.
    slots: Vec<EntrySlot>,
    slot_offsets: Vec<usize>,
}

impl FlatJsonColumn {
    pub fn schema(&self) -> &FlatSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.nulls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nulls.is_empty()
    }

    /// SQL null row.
    pub fn is_null(&self, row: usize) -> bool {
        self.nulls.get(row).copied().unwrap_or(true)
    }

    pub fn hoisted(&self, field: usize, row: usize) -> Option<FlatValue<'_>> {
        self.columns.get(field)?.get(row)
    }

    pub fn remainder(&self, row: usize) -> Option<FlatValue<'_>> {
        self.remainder.as_ref()?.get(row)
    }

    /// Bytes held by all sub-column buffers, remainder included.
    pub fn byte_size(&self) -> usize {
        self.columns
            .iter()
            .chain(&self.remainder)
            .map(FlatSubColumn::byte_size)
            .sum()
    }

    fn row_slots(&self, row: usize) -> &[EntrySlot] {
        match (self.slot_offsets.get(row), self.slot_offsets.get(row + 1)) {
            (Some(&start), Some(&end)) => self.slots.get(start..end).unwrap_or_default(),
            _ => &[],
        }
    }

    /// Rebuild the row as an owned document, entries in document order.
    pub fn row_value(&self, row: usize) -> Option<Value> {
        let mut scratch = Vec::new();
        self.reconstruct(row, &mut scratch).map(JsonNode::to_value)
    }

    /// Re-encode the row into `scratch` and return a view of it. Rows stored
    /// whole in the remainder (non-object documents) are returned in place.
    ///
    /// Entries are replayed in document order, duplicates included. Without
    /// a remainder only the hoisted entries survive.
    fn reconstruct<'a>(&'a self, row: usize, scratch: &'a mut Vec<u8>) -> Option<FlatValue<'a>> {
        if self.is_null(row) {
            return None;
        }
        let remainder = self.remainder(row);
        if let Some(rest) = remainder.filter(|r| r.kind() != JsonKind::Object) {
            return Some(rest);
        }

        let mut rest = remainder.map(|r| r.object_iter());
        let mut entries: Vec<(&str, FlatValue<'a>)> = Vec::new();
        for slot in self.row_slots(row) {
            let entry = match *slot {
                EntrySlot::Hoisted(i) => self
                    .schema
                    .fields
                    .get(i)
                    .zip(self.hoisted(i, row))
                    .map(|(field, cell)| (field.name.as_str(), cell)),
                EntrySlot::Remainder => rest.as_mut().and_then(Iterator::next),
            };
            entries.extend(entry);
        }

        scratch.clear();
        scratch.push(TAG_OBJECT_START);
        scratch.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for (key, cell) in entries {
            scratch.push(TAG_STRING);
            scratch.extend_from_slice(&(key.len() as u32).to_le_bytes());
            scratch.extend_from_slice(key.as_bytes());
            scratch.extend_from_slice(cell.as_bytes());
        }
        scratch.push(TAG_OBJECT_END);
        Some(FlatValue::new(scratch, 0))
    }
}

/// Splits parsed documents into a [`FlatJsonColumn`].
pub struct JsonFlattener {
    schema: Arc<FlatSchema>,
}

impl JsonFlattener {
    pub fn new(schema: FlatSchema) -> Self {
        Self {
            schema: Arc::new(schema),
        }
    }

    /// Per row and hoisted key, the last occurrence is hoisted when it
    /// conforms to the declared type. Every other entry, including earlier
    /// occurrences of a hoisted key, goes to the remainder in document order.
    /// The order of all entries is recorded so the row can be replayed.
    pub fn flatten<'v>(&self, rows: impl IntoIterator<Item = Option<&'v Value>>) -> FlatJsonColumn {
        let fields = &self.schema.fields;
        let mut columns = vec![FlatSubColumn::default(); fields.len()];
        let mut remainder = self.schema.has_remainder.then(FlatSubColumn::default);
        let mut nulls = Vec::new();
        let mut slots = Vec::new();
        let mut slot_offsets = vec![0];
        // Entry index of the hoisted occurrence, per field.
        let mut hoisted_at: Vec<Option<usize>> = Vec::with_capacity(fields.len());

        for row in rows {
            nulls.push(row.is_none());
            hoisted_at.clear();
            match row {
                Some(Value::Object(entries)) => {
                    hoisted_at.extend(fields.iter().map(|f| {
                        entries
                            .iter()
                            .rposition(|(k, _)| *k == f.name)
                            .filter(|&at| f.ty.accepts(&entries[at].1))
                    }));
                    let mut kept: Vec<(&str, &Value)> = Vec::new();
                    for (at, (key, value)) in entries.iter().enumerate() {
                        match hoisted_at.iter().position(|h| *h == Some(at)) {
                            Some(field) => slots.push(EntrySlot::Hoisted(field)),
                            None => {
                                slots.push(EntrySlot::Remainder);
                                kept.push((key.as_str(), value));
                            }
                        }
                    }
                    if let Some(rest) = remainder.as_mut() {
                        rest.push_object(kept.into_iter());
                    }
                    for (column, at) in columns.iter_mut().zip(&hoisted_at) {
                        column.push(at.map(|at| &entries[at].1));
                    }
                }
                other => {
                    if let Some(rest) = remainder.as_mut() {
                        rest.push(other);
                    }
                    for column in &mut columns {
                        column.push(None);
                    }
                }
            }
            slot_offsets.push(slots.len());
        }

        let column = FlatJsonColumn {
            schema: Arc::clone(&self.schema),
            columns,
            remainder,
            nulls,
            slots,
            slot_offsets,
        };
        debug!(
            rows = column.len(),
            hoisted = fields.len(),
            remainder = self.schema.has_remainder,
            bytes = column.byte_size(),
            "flattened json column"
        );
        column
    }
}

/// Where the first key of a program is answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FirstKey {
    /// `$`: the whole row.
    Root,
    /// A hoisted sub-column, by schema position.
    Hoisted(usize),
    /// Not in the schema; probe the remainder.
    Remainder,
    /// Not in the schema and there is no remainder.
    Missing,
}

/// A program resolved against one flat schema. Built once per call, before
/// any row is touched, so schema errors surface up front.
#[derive(Debug, Clone)]
pub struct FlatPlan<'p> {
    program: &'p PathProgram,
    first: FirstKey,
}

impl<'p> FlatPlan<'p> {
    pub fn new(
        schema: &FlatSchema,
        program: &'p PathProgram,
        config: &EngineConfig,
    ) -> JsonResult<Self> {
        let first = match program.tokens().first() {
            None => FirstKey::Root,
            Some(PathToken::Key(name)) => match schema.position(name) {
                Some(idx) => FirstKey::Hoisted(idx),
                None if schema.has_remainder => FirstKey::Remainder,
                None if config.dynamic_flat_fallback => FirstKey::Missing,
                None => {
                    return Err(JsonError::Schema(format!(
                        "key {name:?} is not flattened and the column has no remainder"
                    )));
                }
            },
            Some(_) => {
                return Err(JsonError::Schema(format!(
                    "path {program} does not start with a key"
                )));
            }
        };
        Ok(Self { program, first })
    }

    pub fn program(&self) -> &PathProgram {
        self.program
    }
}

/// Evaluate `plan` on one row. `scratch` backs the result when the whole
/// row has to be reassembled.
pub fn evaluate_flat<'a>(
    column: &'a FlatJsonColumn,
    plan: &FlatPlan<'_>,
    row: usize,
    scratch: &'a mut Vec<u8>,
) -> Option<Extracted<FlatValue<'a>>> {
    if column.is_null(row) {
        return None;
    }
    let tokens = plan.program.tokens();
    match plan.first {
        FirstKey::Root => column.reconstruct(row, scratch).map(Extracted::Node),
        FirstKey::Hoisted(idx) => match column.hoisted(idx, row) {
            Some(cell) => walk(&tokens[1..], cell),
            None => walk(tokens, column.remainder(row)?),
        },
        FirstKey::Remainder => walk(tokens, column.remainder(row)?),
        FirstKey::Missing => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::evaluate;
    use crate::path::compile;

    fn schema(fields: &[(&str, FlatType)], has_remainder: bool) -> FlatSchema {
        FlatSchema::new(
            fields.iter().map(|(n, t)| FlatField::new(*n, *t)).collect(),
            has_remainder,
        )
        .unwrap()
    }

    fn flatten(schema: FlatSchema, docs: &[&str]) -> FlatJsonColumn {
        let values: Vec<Value> = docs.iter().map(|d| Value::parse(d).unwrap()).collect();
        JsonFlattener::new(schema).flatten(values.iter().map(Some))
    }

    fn query(column: &FlatJsonColumn, path: &str, row: usize) -> Option<Value> {
        let program = compile(path).unwrap();
        let plan = FlatPlan::new(column.schema(), &program, &EngineConfig::default()).unwrap();
        let mut scratch = Vec::new();
        evaluate_flat(column, &plan, row, &mut scratch).map(|e| e.to_value())
    }

    fn native(doc: &str, path: &str) -> Option<Value> {
        let doc = Value::parse(doc).unwrap();
        evaluate(&compile(path).unwrap(), &doc).map(|e| e.to_value())
    }

    #[test]
    fn field_declarations() {
        assert_eq!("k1".parse::<FlatField>().unwrap(), FlatField::new("k1", FlatType::Json));
        assert_eq!(
            "k2:BIGINT".parse::<FlatField>().unwrap(),
            FlatField::new("k2", FlatType::Bigint)
        );
        assert_eq!(
            "a:b:varchar".parse::<FlatField>().unwrap(),
            FlatField::new("a:b", FlatType::Varchar)
        );
        assert!("k1:decimal".parse::<FlatField>().is_err());
        assert!(":int".parse::<FlatField>().is_err());
    }

    #[test]
    fn hoists_declared_keys() {
        let col = flatten(
            schema(&[("k1", FlatType::Bigint), ("k2", FlatType::Json)], true),
            &[r#"{"k1": 1, "k2": {"a": [1, 2]}, "k3": "x"}"#],
        );
        assert_eq!(col.hoisted(0, 0).unwrap().as_int(), Some(1));
        assert_eq!(
            col.hoisted(1, 0).unwrap().to_value().to_string(),
            r#"{"a": [1, 2]}"#
        );
        assert_eq!(col.remainder(0).unwrap().to_value().to_string(), r#"{"k3": "x"}"#);
    }

    #[test]
    fn non_conforming_values_stay_in_remainder() {
        let col = flatten(
            schema(&[("k1", FlatType::Bigint)], true),
            &[r#"{"k1": "one", "k2": 2}"#, r#"{"k1": 1.5}"#, r#"{"k1": 7}"#],
        );
        assert!(col.hoisted(0, 0).is_none());
        assert!(col.hoisted(0, 1).is_none());
        assert_eq!(col.hoisted(0, 2).unwrap().as_int(), Some(7));
        assert_eq!(query(&col, "$.k1", 0), Some(Value::from("one")));
        assert_eq!(query(&col, "$.k1", 1), Some(Value::Double(1.5)));
        assert_eq!(query(&col, "$.k1", 2), Some(Value::Int(7)));
    }

    #[test]
    fn double_type_accepts_ints_unchanged() {
        let col = flatten(schema(&[("n", FlatType::Double)], true), &[r#"{"n": 3}"#]);
        assert_eq!(query(&col, "$.n", 0), Some(Value::Int(3)));
    }

    #[test]
    fn duplicates_hoist_last_occurrence() {
        let doc = r#"{"a": 1, "b": 2, "a": 3}"#;
        let col = flatten(schema(&[("a", FlatType::Bigint)], true), &[doc]);
        assert_eq!(query(&col, "$.a", 0), native(doc, "$.a"));
        assert_eq!(col.hoisted(0, 0).unwrap().as_int(), Some(3));
        assert_eq!(col.remainder(0).unwrap().to_value().to_string(), r#"{"a": 1, "b": 2}"#);
    }

    #[test]
    fn duplicates_rejected_by_type_stay_together() {
        let doc = r#"{"a": 1, "a": "x"}"#;
        let col = flatten(schema(&[("a", FlatType::Bigint)], true), &[doc]);
        assert!(col.hoisted(0, 0).is_none());
        assert_eq!(query(&col, "$.a", 0), Some(Value::from("x")));
    }

    #[test]
    fn nested_paths_run_on_sub_columns() {
        let doc = r#"{"k1": {"k2": [10, 20, {"k3": true}]}, "other": [1, 2, 3]}"#;
        let col = flatten(schema(&[("k1", FlatType::Json)], true), &[doc]);
        for path in ["$.k1.k2[1]", "$.k1.k2[2].k3", "$.k1.k2[*]", "$.other[0:2]", "$.other[5]", "$.nope.x"] {
            assert_eq!(query(&col, path, 0), native(doc, path), "{path}");
        }
    }

    #[test]
    fn root_reconstructs_row() {
        let col = flatten(
            schema(&[("b", FlatType::Json)], true),
            &[r#"{"a": 1, "b": [true], "c": null}"#, "[1, 2]", r#""text""#],
        );
        assert_eq!(
            query(&col, "$", 0).unwrap().to_string(),
            r#"{"a": 1, "b": [true], "c": null}"#
        );
        assert_eq!(col.row_value(1).unwrap().to_string(), "[1, 2]");
        assert_eq!(query(&col, "$", 2), Some(Value::from("text")));
        assert_eq!(query(&col, "$.a", 1), None);
    }

    #[test]
    fn root_keeps_document_order_and_duplicates() {
        let docs = [
            r#"{"a": 1, "b": 2, "a": 3}"#,
            r#"{"c": 1, "a": "x", "b": true, "a": 4}"#,
            r#"{"a": "no", "a": "int"}"#,
            "{}",
        ];
        let col = flatten(
            schema(&[("b", FlatType::Json), ("a", FlatType::Bigint)], true),
            &docs,
        );
        for (row, doc) in docs.iter().enumerate() {
            assert_eq!(query(&col, "$", row), native(doc, "$"), "{doc}");
        }
    }

    #[test]
    fn byte_size_covers_every_sub_column() {
        let col = flatten(
            schema(&[("a", FlatType::Bigint)], true),
            &[r#"{"a": 1, "b": "x"}"#],
        );
        // Int cell, then the remainder: header, key "b", string "x", end tag.
        assert_eq!(col.byte_size(), 9 + (1 + 4) + (1 + 4 + 1) + (1 + 4 + 1) + 1);
    }

    #[test]
    fn sql_null_rows() {
        let v = Value::parse(r#"{"a": 1}"#).unwrap();
        let col = JsonFlattener::new(schema(&[("a", FlatType::Json)], true))
            .flatten([Some(&v), None]);
        assert_eq!(col.len(), 2);
        assert!(col.is_null(1));
        assert_eq!(query(&col, "$.a", 1), None);
        assert_eq!(col.row_value(1), None);
        assert!(col.is_null(99));
    }

    #[test]
    fn without_remainder_unknown_keys_are_dropped() {
        let col = flatten(
            schema(&[("k1", FlatType::Json)], false),
            &[r#"{"k1": 1, "k2": 2}"#],
        );
        assert!(col.remainder(0).is_none());
        assert_eq!(query(&col, "$.k2", 0), None);
        assert_eq!(col.row_value(0).unwrap().to_string(), r#"{"k1": 1}"#);
    }

    #[test]
    fn unknown_key_without_fallback_is_schema_error() {
        let s = schema(&[("k1", FlatType::Json)], false);
        let program = compile("$.k3").unwrap();
        let strict = EngineConfig {
            dynamic_flat_fallback: false,
            ..EngineConfig::default()
        };
        assert!(matches!(
            FlatPlan::new(&s, &program, &strict),
            Err(JsonError::Schema(_))
        ));
        assert!(FlatPlan::new(&s, &program, &EngineConfig::default()).is_ok());
        // A remainder makes every key answerable.
        let open = schema(&[("k1", FlatType::Json)], true);
        assert!(FlatPlan::new(&open, &program, &strict).is_ok());
    }

    #[test]
    fn leading_index_is_schema_error() {
        let s = schema(&[("k1", FlatType::Json)], true);
        for path in ["$[0]", "$[*].k1", "$[0:1]"] {
            let program = compile(path).unwrap();
            assert!(
                matches!(
                    FlatPlan::new(&s, &program, &EngineConfig::default()),
                    Err(JsonError::Schema(_))
                ),
                "{path}"
            );
        }
    }

    #[test]
    fn hoisted_key_missing_in_row_probes_remainder() {
        let col = flatten(
            schema(&[("k1", FlatType::Bigint)], true),
            &[r#"{"k2": 1}"#, r#"{"k1": 5}"#],
        );
        assert_eq!(query(&col, "$.k1", 0), None);
        assert_eq!(query(&col, "$.k1", 1), Some(Value::Int(5)));
    }

    #[test]
    fn schema_rejects_duplicate_fields() {
        let fields = vec![FlatField::new("a", FlatType::Json), FlatField::new("a", FlatType::Bigint)];
        assert!(matches!(
            FlatSchema::new(fields, true),
            Err(JsonError::InvalidArgument(_))
        ));
    }

    #[test]
    fn flat_type_names() {
        assert_eq!("BIGINT".parse::<FlatType>().unwrap(), FlatType::Bigint);
        assert_eq!("bool".parse::<FlatType>().unwrap(), FlatType::Boolean);
        assert!("decimal".parse::<FlatType>().is_err());
        assert_eq!(FlatType::Varchar.name(), "varchar");
    }
}

//! Column model exchanged with the host pipeline.
//!
//! Every input and output column is row-aligned and nullable. `None` is a
//! SQL null, which is distinct from a JSON `null` value.

use crate::flat_eval::FlatJsonColumn;
use crate::value::Value;

/// A nullable output column.
pub type Column<T> = Vec<Option<T>>;

/// A JSON-typed input column in one of its physical encodings.
#[derive(Debug, Clone)]
pub enum JsonColumn {
    /// Uninterpreted JSON text, parsed on demand.
    Text(Column<String>),
    /// Already parsed documents.
    Native(Column<Value>),
    /// Hoisted sub-columns plus remainder.
    Flat(FlatJsonColumn),
    /// A single row standing for `len` identical rows.
    Const { value: Box<JsonColumn>, len: usize },
}

impl JsonColumn {
    pub fn text<S: Into<String>>(rows: impl IntoIterator<Item = Option<S>>) -> Self {
        JsonColumn::Text(rows.into_iter().map(|r| r.map(Into::into)).collect())
    }

    pub fn constant(value: JsonColumn, len: usize) -> Self {
        JsonColumn::Const {
            value: Box::new(value),
            len,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            JsonColumn::Text(rows) => rows.len(),
            JsonColumn::Native(rows) => rows.len(),
            JsonColumn::Flat(column) => column.len(),
            JsonColumn::Const { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An argument that is either one constant for every row or a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg<T> {
    Const(Option<T>),
    Column(Column<T>),
}

/// Path argument of the extraction functions.
pub type PathArg = Arg<String>;

impl<T> Arg<T> {
    pub fn is_const(&self) -> bool {
        matches!(self, Arg::Const(_))
    }

    /// Value for `row`. Constants answer every row.
    pub fn get(&self, row: usize) -> Option<&T> {
        match self {
            Arg::Const(value) => value.as_ref(),
            Arg::Column(rows) => rows.get(row)?.as_ref(),
        }
    }

    /// Row count for columns, `None` for constants.
    pub fn rows(&self) -> Option<usize> {
        match self {
            Arg::Const(_) => None,
            Arg::Column(rows) => Some(rows.len()),
        }
    }
}

impl PathArg {
    pub fn path(path: &str) -> Self {
        Arg::Const(Some(path.to_string()))
    }
}

/// A typed SQL value, as found in struct and map columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Varchar(String),
    Json(Value),
    Array(Vec<Datum>),
    Struct(Vec<(String, Datum)>),
    Map(Vec<(Datum, Datum)>),
}

/// Input of `to_json`.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeColumn {
    /// Rows of field values, positionally matching `fields`.
    Struct {
        fields: Vec<String>,
        rows: Column<Vec<Datum>>,
    },
    /// Rows of key/value entries.
    Map { rows: Column<Vec<(Datum, Datum)>> },
}

impl CompositeColumn {
    pub fn len(&self) -> usize {
        match self {
            CompositeColumn::Struct { rows, .. } => rows.len(),
            CompositeColumn::Map { rows } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

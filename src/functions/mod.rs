//! SQL-facing JSON functions.
//!
//! Every extraction function is the same loop: resolve the path, evaluate it
//! per row with the evaluator matching the column encoding, and hand the
//! outcome to a [`Terminal`]. Errors abort the whole call; everything that
//! goes wrong for a single row becomes a null for that row.

pub mod builders;

use std::sync::Arc;

use tracing::{trace, warn};

use crate::column::{Column, JsonColumn, PathArg};
use crate::error::{JsonError, JsonResult};
use crate::eval::terminal::{
    Exists, GetBool, GetDouble, GetInt, GetString, Keys, Length, Query, Terminal,
};
use crate::eval::{JsonKind, evaluate};
use crate::flat_eval::{FlatJsonColumn, FlatPlan, evaluate_flat};
use crate::fragment::{FragmentContext, ResolvedPath};
use crate::parse_cache::{ParseReuseCache, ParseStats};
use crate::path::{self, PathProgram};
use crate::value::Value;

pub use builders::{json_array, json_object, to_json};

/// `json_query(json, path)`: the value at `path`.
pub fn json_query(
    ctx: &mut FragmentContext,
    json: &JsonColumn,
    path: &PathArg,
) -> JsonResult<Column<Value>> {
    extract(ctx, json, path, Query)
}

pub fn get_json_int(
    ctx: &mut FragmentContext,
    json: &JsonColumn,
    path: &PathArg,
) -> JsonResult<Column<i64>> {
    extract(ctx, json, path, GetInt)
}

pub fn get_json_double(
    ctx: &mut FragmentContext,
    json: &JsonColumn,
    path: &PathArg,
) -> JsonResult<Column<f64>> {
    extract(ctx, json, path, GetDouble)
}

pub fn get_json_string(
    ctx: &mut FragmentContext,
    json: &JsonColumn,
    path: &PathArg,
) -> JsonResult<Column<String>> {
    extract(ctx, json, path, GetString)
}

pub fn get_json_bool(
    ctx: &mut FragmentContext,
    json: &JsonColumn,
    path: &PathArg,
) -> JsonResult<Column<bool>> {
    extract(ctx, json, path, GetBool)
}

/// `json_exists(json, path)`. An empty path is never found.
pub fn json_exists(
    ctx: &mut FragmentContext,
    json: &JsonColumn,
    path: &PathArg,
) -> JsonResult<Column<bool>> {
    extract(ctx, json, path, Exists)
}

/// `json_length(json [, path])`: whole document without a path.
pub fn json_length(
    ctx: &mut FragmentContext,
    json: &JsonColumn,
    path: Option<&PathArg>,
) -> JsonResult<Column<i64>> {
    match path {
        Some(path) => extract(ctx, json, path, Length),
        None => extract(ctx, json, &PathArg::path("$"), Length),
    }
}

/// `json_keys(json [, path])`.
pub fn json_keys(
    ctx: &mut FragmentContext,
    json: &JsonColumn,
    path: Option<&PathArg>,
) -> JsonResult<Column<Value>> {
    match path {
        Some(path) => extract(ctx, json, path, Keys),
        None => extract(ctx, json, &PathArg::path("$"), Keys),
    }
}

/// `parse_json(text)`: lenient per-row parse, null where the text cannot be
/// accepted.
pub fn parse_json(ctx: &mut FragmentContext, text: &Column<String>) -> Column<Value> {
    let mut stats = ParseStats::default();
    let out = text
        .iter()
        .map(|row| {
            let row = row.as_deref()?;
            stats.documents_parsed += 1;
            let parsed = Value::parse_lenient(row);
            if parsed.is_none() {
                stats.malformed_documents += 1;
                trace!("parse_json rejected row");
            }
            parsed
        })
        .collect();
    ctx.record(stats);
    out
}

/// Extract `program` from `text`, whose root must be an object. `Ok(None)`
/// means the target is missing or JSON null.
pub fn extract_from_object(text: &str, program: &PathProgram) -> JsonResult<Option<Value>> {
    let doc = Value::parse(text)?;
    if !matches!(doc, Value::Object(_)) {
        return Err(JsonError::DataQuality(format!(
            "expected a json object, got {}",
            doc.type_name()
        )));
    }
    Ok(evaluate(program, &doc)
        .filter(|found| found.kind() != JsonKind::Null)
        .map(|found| found.to_value()))
}

/// Run `terminal` on every row.
pub fn extract<T: Terminal>(
    ctx: &mut FragmentContext,
    json: &JsonColumn,
    path: &PathArg,
    terminal: T,
) -> JsonResult<Column<T::Output>> {
    let rows = json.len();
    if let Some(path_rows) = path.rows().filter(|n| *n != rows) {
        return Err(JsonError::InvalidArgument(format!(
            "path column has {path_rows} rows, json column has {rows}"
        )));
    }
    let resolved = ctx.resolve(path)?;
    match json {
        JsonColumn::Flat(column) => extract_flat(ctx, column, resolved, &terminal),
        _ => {
            let docs = Docs::of(json)?;
            extract_native(ctx, &docs, rows, resolved, &terminal)
        }
    }
}

/// Row source for the native evaluator.
enum Docs<'c> {
    Text(&'c [Option<String>]),
    Tree(&'c [Option<Value>]),
    /// Row 0 of the inner source answers every row.
    Const(Box<Docs<'c>>),
}

impl<'c> Docs<'c> {
    fn of(json: &'c JsonColumn) -> JsonResult<Self> {
        match json {
            JsonColumn::Text(rows) => Ok(Docs::Text(rows)),
            JsonColumn::Native(rows) => Ok(Docs::Tree(rows)),
            JsonColumn::Const { value, .. } => match value.as_ref() {
                JsonColumn::Flat(_) => Err(JsonError::Schema(
                    "constant flat json columns are not supported".to_string(),
                )),
                inner => Ok(Docs::Const(Box::new(Docs::of(inner)?))),
            },
            JsonColumn::Flat(_) => Err(JsonError::Schema(
                "flat json column given to the native evaluator".to_string(),
            )),
        }
    }

    fn is_null(&self, row: usize) -> bool {
        match self {
            Docs::Text(rows) => rows.get(row).is_none_or(Option::is_none),
            Docs::Tree(rows) => rows.get(row).is_none_or(Option::is_none),
            Docs::Const(inner) => inner.is_null(0),
        }
    }

    /// Parsed document at `row`, `None` for SQL null or malformed text.
    fn doc<'s>(&'s self, row: usize, cache: &'s mut ParseReuseCache<'c>) -> Option<&'s Value> {
        match self {
            Docs::Text(rows) => cache.parse(rows.get(row)?.as_deref()?),
            Docs::Tree(rows) => rows.get(row)?.as_ref(),
            Docs::Const(inner) => inner.doc(0, cache),
        }
    }
}

/// Compiles per-row paths, reusing the program while consecutive rows carry
/// the same text.
#[derive(Default)]
struct RowPaths {
    last: Option<(String, Option<Arc<PathProgram>>)>,
}

impl RowPaths {
    fn compile(&mut self, text: &str) -> Option<Arc<PathProgram>> {
        if let Some((last, program)) = &self.last {
            if last == text {
                return program.clone();
            }
        }
        let program = match path::compile(text) {
            Ok(program) => Some(Arc::new(program)),
            Err(e) => {
                trace!(error = %e, "row path rejected, result is null");
                None
            }
        };
        self.last = Some((text.to_string(), program.clone()));
        program
    }
}

fn extract_native<T: Terminal>(
    ctx: &mut FragmentContext,
    docs: &Docs<'_>,
    rows: usize,
    resolved: ResolvedPath<'_>,
    terminal: &T,
) -> JsonResult<Column<T::Output>> {
    let mut cache = ParseReuseCache::new(ctx.config().reuse_parse);
    let mut row_paths = RowPaths::default();
    let mut out = Vec::with_capacity(rows);

    for row in 0..rows {
        if docs.is_null(row) {
            out.push(None);
            continue;
        }
        let program = match &resolved {
            ResolvedPath::Null => None,
            ResolvedPath::NotFound => {
                out.push(terminal.not_found());
                continue;
            }
            ResolvedPath::Program(program) => Some(Arc::clone(program)),
            ResolvedPath::PerRow(paths) => match paths.get(row).and_then(|p| p.as_deref()) {
                None => None,
                Some("") => {
                    out.push(terminal.not_found());
                    continue;
                }
                Some(text) => row_paths.compile(text),
            },
        };
        let result = program.and_then(|program| {
            let doc = docs.doc(row, &mut cache)?;
            terminal.finish(evaluate(&program, doc).as_ref())
        });
        out.push(result);
    }

    ctx.record(cache.stats());
    Ok(out)
}

fn extract_flat<T: Terminal>(
    ctx: &mut FragmentContext,
    column: &FlatJsonColumn,
    resolved: ResolvedPath<'_>,
    terminal: &T,
) -> JsonResult<Column<T::Output>> {
    let rows = column.len();
    let program = match resolved {
        ResolvedPath::Null => return Ok((0..rows).map(|_| None).collect()),
        ResolvedPath::NotFound => {
            return Ok((0..rows)
                .map(|row| {
                    if column.is_null(row) {
                        None
                    } else {
                        terminal.not_found()
                    }
                })
                .collect());
        }
        ResolvedPath::Program(program) => program,
        ResolvedPath::PerRow(paths) => match uniform_path(paths)? {
            None => return Ok(Vec::new()),
            Some("") => return extract_flat(ctx, column, ResolvedPath::NotFound, terminal),
            Some(text) => match path::compile(text) {
                Ok(program) => Arc::new(program),
                Err(e) => {
                    // Same outcome as a rejected row path on native input.
                    trace!(error = %e, "row path rejected, results are null");
                    return Ok((0..rows).map(|_| None).collect());
                }
            },
        },
    };

    let plan = FlatPlan::new(column.schema(), &program, ctx.config()).inspect_err(|e| {
        warn!(error = %e, path = %program, "flat json call aborted");
    })?;
    let mut scratch = Vec::new();
    Ok((0..rows)
        .map(|row| {
            if column.is_null(row) {
                return None;
            }
            terminal.finish(evaluate_flat(column, &plan, row, &mut scratch).as_ref())
        })
        .collect())
}

/// A variable path column over a flat column must hold one path.
fn uniform_path(paths: &[Option<String>]) -> JsonResult<Option<&str>> {
    let mut first: Option<&str> = None;
    for path in paths {
        let Some(path) = path.as_deref() else {
            return Err(JsonError::Schema(
                "null path in a variable path column over flat json".to_string(),
            ));
        };
        match first {
            None => first = Some(path),
            Some(seen) if seen == path => {}
            Some(seen) => {
                return Err(JsonError::Schema(format!(
                    "variable paths over flat json must be identical, got {seen:?} and {path:?}"
                )));
            }
        }
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::flat_eval::{FlatField, FlatSchema, FlatType, JsonFlattener};
    use crate::fragment::FunctionStateScope;

    fn text(rows: &[&str]) -> JsonColumn {
        JsonColumn::text(rows.iter().map(|r| Some(*r)))
    }

    fn flat(rows: &[&str], fields: &[&str], has_remainder: bool) -> JsonColumn {
        let schema = FlatSchema::new(
            fields.iter().map(|n| FlatField::new(*n, FlatType::Json)).collect(),
            has_remainder,
        )
        .unwrap();
        let values: Vec<Value> = rows.iter().map(|r| Value::parse(r).unwrap()).collect();
        JsonColumn::Flat(JsonFlattener::new(schema).flatten(values.iter().map(Some)))
    }

    fn strings(col: Column<Value>) -> Vec<Option<String>> {
        col.into_iter().map(|v| v.map(|v| v.to_string())).collect()
    }

    #[test]
    fn query_rows() {
        let mut ctx = FragmentContext::default();
        let json = text(&[r#"{"k1": [1, 2]}"#, r#"{"k2": 1}"#, "[1,"]);
        let out = json_query(&mut ctx, &json, &PathArg::path("$.k1")).unwrap();
        assert_eq!(strings(out), vec![Some("[1, 2]".into()), None, None]);
        assert_eq!(ctx.stats().documents_parsed, 3);
        assert_eq!(ctx.stats().malformed_documents, 1);
    }

    #[test]
    fn sql_null_doc_is_null_for_every_terminal() {
        let mut ctx = FragmentContext::default();
        let json = JsonColumn::text([None::<&str>]);
        let path = PathArg::path("$.a");
        assert_eq!(json_exists(&mut ctx, &json, &path).unwrap(), vec![None]);
        assert_eq!(json_length(&mut ctx, &json, Some(&path)).unwrap(), vec![None]);
        assert_eq!(json_exists(&mut ctx, &json, &PathArg::path("")).unwrap(), vec![None]);
    }

    #[test]
    fn null_and_empty_paths() {
        let mut ctx = FragmentContext::default();
        let json = text(&[r#"{"a": 1}"#]);
        assert_eq!(json_exists(&mut ctx, &json, &PathArg::Const(None)).unwrap(), vec![None]);
        assert_eq!(json_exists(&mut ctx, &json, &PathArg::path("")).unwrap(), vec![Some(false)]);
        assert_eq!(json_exists(&mut ctx, &json, &PathArg::path("$")).unwrap(), vec![Some(true)]);
        assert_eq!(json_length(&mut ctx, &json, Some(&PathArg::path(""))).unwrap(), vec![Some(0)]);
    }

    #[test]
    fn variable_paths_compile_per_row() {
        let mut ctx = FragmentContext::default();
        let json = text(&[r#"{"a": 1, "b": 2}"#, r#"{"a": 1, "b": 2}"#, r#"{"a": 1}"#, r#"{"a": 1}"#]);
        let paths = PathArg::Column(vec![
            Some("$.a".into()),
            Some("$.b".into()),
            Some("$.a[".into()),
            None,
        ]);
        ctx.prepare(FunctionStateScope::FragmentLocal, &paths).unwrap();
        let out = get_json_int(&mut ctx, &json, &paths).unwrap();
        assert_eq!(out, vec![Some(1), Some(2), None, None]);
    }

    #[test]
    fn path_column_length_mismatch() {
        let mut ctx = FragmentContext::default();
        let err = json_query(&mut ctx, &text(&["{}"]), &PathArg::Column(vec![])).unwrap_err();
        assert!(matches!(err, JsonError::InvalidArgument(_)));
    }

    #[test]
    fn reuse_parse_toggle() {
        let json = JsonColumn::constant(text(&[r#"{"a": 1, "b": 2, "c": 3, "d": 4, "e": 5}"#]), 5);
        let paths = PathArg::Column(["$.a", "$.b", "$.c", "$.d", "$.e"].map(|p| Some(p.to_string())).to_vec());

        let mut ctx = FragmentContext::default();
        let out = get_json_int(&mut ctx, &json, &paths).unwrap();
        assert_eq!(out, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
        assert_eq!(ctx.stats().documents_parsed, 1);

        let mut ctx = FragmentContext::new(EngineConfig {
            reuse_parse: false,
            ..EngineConfig::default()
        });
        let out = get_json_int(&mut ctx, &json, &paths).unwrap();
        assert_eq!(out, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
        assert_eq!(ctx.stats().documents_parsed, 5);
    }

    #[test]
    fn native_tree_column() {
        let mut ctx = FragmentContext::default();
        let json = JsonColumn::Native(vec![Some(Value::parse(r#"{"k": "v"}"#).unwrap()), None]);
        let out = get_json_string(&mut ctx, &json, &PathArg::path("k")).unwrap();
        assert_eq!(out, vec![Some("v".to_string()), None]);
        assert_eq!(ctx.stats().documents_parsed, 0);
    }

    #[test]
    fn flat_column_matches_text() {
        let docs = [r#"{"k1": {"a": 1}, "k2": [1, 2], "k3": "x"}"#, r#"{"k3": null}"#];
        for path in ["$.k1.a", "$.k2[1]", "$.k3", "$.k4", "$", "$.k2[*]"] {
            let mut ctx = FragmentContext::default();
            let native = json_query(&mut ctx, &text(&docs), &PathArg::path(path)).unwrap();
            let flat = json_query(&mut ctx, &flat(&docs, &["k1", "k2"], true), &PathArg::path(path)).unwrap();
            assert_eq!(flat, native, "{path}");
        }
        let mut ctx = FragmentContext::default();
        let flat = flat(&docs, &["k3", "k1"], true);
        let native = text(&docs);
        assert_eq!(
            json_keys(&mut ctx, &flat, None).unwrap(),
            json_keys(&mut ctx, &native, None).unwrap()
        );
        assert_eq!(
            json_length(&mut ctx, &flat, None).unwrap(),
            json_length(&mut ctx, &native, None).unwrap()
        );
    }

    #[test]
    fn flat_unknown_key_without_remainder() {
        let json = flat(&[r#"{"k1": 1, "k2": 2}"#], &["k1"], false);
        let mut ctx = FragmentContext::default();
        assert_eq!(json_query(&mut ctx, &json, &PathArg::path("$.k2")).unwrap(), vec![None]);

        let mut ctx = FragmentContext::new(EngineConfig {
            dynamic_flat_fallback: false,
            ..EngineConfig::default()
        });
        let err = json_query(&mut ctx, &json, &PathArg::path("$.k2")).unwrap_err();
        assert!(matches!(err, JsonError::Schema(_)));
    }

    #[test]
    fn flat_rejects_constant_column_and_leading_index() {
        let mut ctx = FragmentContext::default();
        let json = JsonColumn::constant(flat(&[r#"{"k1": 1}"#], &["k1"], true), 3);
        assert!(matches!(
            json_query(&mut ctx, &json, &PathArg::path("$.k1")),
            Err(JsonError::Schema(_))
        ));
        let json = flat(&[r#"{"k1": 1}"#], &["k1"], true);
        assert!(matches!(
            json_query(&mut ctx, &json, &PathArg::path("$[0]")),
            Err(JsonError::Schema(_))
        ));
    }

    #[test]
    fn flat_variable_paths() {
        let json = flat(&[r#"{"k1": 1}"#, r#"{"k1": 2}"#], &["k1"], true);
        let mut ctx = FragmentContext::default();

        let same = PathArg::Column(vec![Some("$.k1".into()), Some("$.k1".into())]);
        assert_eq!(get_json_int(&mut ctx, &json, &same).unwrap(), vec![Some(1), Some(2)]);

        let different = PathArg::Column(vec![Some("$.k1".into()), Some("$.k2".into())]);
        assert!(matches!(get_json_int(&mut ctx, &json, &different), Err(JsonError::Schema(_))));

        let nulls = PathArg::Column(vec![None, None]);
        assert!(matches!(get_json_int(&mut ctx, &json, &nulls), Err(JsonError::Schema(_))));
    }

    #[test]
    fn rejected_row_path_is_null_for_flat_and_native() {
        let docs = [r#"{"k1": 1}"#, r#"{"k1": 2}"#];
        let bad = PathArg::Column(vec![Some("$.k1[".into()), Some("$.k1[".into())]);
        let mut ctx = FragmentContext::default();
        let flat = get_json_int(&mut ctx, &flat(&docs, &["k1"], true), &bad).unwrap();
        let native = get_json_int(&mut ctx, &text(&docs), &bad).unwrap();
        assert_eq!(flat, vec![None, None]);
        assert_eq!(flat, native);
    }

    #[test]
    fn parse_json_rows() {
        let mut ctx = FragmentContext::default();
        let rows: Column<String> = [Some("1e5"), Some(" {\"a\": 1} "), Some("[1,"), None, Some("  ")]
            .into_iter()
            .map(|r| r.map(str::to_string))
            .collect();
        let out = strings(parse_json(&mut ctx, &rows));
        assert_eq!(
            out,
            vec![Some(r#""1e5""#.into()), Some(r#"{"a": 1}"#.into()), None, None, None]
        );
        assert_eq!(ctx.stats().malformed_documents, 2);
    }

    #[test]
    fn extract_from_object_outcomes() {
        let program = path::compile("$.data").unwrap();
        assert_eq!(
            extract_from_object(r#"{"data": [1]}"#, &program).unwrap(),
            Some(Value::parse("[1]").unwrap())
        );
        assert_eq!(extract_from_object(r#"{"data": null}"#, &program).unwrap(), None);
        assert_eq!(extract_from_object(r#"{"other": 1}"#, &program).unwrap(), None);
        assert!(matches!(
            extract_from_object(r#"{"data": "#, &program),
            Err(JsonError::DataQuality(_))
        ));
        assert!(matches!(
            extract_from_object("[1]", &program),
            Err(JsonError::DataQuality(_))
        ));
    }
}

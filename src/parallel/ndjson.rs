//! Parallel NDJSON (newline-delimited JSON) processing.
//!
//! Every non-blank line is one text row. Rows are grouped into batches of
//! `Job::batch_rows`, batches run in parallel via rayon, and output is
//! concatenated in input order: one line per row, `NULL` for SQL null.
use std::io::{self, Read, Write};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use memchr::memchr_iter;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::column::{Column, JsonColumn, PathArg};
use crate::config::EngineConfig;
use crate::error::JsonError;
use crate::flat_eval::{FlatSchema, JsonFlattener};
use crate::fragment::{FragmentContext, FunctionStateScope};
use crate::functions;
use crate::output;
use crate::value::Value;

pub const DEFAULT_BATCH_ROWS: usize = 4096;

/// The function applied to every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonFunction {
    Query,
    GetInt,
    GetDouble,
    GetString,
    GetBool,
    Exists,
    Length,
    Keys,
    Parse,
}

impl JsonFunction {
    pub const ALL: [JsonFunction; 9] = [
        JsonFunction::Query,
        JsonFunction::GetInt,
        JsonFunction::GetDouble,
        JsonFunction::GetString,
        JsonFunction::GetBool,
        JsonFunction::Exists,
        JsonFunction::Length,
        JsonFunction::Keys,
        JsonFunction::Parse,
    ];

    /// Command-line name.
    pub fn name(self) -> &'static str {
        match self {
            JsonFunction::Query => "query",
            JsonFunction::GetInt => "get-int",
            JsonFunction::GetDouble => "get-double",
            JsonFunction::GetString => "get-string",
            JsonFunction::GetBool => "get-bool",
            JsonFunction::Exists => "exists",
            JsonFunction::Length => "length",
            JsonFunction::Keys => "keys",
            JsonFunction::Parse => "parse",
        }
    }

    /// SQL name.
    pub fn sql_name(self) -> &'static str {
        match self {
            JsonFunction::Query => "json_query",
            JsonFunction::GetInt => "get_json_int",
            JsonFunction::GetDouble => "get_json_double",
            JsonFunction::GetString => "get_json_string",
            JsonFunction::GetBool => "get_json_bool",
            JsonFunction::Exists => "json_exists",
            JsonFunction::Length => "json_length",
            JsonFunction::Keys => "json_keys",
            JsonFunction::Parse => "parse_json",
        }
    }
}

impl FromStr for JsonFunction {
    type Err = JsonError;

    fn from_str(s: &str) -> Result<Self, JsonError> {
        JsonFunction::ALL
            .into_iter()
            .find(|f| f.name() == s || f.sql_name() == s)
            .ok_or_else(|| JsonError::InvalidArgument(format!("unknown json function {s:?}")))
    }
}

/// What to run over every row. Shared read-only by all batches.
#[derive(Debug, Clone)]
pub struct Job {
    pub function: JsonFunction,
    /// Path argument; `None` addresses the whole document.
    pub path: Option<String>,
    /// Evaluate through a flat column built with this schema.
    pub flatten: Option<FlatSchema>,
    pub config: EngineConfig,
    pub batch_rows: usize,
}

impl Job {
    pub fn new(function: JsonFunction) -> Self {
        Self {
            function,
            path: None,
            flatten: None,
            config: EngineConfig::default(),
            batch_rows: DEFAULT_BATCH_ROWS,
        }
    }
}

/// Process an NDJSON buffer, returning `(output_bytes, rows)`.
pub fn process_ndjson(data: &[u8], job: &Job) -> Result<(Vec<u8>, usize)> {
    let lines = split_lines(data);
    let out = process_lines(&lines, job, 0)?;
    Ok((out, lines.len()))
}

/// Minimum window size (32 MiB).
const MIN_WINDOW_SIZE: usize = 32 * 1024 * 1024;

/// Maximum window size (256 MiB). Caps output memory per window.
const MAX_WINDOW_SIZE: usize = 256 * 1024 * 1024;

/// 32 MiB of input per core, clamped to 32–256 MiB.
/// Override with `JSONPATH_WINDOW_SIZE` (in megabytes).
fn window_size() -> usize {
    if let Some(val) = std::env::var_os("JSONPATH_WINDOW_SIZE")
        && let Some(mb) = val.to_str().and_then(|s| s.parse::<usize>().ok())
        && mb > 0
    {
        return mb * 1024 * 1024;
    }
    let num_threads = rayon::current_num_threads();
    (num_threads * 32 * 1024 * 1024).clamp(MIN_WINDOW_SIZE, MAX_WINDOW_SIZE)
}

/// Process NDJSON from a reader in fixed-size windows, writing output
/// per-window. Lines spanning window boundaries are carried to the next
/// window. Returns the number of rows processed.
pub fn process_ndjson_streaming<R: Read, W: Write>(
    reader: &mut R,
    job: &Job,
    out: &mut W,
) -> Result<usize> {
    stream_windows(reader, job, out, window_size())
}

fn stream_windows<R: Read, W: Write>(
    reader: &mut R,
    job: &Job,
    out: &mut W,
    window_size: usize,
) -> Result<usize> {
    let mut buf = vec![0u8; window_size.max(1)];
    let mut carry_len: usize = 0;
    let mut rows = 0;
    let mut first_window = true;

    loop {
        let max_read = buf.len() - carry_len;
        let bytes_read = read_fully(reader, &mut buf[carry_len..])?;

        if bytes_read == 0 && carry_len == 0 {
            break;
        }

        let data_len = carry_len + bytes_read;
        let at_eof = bytes_read < max_read;

        // Everything after the last newline is a partial line to carry.
        let (process_len, next_carry_len) = if at_eof {
            (data_len, 0)
        } else {
            match memchr::memrchr(b'\n', &buf[..data_len]) {
                Some(pos) => (pos + 1, data_len - (pos + 1)),
                None => {
                    // Single line longer than the buffer.
                    carry_len = data_len;
                    buf.resize(buf.len() * 2, 0);
                    continue;
                }
            }
        };

        let mut window_data = &buf[..process_len];
        if first_window {
            window_data = window_data.strip_prefix(crate::UTF8_BOM).unwrap_or(window_data);
            first_window = false;
        }
        let lines = split_lines(window_data);
        let chunk_out = process_lines(&lines, job, rows)?;
        out.write_all(&chunk_out)?;
        rows += lines.len();
        debug!(rows, window_bytes = process_len, "ndjson window done");

        if at_eof {
            break;
        }

        if next_carry_len > 0 {
            buf.copy_within(process_len..process_len + next_carry_len, 0);
        }
        carry_len = next_carry_len;
    }

    Ok(rows)
}

/// Read until `buf` is full or EOF, handling short reads and EINTR.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}

/// Non-blank lines of `data`, trailing `\r` removed.
fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    for nl_pos in memchr_iter(b'\n', data) {
        push_line(&mut lines, &data[start..nl_pos]);
        start = nl_pos + 1;
    }
    if start < data.len() {
        push_line(&mut lines, &data[start..]);
    }
    lines
}

fn push_line<'a>(lines: &mut Vec<&'a [u8]>, line: &'a [u8]) {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if !line.iter().all(u8::is_ascii_whitespace) {
        lines.push(line);
    }
}

/// Run `job` over `lines` in batches, concatenating output in order.
/// `first_row` numbers rows in error messages.
fn process_lines(lines: &[&[u8]], job: &Job, first_row: usize) -> Result<Vec<u8>> {
    let batch_rows = job.batch_rows.max(1);
    let results: Result<Vec<Vec<u8>>> = lines
        .par_chunks(batch_rows)
        .enumerate()
        .map(|(i, batch)| {
            let start = first_row + i * batch_rows;
            process_batch(batch, job)
                .with_context(|| format!("rows {}..{} failed", start, start + batch.len()))
        })
        .collect();
    let results = results?;

    let total_size: usize = results.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total_size);
    for buf in results {
        out.extend_from_slice(&buf);
    }
    Ok(out)
}

/// One batch is one fragment: prepare, run the function, close.
fn process_batch(lines: &[&[u8]], job: &Job) -> Result<Vec<u8>> {
    let text: Column<String> = lines
        .iter()
        .map(|line| match std::str::from_utf8(line) {
            Ok(s) => Some(s.to_string()),
            Err(e) => {
                trace!(error = %e, "row is not utf-8, treated as null");
                None
            }
        })
        .collect();

    let mut ctx = FragmentContext::new(job.config);
    let path = PathArg::path(job.path.as_deref().unwrap_or("$"));
    if job.function != JsonFunction::Parse {
        ctx.prepare(FunctionStateScope::FragmentLocal, &path)?;
    }
    let json = match &job.flatten {
        Some(schema) if job.function != JsonFunction::Parse => flatten_rows(schema, &text),
        _ => JsonColumn::Text(text),
    };

    let mut out = Vec::with_capacity(lines.len() * 16);
    let result = run_function(&mut ctx, job, &json, &path, &mut out);
    let closed = ctx.close(FunctionStateScope::FragmentLocal);
    result?;
    closed?;
    Ok(out)
}

fn flatten_rows(schema: &FlatSchema, text: &Column<String>) -> JsonColumn {
    let docs: Vec<Option<Value>> = text
        .iter()
        .map(|row| row.as_deref().and_then(|t| Value::parse(t).ok()))
        .collect();
    JsonColumn::Flat(JsonFlattener::new(schema.clone()).flatten(docs.iter().map(Option::as_ref)))
}

fn run_function(
    ctx: &mut FragmentContext,
    job: &Job,
    json: &JsonColumn,
    path: &PathArg,
    out: &mut Vec<u8>,
) -> Result<()> {
    let optional_path = job.path.as_ref().map(|_| path);
    match job.function {
        JsonFunction::Query => write_rows(out, &functions::json_query(ctx, json, path)?, write_json),
        JsonFunction::GetInt => write_rows(out, &functions::get_json_int(ctx, json, path)?, write_int),
        JsonFunction::GetDouble => write_rows(
            out,
            &functions::get_json_double(ctx, json, path)?,
            |w, f| output::write_double(w, *f),
        ),
        JsonFunction::GetString => write_rows(
            out,
            &functions::get_json_string(ctx, json, path)?,
            |w, s| w.write_all(s.as_bytes()),
        ),
        JsonFunction::GetBool => write_rows(out, &functions::get_json_bool(ctx, json, path)?, write_bool),
        JsonFunction::Exists => write_rows(out, &functions::json_exists(ctx, json, path)?, write_bool),
        JsonFunction::Length => write_rows(
            out,
            &functions::json_length(ctx, json, optional_path)?,
            write_int,
        ),
        JsonFunction::Keys => write_rows(
            out,
            &functions::json_keys(ctx, json, optional_path)?,
            write_json,
        ),
        JsonFunction::Parse => {
            let JsonColumn::Text(rows) = json else {
                bail!("parse_json needs text rows");
            };
            write_rows(out, &functions::parse_json(ctx, rows), write_json)
        }
    }
}

fn write_rows<T>(
    out: &mut Vec<u8>,
    rows: &[Option<T>],
    mut cell: impl FnMut(&mut Vec<u8>, &T) -> io::Result<()>,
) -> Result<()> {
    for row in rows {
        match row {
            Some(value) => cell(out, value)?,
            None => out.extend_from_slice(b"NULL"),
        }
        out.push(b'\n');
    }
    Ok(())
}

fn write_json(w: &mut Vec<u8>, value: &Value) -> io::Result<()> {
    output::write_value(w, value)
}

fn write_int(w: &mut Vec<u8>, n: &i64) -> io::Result<()> {
    w.write_all(itoa::Buffer::new().format(*n).as_bytes())
}

fn write_bool(w: &mut Vec<u8>, b: &bool) -> io::Result<()> {
    w.write_all(if *b { b"true" } else { b"false" })
}

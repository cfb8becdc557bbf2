use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufWriter, Write};

use jsonpath_engine::EngineConfig;
use jsonpath_engine::flat_eval::{FlatField, FlatSchema};
use jsonpath_engine::parallel::ndjson::DEFAULT_BATCH_ROWS;
use jsonpath_engine::parallel::{Job, JsonFunction};

#[derive(Parser)]
#[command(
    name = "jsonpath",
    about = "Evaluate JSON path functions over NDJSON rows",
    version
)]
struct Cli {
    /// Function to apply: query, get-int, get-double, get-string, get-bool,
    /// exists, length, keys, parse (SQL names such as get_json_int also work)
    function: JsonFunction,

    /// Input file(s); defaults to stdin
    files: Vec<String>,

    /// JSON path, e.g. `$.k1[0]`; defaults to the whole document
    #[arg(short = 'p', long)]
    path: Option<String>,

    /// Rows per fragment
    #[arg(long, default_value_t = DEFAULT_BATCH_ROWS)]
    batch_rows: usize,

    /// Hoist these top-level keys into a flat column (`key` or `key:type`)
    #[arg(long, value_delimiter = ',')]
    flatten: Vec<FlatField>,

    /// Drop keys that are not hoisted instead of keeping a remainder
    #[arg(long, requires = "flatten")]
    no_remainder: bool,

    /// Parse every row even when it repeats the previous row's text
    #[arg(long)]
    no_reuse_parse: bool,

    /// Fail on keys outside a flat schema without remainder
    #[arg(long)]
    no_dynamic_flat_fallback: bool,

    /// Log more (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn job(cli: &Cli) -> Result<Job> {
    let mut config = EngineConfig::from_env();
    if cli.no_reuse_parse {
        config.reuse_parse = false;
    }
    if cli.no_dynamic_flat_fallback {
        config.dynamic_flat_fallback = false;
    }
    let flatten = if cli.flatten.is_empty() {
        None
    } else {
        Some(FlatSchema::new(cli.flatten.clone(), !cli.no_remainder).context("invalid --flatten")?)
    };
    Ok(Job {
        function: cli.function,
        path: cli.path.clone(),
        flatten,
        config,
        batch_rows: cli.batch_rows.max(1),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(path) = cli.path.as_deref().filter(|p| !p.is_empty())
        && cli.function != JsonFunction::Parse
    {
        jsonpath_engine::compile(path).with_context(|| format!("failed to compile path: {path}"))?;
    }
    let job = job(&cli)?;

    let stdout = io::stdout().lock();
    let mut out = BufWriter::with_capacity(128 * 1024, stdout);

    if cli.files.is_empty() {
        let mut stdin = io::stdin().lock();
        let rows = jsonpath_engine::parallel::process_ndjson_streaming(&mut stdin, &job, &mut out)
            .context("failed to process stdin")?;
        tracing::debug!(rows, "stdin done");
    } else {
        for path in &cli.files {
            let mut buf =
                std::fs::read(path).with_context(|| format!("failed to read file: {path}"))?;
            jsonpath_engine::strip_bom(&mut buf);
            let (output, rows) = jsonpath_engine::parallel::process_ndjson(&buf, &job)
                .with_context(|| format!("failed to process file: {path}"))?;
            out.write_all(&output)?;
            tracing::debug!(file = %path, rows, "file done");
        }
    }

    out.flush()?;
    Ok(())
}

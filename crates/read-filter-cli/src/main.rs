//! CLI tool for recomputing the read filter column of a sequencing-read
//! table or database in place.

mod error;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, ValueEnum};
use log::debug;
use read_filter_core::{
    read_filter::FilterPolicy,
    rewrite::{RewriteConfig, rewrite},
    store::Manager,
};
use snafu::ResultExt;

use crate::error::{
    CliResult, ParseConfigSnafu, ParseJsonSnafu, ReadConfigSnafu, RewriteSnafu,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Copy every filter byte unchanged
    Keep,
    /// Reject every passing read
    RejectAll,
    /// Mark every read redacted
    RedactAll,
    /// Reject passing reads at even positions within a row
    RejectEven,
}

impl From<PolicyArg> for FilterPolicy {
    fn from(v: PolicyArg) -> Self {
        match v {
            PolicyArg::Keep => FilterPolicy::Keep,
            PolicyArg::RejectAll => FilterPolicy::RejectAll,
            PolicyArg::RedactAll => FilterPolicy::RedactAll,
            PolicyArg::RejectEven => FilterPolicy::RejectEven,
        }
    }
}

/// Recompute the per-read filter column and atomically replace the target.
#[derive(Debug, Parser)]
#[command(name = "make-read-filter", version)]
struct Cli {
    /// Table or database to rewrite (overrides "target" in --config)
    #[arg(value_name = "PATH", required_unless_present = "config")]
    path: Option<PathBuf>,

    /// Predicate applied to every read
    #[arg(long, value_enum, default_value_t = PolicyArg::Keep)]
    policy: PolicyArg,

    /// JSON rewrite configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reads table inside a database target
    #[arg(long)]
    table: Option<String>,

    /// Existing filter column read from the source
    #[arg(long = "filter-column")]
    filter_column: Option<String>,

    /// Column whose per-row element count is the row's read count
    #[arg(long = "read-count-column")]
    read_count_column: Option<String>,

    /// Recomputed filter column written to the output
    #[arg(long = "output-column")]
    output_column: Option<String>,

    /// Repeatable; replaces the default copy set
    #[arg(long = "copy-column")]
    copy_column: Vec<String>,

    /// Repeatable; replaces the default metadata migration set
    #[arg(long = "metadata-node")]
    metadata_node: Vec<String>,

    /// Skip fsync on commit
    #[arg(long, default_value_t = false)]
    no_fsync: bool,

    /// Print elapsed time for the rewrite
    #[arg(long, default_value_t = false)]
    timing: bool,
}

fn load_config(path: &Path, target: Option<&Path>) -> CliResult<RewriteConfig> {
    let text = std::fs::read_to_string(path).context(ReadConfigSnafu { path })?;
    let mut value: serde_json::Value =
        serde_json::from_str(&text).context(ParseJsonSnafu { path })?;
    if let (Some(target), Some(obj)) = (target, value.as_object_mut()) {
        obj.insert(
            "target".to_string(),
            serde_json::Value::String(target.to_string_lossy().into_owned()),
        );
    }
    RewriteConfig::from_json(&value.to_string()).context(ParseConfigSnafu { path })
}

fn build_config(cli: &Cli) -> CliResult<RewriteConfig> {
    let mut cfg = match (&cli.config, &cli.path) {
        (Some(file), path) => load_config(file, path.as_deref())?,
        (None, Some(path)) => RewriteConfig::new(path),
        // clap enforces PATH when --config is absent
        (None, None) => RewriteConfig::new(PathBuf::new()),
    };

    if let Some(table) = &cli.table {
        cfg.reads_table = table.clone();
    }
    if let Some(col) = &cli.filter_column {
        cfg.filter_column = col.clone();
    }
    if let Some(col) = &cli.read_count_column {
        cfg.read_count_column = col.clone();
    }
    if let Some(col) = &cli.output_column {
        cfg.output_column = col.clone();
    }
    if !cli.copy_column.is_empty() {
        cfg = cfg.with_copy_columns(cli.copy_column.iter().cloned());
    }
    if !cli.metadata_node.is_empty() {
        cfg = cfg.with_metadata_nodes(cli.metadata_node.iter().cloned());
    }
    if cli.no_fsync {
        cfg.fsync = false;
    }
    Ok(cfg)
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let cfg = build_config(&cli)?;
    let policy = FilterPolicy::from(cli.policy);
    debug!("rewriting {} with policy {policy}", cfg.target.display());

    let start = Instant::now();
    let report = rewrite(&Manager::new(), &cfg, &policy).context(RewriteSnafu)?;
    println!("{report}");
    if cli.timing {
        eprintln!("rewrite took {:.3}s", start.elapsed().as_secs_f64());
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(e.exit_status().code());
    }
}

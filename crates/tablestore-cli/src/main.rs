#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
//! `TableStore` CLI - inspect and query table files
//!
//! Usage:
//!   `tablestore info ./measurements.tbl`
//!   `tablestore where ./measurements.tbl "(a > 2) & (b < lim)" --var lim=1.5`
//!   `tablestore meta ./measurements.tbl --set '{"operator": "jdoe"}'`

mod args;
mod output;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tablestore_core::config::LoggingConfig;
use tablestore_core::{metadata_from_json, Storage, StorageOptions, TablesConfig, Variables};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "tablestore")]
#[command(author, version, about = "TableStore CLI - file-backed columnar tables")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "TABLESTORE_CONFIG",
        default_value = "tablestore.toml"
    )]
    config: PathBuf,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version, row count and size of a table file
    Info {
        /// Path to the table file
        path: PathBuf,
    },

    /// List the columns of a table
    Headers {
        /// Path to the table file
        path: PathBuf,
    },

    /// Show or change table metadata
    Meta {
        /// Path to the table file
        path: PathBuf,

        /// JSON object of string or number values to merge in
        #[arg(long)]
        set: Option<String>,

        /// Drop existing non-reserved keys before merging
        #[arg(long, requires = "set")]
        replace: bool,
    },

    /// Print a range of rows
    Read {
        /// Path to the table file
        path: PathBuf,

        /// First row
        #[arg(long, default_value = "0")]
        start: u64,

        /// End row, exclusive (0 reads to the end)
        #[arg(long, default_value = "0")]
        stop: u64,

        /// Column numbers, comma separated (all when omitted)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<usize>,
    },

    /// List the rows matching a condition
    Where {
        /// Path to the table file
        path: PathBuf,

        /// Condition, e.g. "(a > 2) & (b < 1.5)"
        condition: String,

        /// Bind a variable used by the condition (name=value)
        #[arg(long = "var", value_parser = args::parse_variable)]
        variables: Vec<(String, tablestore_core::Scalar)>,

        /// First row scanned
        #[arg(long, default_value = "0")]
        start: u64,

        /// End row, exclusive (0 scans to the end)
        #[arg(long, default_value = "0")]
        stop: u64,

        /// Scan every n-th row
        #[arg(long, default_value = "1")]
        step: u64,

        /// Print the matching rows instead of their indices
        #[arg(long)]
        values: bool,
    },

    /// Rewrite a table file without dead space
    Compact {
        /// Path to the table file
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = TablesConfig::load_from_path(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate()?;
    init_tracing(&config.logging);
    let options = StorageOptions::from_config(&config);

    match cli.command {
        Commands::Info { path } => {
            let storage = open(&path, options)?;
            let size = std::fs::metadata(&path)?.len();
            output::print_info(&storage, size, cli.format)?;
        }
        Commands::Headers { path } => {
            let storage = open(&path, options)?;
            output::print_headers(&storage.headers()?, cli.format);
        }
        Commands::Meta {
            path,
            set,
            replace,
        } => {
            let mut storage = open(&path, options)?;
            if let Some(json) = set {
                let value: serde_json::Value =
                    serde_json::from_str(&json).context("--set expects a JSON object")?;
                storage.add_meta_map(metadata_from_json(&value)?, replace)?;
            }
            output::print_metadata(&storage.get_meta_map()?, cli.format);
        }
        Commands::Read {
            path,
            start,
            stop,
            columns,
        } => {
            let storage = open(&path, options)?;
            let columns = if columns.is_empty() {
                (0..storage.headers()?.len()).collect()
            } else {
                columns
            };
            let data = storage.read(&columns, start, stop)?;
            let first = start.min(storage.row_count()?);
            let rows: Vec<u64> = (first..).take(data.first().map_or(0, |c| c.len())).collect();
            output::print_rows(&data, &rows, cli.format);
        }
        Commands::Where {
            path,
            condition,
            variables,
            start,
            stop,
            step,
            values,
        } => {
            let storage = open(&path, options)?;
            let variables: Variables = variables.into_iter().collect();
            let rows = storage.get_where_list(&condition, &variables, start, stop, step)?;
            if values {
                let data = storage.read_coordinates(&rows)?;
                output::print_rows(&data, &rows, cli.format);
            } else {
                output::print_row_numbers(&rows, cli.format);
            }
        }
        Commands::Compact { path } => {
            let mut storage = open(&path, options)?;
            let stats = storage.compact()?;
            output::print_compaction(&stats, cli.format);
        }
    }

    Ok(())
}

/// Opens an existing table file. Opening a missing path would create it.
fn open(path: &Path, options: StorageOptions) -> anyhow::Result<Storage> {
    if !path.is_file() {
        bail!("No such table file: {}", path.display());
    }
    Storage::open_with_options(path, options)
        .with_context(|| format!("opening {}", path.display()))
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod commands;
mod output;

use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;

use awardref_core::{SystemClock, ENV_AWARDREF_LOG_LEVEL};
use awardref_runtime::{EngineConfig, LifecycleManager};
use clap::{error::ErrorKind, Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::output::CliError;

#[derive(Parser)]
#[command(name = "awardref")]
#[command(about = "Load and query award reference datasets")]
#[command(
    after_help = "Environment:\n  AWARDREF_CACHE_DIR   Cache root for the lookup store and snapshots\n  AWARDREF_LOG_LEVEL   Log filter, e.g. `info` or `awardref_runtime=debug`"
)]
struct Cli {
    /// Emit logs as JSON on stderr.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
    /// Overrides AWARDREF_CACHE_DIR.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a local file as a dataset and load it.
    Load(LoadArgs),
    /// Look up one record by exact key.
    Find { category: String, key: String },
    /// Case-insensitive substring search over keys and names.
    Search {
        category: String,
        text: String,
        #[arg(long)]
        sub_category: Option<String>,
    },
    /// Records inside a lat/lon box around a point or a grid locator.
    Near(NearArgs),
    /// Print persisted snapshot information.
    Status { key: Option<String> },
}

#[derive(Args)]
struct LoadArgs {
    key: String,
    file: PathBuf,
    #[arg(long)]
    name: Option<String>,
    #[arg(long, default_value_t = ',')]
    delimiter: char,
    /// Tab-separated input; overrides --delimiter.
    #[arg(long, default_value_t = false)]
    tsv: bool,
    /// Input is a JSON array of objects instead of delimited text.
    #[arg(long, default_value_t = false, conflicts_with_all = ["tsv", "skip_lines"])]
    json_records: bool,
    #[arg(long, default_value_t = 0)]
    skip_lines: usize,
    /// Index of a skipped line holding the dataset version.
    #[arg(long)]
    version_line: Option<usize>,
    /// Rename a source column: `column=field`. Repeatable.
    #[arg(long = "map", value_parser = parse_mapping)]
    mappings: Vec<(String, String)>,
    #[arg(long, default_value = "ref")]
    key_field: String,
    #[arg(long, default_value = "name")]
    name_field: String,
    #[arg(long, default_value = "lat")]
    lat_field: String,
    #[arg(long, default_value = "lon")]
    lon_field: String,
    #[arg(long, default_value = "grid")]
    locator_field: String,
    #[arg(long)]
    sub_category_field: Option<String>,
    #[arg(long)]
    active_field: Option<String>,
    #[arg(long, default_value_t = 30)]
    max_age_days: u64,
    #[arg(long, default_value_t = awardref_ingest::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// Fetch even if the dataset snapshot is fresh.
    #[arg(long, default_value_t = false)]
    force: bool,
    /// Print lifecycle events before the summary line.
    #[arg(long, default_value_t = false)]
    progress: bool,
}

#[derive(Args)]
struct NearArgs {
    category: String,
    #[arg(long, allow_hyphen_values = true, requires = "lon", conflicts_with = "locator")]
    lat: Option<f64>,
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    lon: Option<f64>,
    #[arg(long)]
    locator: Option<String>,
    #[arg(long, default_value_t = 0.5)]
    delta: f64,
    #[arg(long)]
    sub_category: Option<String>,
}

fn parse_mapping(raw: &str) -> Result<(String, String), String> {
    let (column, field) = raw
        .split_once('=')
        .ok_or_else(|| format!("mapping `{raw}` must be column=field"))?;
    let (column, field) = (column.trim(), field.trim());
    if column.is_empty() || field.is_empty() {
        return Err(format!("mapping `{raw}` must be column=field"));
    }
    Ok((column.to_string(), field.to_string()))
}

pub fn main_entry() -> ProcessExitCode {
    let wants_json = std::env::args().any(|arg| arg == "--log-json");
    match run() {
        Ok(()) => ProcessExitCode::SUCCESS,
        Err(err) => {
            output::emit_error(&err, wants_json);
            ProcessExitCode::from(err.exit_code)
        }
    }
}

fn run() -> Result<(), CliError> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{err}");
                return Ok(());
            }
            _ => return Err(CliError::usage(err.to_string())),
        },
    };
    init_tracing(cli.log_json);

    let mut config = EngineConfig::from_env();
    if let Some(dir) = cli.cache_dir {
        config = config.with_cache_root(dir);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::internal(format!("tokio runtime: {e}")))?;
    runtime.block_on(dispatch(config, cli.command))
}

async fn dispatch(config: EngineConfig, command: Commands) -> Result<(), CliError> {
    let open = |config: EngineConfig| LifecycleManager::open(config, Arc::new(SystemClock));
    match command {
        Commands::Status { key } => commands::status(&config, key.as_deref()),
        Commands::Load(args) => commands::load(&open(config)?, args).await,
        Commands::Find { category, key } => {
            commands::find(&*open(config)?, &category, &key).await
        }
        Commands::Search {
            category,
            text,
            sub_category,
        } => {
            let manager = open(config)?;
            commands::search(&manager, &category, sub_category.as_deref(), &text).await
        }
        Commands::Near(args) => commands::near(&*open(config)?, args).await,
    }
}

fn init_tracing(log_json: bool) {
    let filter = std::env::var(ENV_AWARDREF_LOG_LEVEL)
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn mapping_flag_requires_both_sides() {
        assert_eq!(
            parse_mapping(" title = name "),
            Ok(("title".to_string(), "name".to_string()))
        );
        assert!(parse_mapping("title").is_err());
        assert!(parse_mapping("=name").is_err());
    }

    #[test]
    fn near_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "awardref", "near", "pota", "--lat", "-33.9", "--lon", "-70.6",
        ])
        .expect("parse");
        let Commands::Near(args) = cli.command else {
            panic!("expected near");
        };
        assert_eq!(args.lat, Some(-33.9));
        assert_eq!(args.lon, Some(-70.6));
    }
}

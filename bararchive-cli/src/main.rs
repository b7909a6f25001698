//! bararchive CLI — fetch one bar range from PostgreSQL and archive it as Parquet.
//!
//! Layout of the output: `{data-root}/{symbol}/{broker}/{timeframe}/{start}_{end}.parquet`
//!
//! Exit status is non-zero only for fatal errors (config, bad arguments,
//! filesystem). An unreachable database or an empty result logs and exits 0.

use anyhow::Result;
use bararchive_cli::{log_subscriber, DEFAULT_CONFIG_PATH, DEFAULT_DATA_ROOT};
use bararchive_core::{run_archive, ArchiveRequest, ArchiveStatus, DEFAULT_SOURCE};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "bararchive",
    about = "Query bitstamp_data for a time range and save the result to nested folders"
)]
struct Cli {
    /// Trading pair symbol (e.g., BTCUSD).
    #[arg(long)]
    symbol: String,

    /// Broker or exchange name, used as a path segment.
    #[arg(long, alias = "source", default_value = DEFAULT_SOURCE)]
    broker: String,

    /// Timeframe to query (e.g., 1m, 5m, 1D).
    #[arg(long)]
    timeframe: String,

    /// Start datetime in ISO format (e.g. 2018-07-14T07:30:00Z). Inclusive.
    #[arg(long)]
    start: String,

    /// End datetime in ISO format (e.g. 2018-07-14T07:40:00Z). Exclusive.
    #[arg(long)]
    end: String,

    /// Path to the DB config file (JSON, or TOML by extension).
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Root folder where nested data folders/files are created.
    #[arg(long, default_value = DEFAULT_DATA_ROOT)]
    data_root: PathBuf,

    /// Enable debug logs.
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing::subscriber::with_default(log_subscriber(cli.debug), || run(cli))
}

fn run(cli: Cli) -> Result<()> {
    let request =
        ArchiveRequest::from_iso(cli.symbol, cli.broker, cli.timeframe, &cli.start, &cli.end)?;

    let report = run_archive(&request, &cli.config, &cli.data_root)?;

    match &report.status {
        ArchiveStatus::Archived { rows } => {
            if let Some(path) = &report.path {
                println!("Archived {rows} rows to {}", path.display());
            }
        }
        ArchiveStatus::NoData => info!("No data found; nothing written."),
        ArchiveStatus::QueryFailed(err) => warn!("Query failed ({err}); nothing written."),
        ArchiveStatus::Unreachable(err) => warn!("Database unreachable ({err}); nothing written."),
    }

    Ok(())
}

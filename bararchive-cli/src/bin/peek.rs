//! bararchive-peek — print a few rows of `bitstamp_data` to check that the
//! configured database actually holds bars.

use anyhow::Result;
use bararchive_cli::{log_subscriber, DEFAULT_CONFIG_PATH};
use bararchive_core::{load_connection_params, FetchOutcome, PgGateway, SampleQuery, BAR_TABLE};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "bararchive-peek",
    about = "Show the column names and first rows of the bar table"
)]
struct Cli {
    /// Path to the DB config file (JSON, or TOML by extension).
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Number of rows to show.
    #[arg(long, default_value_t = 5)]
    limit: u32,

    /// Enable debug logs.
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing::subscriber::with_default(log_subscriber(cli.debug), || run(&cli))
}

fn run(cli: &Cli) -> Result<()> {
    let params = load_connection_params(&cli.config)?;
    let gateway = PgGateway::new(&params);

    let rows = match gateway.sample(&SampleQuery::new(cli.limit)) {
        FetchOutcome::Rows(rows) => rows,
        FetchOutcome::Unreachable(err) | FetchOutcome::QueryFailed(err) => {
            println!("Could not read '{BAR_TABLE}': {err}");
            return Ok(());
        }
    };

    if rows.is_empty() {
        println!(
            "No rows returned from the {BAR_TABLE} table. It may be empty or you're connected to the wrong DB."
        );
        return Ok(());
    }

    println!("Column names in '{BAR_TABLE}': {}", rows.labels.join(", "));
    println!("A few rows from {BAR_TABLE}:");
    for row in &rows.rows {
        let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
        println!("  ({})", cells.join(", "));
    }

    Ok(())
}

//! Outcomedb CLI - maintenance and reporting over a result store

use clap::{Parser, Subcommand};
use outcomedb::storage::SqliteStore;
use outcomedb::{OrderDir, OrderField, ResultQuery, ResultStorage, config};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "outcomedb")]
#[command(version = "0.1.0")]
#[command(about = "Relational result storage for assessment deliveries")]
#[command(long_about = r#"
Outcomedb persists delivery-attempt results and their outcome/response
variables in SQLite and exposes the reporting queries over them.

Example usage:
  outcomedb init --database results.db
  outcomedb results --delivery delivery-1 --order result_id --limit 20
  outcomedb delete --result-id res-42
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the database file (falls back to outcomedb.toml, then outcomedb.db)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and write a config file pointing at it
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// Show row counts for the store
    Stats,

    /// List every call id in the store (full scan, reporting use only)
    CallIds,

    /// List results, optionally filtered by delivery
    Results {
        /// Delivery id(s) to filter by; no filter lists everything
        #[arg(short = 'D', long = "delivery")]
        deliveries: Vec<String>,

        /// Sort column: delivery, test_taker or result_id (unknown values are ignored)
        #[arg(long)]
        order: Option<String>,

        /// Sort direction: asc or desc (unknown values are ignored)
        #[arg(long)]
        orderdir: Option<String>,

        #[arg(long, default_value = "0")]
        offset: u64,

        #[arg(long, default_value = "1000")]
        limit: u64,

        /// Emit JSON instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Count results, optionally filtered by delivery
    Count {
        #[arg(short = 'D', long = "delivery")]
        deliveries: Vec<String>,
    },

    /// Delete a result and all of its variables
    Delete {
        #[arg(short, long)]
        result_id: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let file_config = config::load_config(None)?;
    let db_path = config::resolve_database_path(cli.database, file_config.as_ref());

    match cli.command {
        Commands::Init { force } => {
            config::ensure_db_dir(&db_path)?;
            SqliteStore::open(&db_path)?;
            tracing::info!("Schema ready in {:?}", db_path);

            let cfg = config::OutcomedbConfig {
                database: Some(db_path.to_string_lossy().to_string()),
            };
            config::write_config(&config::default_config_path(), &cfg, force)?;
            println!("Initialized result store at {:?}", db_path);
        }

        Commands::Stats => {
            let storage = ResultStorage::new(SqliteStore::open(&db_path)?);
            print!("{}", storage.stats()?);
        }

        Commands::CallIds => {
            let storage = ResultStorage::new(SqliteStore::open(&db_path)?);
            let call_ids = storage.get_all_call_ids()?;
            if call_ids.is_empty() {
                println!("No call ids recorded.");
            } else {
                for call_id in call_ids {
                    println!("{call_id}");
                }
            }
        }

        Commands::Results { deliveries, order, orderdir, offset, limit, json } => {
            let storage = ResultStorage::new(SqliteStore::open(&db_path)?);

            // unknown order/orderdir strings are dropped, not rejected
            let query = ResultQuery {
                order: order.as_deref().and_then(OrderField::parse),
                order_dir: orderdir
                    .as_deref()
                    .and_then(OrderDir::parse)
                    .unwrap_or_default(),
                offset,
                limit,
            };

            let filter: Vec<&str> = deliveries.iter().map(String::as_str).collect();
            let rows = storage.get_result_by_delivery(&filter, &query)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No results found.");
            } else {
                for row in rows {
                    println!(
                        "{}\ttest_taker={}\tdelivery={}",
                        row.result_id,
                        row.test_taker.as_deref().unwrap_or("-"),
                        row.delivery.as_deref().unwrap_or("-"),
                    );
                }
            }
        }

        Commands::Count { deliveries } => {
            let storage = ResultStorage::new(SqliteStore::open(&db_path)?);
            let filter: Vec<&str> = deliveries.iter().map(String::as_str).collect();
            println!("{}", storage.count_result_by_delivery(&filter)?);
        }

        Commands::Delete { result_id } => {
            let mut storage = ResultStorage::new(SqliteStore::open(&db_path)?);
            storage.delete_result(&result_id)?;
            tracing::info!("Deleted result {result_id} and its variables");
            println!("Deleted {result_id}");
        }
    }

    Ok(())
}

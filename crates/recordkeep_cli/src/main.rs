//! Command-line access to a SQLite-backed record store.
//!
//! # Responsibility
//! - Inspect and edit records without writing a host program.
//! - Exercise the same provider/service paths library callers use.
//!
//! Global options fall back to `RECORDKEEP_DB`, `RECORDKEEP_LOG_DIR` and
//! `RECORDKEEP_LOG_LEVEL`. Logging stays off without a log directory.

use clap::{Parser, Subcommand};
use log::info;
use recordkeep_core::{
    core_version, default_log_level, expire_at_from_millis, init_logging, log_debug_fn,
    DocumentPersistenceProvider, PersistenceProvider, RecordService, SqliteDocumentStore,
    StoreTimestampProvider, TimestampProvider,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "recordkeep_cli")]
#[command(about = "Inspect and edit persistence records", long_about = None)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "RECORDKEEP_DB",
        default_value = "recordkeep.sqlite3",
        help = "path to the SQLite database file"
    )]
    db: PathBuf,

    #[arg(long, global = true, env = "RECORDKEEP_LOG_DIR", help = "absolute log directory")]
    log_dir: Option<String>,

    #[arg(long, global = true, env = "RECORDKEEP_LOG_LEVEL", help = "trace|debug|info|warn|error")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Print one record as JSON")]
    Get { collection: String, record: String },
    #[command(about = "Add a value, optionally expiring the record after ttl_seconds")]
    Add {
        collection: String,
        record: String,
        value: String,
        ttl_seconds: Option<u64>,
    },
    #[command(about = "Remove every occurrence of a value")]
    Remove {
        collection: String,
        record: String,
        value: String,
    },
    #[command(about = "Delete records whose expiry has passed")]
    Purge,
    #[command(about = "Print the store clock in epoch seconds")]
    Now,
    #[command(about = "Print the core library version")]
    Version,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<String> {
    if let Command::Version = cli.command {
        return Ok(format!("recordkeep_core version={}", core_version()));
    }

    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    let store = Arc::new(SqliteDocumentStore::open(&cli.db)?);
    let clock = StoreTimestampProvider::new(Arc::clone(&store));
    let provider = DocumentPersistenceProvider::new(Arc::clone(&store))
        .with_create_expire_at_from_millis(expire_at_from_millis)
        .with_debug_fn({
            let forward = log_debug_fn();
            move |message: &str| forward(message)
        });
    let service = RecordService::new(provider, StoreTimestampProvider::new(Arc::clone(&store)));

    let record = match cli.command {
        Command::Get { collection, record } => service.provider().get(&collection, &record)?,
        Command::Add {
            collection,
            record,
            value,
            ttl_seconds,
        } => service.add_value(&collection, &record, &value, ttl_seconds)?,
        Command::Remove {
            collection,
            record,
            value,
        } => service.remove_value(&collection, &record, &value)?,
        Command::Purge => {
            let now_ms = clock.timestamp_seconds()?.saturating_mul(1000);
            let purged = store.purge_expired(now_ms)?;
            info!("event=cli_purge module=cli status=ok purged={purged}");
            return Ok(format!("purged={purged}"));
        }
        Command::Now => return Ok(clock.timestamp_seconds()?.to_string()),
        Command::Version => return Ok(format!("recordkeep_core version={}", core_version())),
    };
    Ok(serde_json::to_string_pretty(&record)?)
}

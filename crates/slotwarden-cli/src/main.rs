//! `slotwarden`: offline operator tool for a persisted slot table.
//!
//! Works against the SQLite database the engine saves to, without talking
//! to the lock. Useful for backups, migrating a table between installs and
//! recovering from a bad local state.
//!
//! Usage:
//!   slotwarden --db <path> show
//!   slotwarden --db <path> export [--out <file>]
//!   slotwarden --db <path> import <file>
//!   slotwarden --db <path> clear-cache
//!   slotwarden --db <path> reset-usage <slot>
//!
//! `--dry-run` runs any command against an in-memory copy of the table.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use slotwarden_engine::EngineConfig;
use slotwarden_storage::{AnySlotRepository, Database, DatabaseConfig, SqliteSlotRepository};
use tracing::info;

/// slotwarden slot table tool.
#[derive(Parser, Debug)]
#[command(name = "slotwarden", about = "Inspect and maintain a slotwarden slot table")]
struct Cli {
    /// Path to the SQLite database.
    #[arg(long = "db", global = true, default_value = "slotwarden.db")]
    db: String,

    /// Engine configuration file (JSON). Defaults apply when omitted.
    #[arg(long = "config", short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Work on an in-memory copy; nothing is written back.
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every slot.
    Show {
        /// Print the table as a JSON snapshot instead.
        #[arg(long)]
        json: bool,
    },

    /// Write a snapshot of the table.
    Export {
        /// Output file (default: stdout).
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Replace the table with a snapshot.
    Import {
        /// Snapshot file written by `export`.
        file: PathBuf,
        /// Override the configured slot count.
        #[arg(long)]
        slot_count: Option<u16>,
    },

    /// Forget all local slot state.
    ClearCache {
        /// Skip confirmation.
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },

    /// Zero a slot's usage count.
    ResetUsage {
        /// Slot number.
        slot: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = commands::load_config(cli.config.as_deref())?;

    info!("Opening slot table at {}", cli.db);
    let db = Database::new(DatabaseConfig::new(&cli.db)).await?;
    let sqlite = SqliteSlotRepository::new(db.pool().clone());

    let result = match commands::select_repository(sqlite, cli.dry_run).await {
        Ok(repo) => run(cli.command, &mut config, &repo).await,
        Err(e) => Err(e),
    };
    db.close().await;
    result
}

async fn run(
    command: Commands,
    config: &mut EngineConfig,
    repo: &AnySlotRepository,
) -> anyhow::Result<()> {
    match command {
        Commands::Show { json } => {
            if json {
                println!("{}", commands::export(config, repo).await?);
            } else {
                let slots = commands::load_table(config, repo).await?;
                print!("{}", commands::render_table(&slots));
            }
        }
        Commands::Export { out } => {
            let json = commands::export(config, repo).await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    info!("Snapshot written to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Import { file, slot_count } => {
            if let Some(slot_count) = slot_count {
                *config = config.clone().slot_count(slot_count);
                config.validate()?;
            }
            let json = std::fs::read_to_string(&file)?;
            let imported = commands::import(config, repo, &json).await?;
            println!("Imported {imported} assigned slots");
        }
        Commands::ClearCache { yes } => {
            if !yes {
                anyhow::bail!("clear-cache forgets every slot; pass --yes to confirm");
            }
            commands::clear_cache(config, repo).await?;
            println!("Slot table cleared");
        }
        Commands::ResetUsage { slot } => {
            let slot = commands::reset_usage(config, repo, slot).await?;
            println!("Slot {} usage count reset", slot.id);
        }
    }
    Ok(())
}

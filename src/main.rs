//! # Evidence Harness CLI (`evh`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `evh search "<query>"` | Collect, normalize and deduplicate documents |
//! | `evh profile "<query>" --type T` | Search plus signals, events and a display name |
//! | `evh audit root` | Merkle root of a day's audit ledger |
//! | `evh restore <path>` | Print a document set saved with `search --save` |
//! | `evh sources` | List configured connectors |
//!
//! Results are printed to stdout as pretty JSON; logs go to stderr and are
//! filtered with `RUST_LOG`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use evidence_harness::backup::{backup_docs, restore_docs};
use evidence_harness::config::{self, Config};
use evidence_harness::models::{AuditAction, AuditEvent};
use evidence_harness::pipeline::Pipeline;

/// Evidence Harness CLI: concurrent, auditable evidence collection from
/// public sources.
#[derive(Parser)]
#[command(
    name = "evh",
    about = "Evidence Harness: concurrent, auditable evidence collection",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "./config/evh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query every enabled connector and print the deduplicated documents.
    Search {
        query: String,

        /// Entity type hint (`person`, `organization`, `domain`, ...).
        #[arg(long = "type")]
        kind: Option<String>,

        /// Also write the documents to this file as a JSON array.
        #[arg(long)]
        save: Option<PathBuf>,

        /// Print a metrics snapshot after the response.
        #[arg(long)]
        metrics: bool,
    },

    /// Build an entity profile: documents, signals, timeline events.
    Profile {
        query: String,

        #[arg(long = "type")]
        kind: String,

        #[arg(long)]
        metrics: bool,
    },

    /// Inspect the audit log.
    Audit {
        #[command(subcommand)]
        action: AuditCommand,
    },

    /// Print a document set previously saved with `search --save`.
    Restore { path: PathBuf },

    /// List configured connectors.
    Sources,
}

#[derive(Subcommand)]
enum AuditCommand {
    /// Print the Merkle root of one day's ledger (UTC).
    Root {
        /// Day as YYYY-MM-DD; defaults to today.
        #[arg(long)]
        day: Option<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load(path: &Path) -> Result<Config> {
    let mut cfg = config::load_config(path)?;
    cfg.apply_overrides(std::env::vars())?;
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = load(&cli.config)?;
    let pipeline = Pipeline::from_config(&cfg)?;

    match cli.command {
        Commands::Search {
            query,
            kind,
            save,
            metrics,
        } => {
            let response = pipeline.search(&query, kind.as_deref()).await;
            if let Some(path) = save {
                backup_docs(&response.docs, &path)?;
                pipeline.audit().append(
                    &AuditEvent::system(AuditAction::Backup, path.display().to_string())
                        .with("count", response.count),
                );
            }
            print_json(&response)?;
            if metrics {
                print_json(&pipeline.metrics().snapshot())?;
            }
        }
        Commands::Profile {
            query,
            kind,
            metrics,
        } => {
            let response = pipeline.profile(&query, Some(&kind)).await;
            print_json(&response)?;
            if metrics {
                print_json(&pipeline.metrics().snapshot())?;
            }
        }
        Commands::Audit {
            action: AuditCommand::Root { day },
        } => {
            let day = match day {
                Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .with_context(|| format!("Invalid day '{}': expected YYYY-MM-DD", d))?,
                None => Utc::now().date_naive(),
            };
            if cfg.audit.dir.is_none() {
                tracing::warn!("audit.dir is not set; the ledger only covers this process");
            }
            println!("{}", pipeline.audit().merkle_root(day));
        }
        Commands::Restore { path } => {
            let docs = restore_docs(&path)?;
            pipeline.audit().append(
                &AuditEvent::system(AuditAction::Restore, path.display().to_string())
                    .with("count", docs.len()),
            );
            print_json(&docs)?;
        }
        Commands::Sources => {
            println!("{:<18} {:<12} DESCRIPTION", "CONNECTOR", "KIND");
            for connector in pipeline.orchestrator().connectors() {
                let kind = if connector.inner().is_placeholder() {
                    "placeholder"
                } else {
                    "live"
                };
                println!(
                    "{:<18} {:<12} {}",
                    connector.name(),
                    kind,
                    connector.inner().description()
                );
            }
        }
    }

    Ok(())
}

//! tablecache - point lookups against a locally cached reference table.
//!
//! Loads configuration, opens a cache with the configured invalidation
//! policy and answers lookups from it. `watch` keeps a background refresh
//! running until interrupted.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tablecache_core::{
    Config, Indexer, PairIndexer, PolicyKind, RecordIndexer, RefreshOutcome, TableCache,
};

#[derive(Debug, Parser)]
#[command(name = "tablecache", version, about = "Cached lookups against a remote reference table")]
struct Cli {
    /// Config file (defaults to ~/.config/tablecache/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Source URL, overrides the config file
    #[arg(long, global = true, env = "TABLECACHE_URL")]
    url: Option<String>,

    /// Persisted table location, overrides the config file
    #[arg(long, global = true, env = "TABLECACHE_CACHE_FILE")]
    cache_file: Option<PathBuf>,

    /// Use the expiry (pull-through) policy instead of the configured one
    #[arg(long, global = true)]
    expiry: bool,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// All from -> to pairs for a key (e.g. branch -> legal entity for a country)
    Lookup { key: String },
    /// The single record for a key, without the key field
    Get { key: String },
    /// Fetch from the source now and report whether the table changed
    Refresh,
    /// Show what is currently cached
    Status,
    /// Keep the cache refreshed in the background until Ctrl-C
    Watch,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tablecache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };

    if let Some(ref url) = cli.url {
        config.source_url = url.clone();
    }
    if let Some(ref path) = cli.cache_file {
        config.cache_file = Some(path.clone());
    }
    if cli.expiry {
        config.policy = PolicyKind::Expiry;
    }

    config.validate()?;
    Ok(config)
}

async fn open<X: Indexer>(config: &Config, indexer: X) -> Result<TableCache<X>> {
    TableCache::open(config, indexer)
        .await
        .with_context(|| format!("Failed to open lookup table from {}", config.source_url))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_ref());

    let config = load_config(&cli)?;
    info!(url = %config.source_url, policy = ?config.policy, "tablecache starting");

    let pairs = PairIndexer::new(&config.key_field, &config.from_field, &config.to_field);

    match cli.command {
        Command::Lookup { ref key } => {
            let cache = open(&config, pairs).await?;
            let result = cache.lookup(key).await?;
            print_json(&result)?;
            cache.close().await?;
        }
        Command::Get { ref key } => {
            let cache = open(&config, RecordIndexer::new(&config.key_field)).await?;
            let result = cache.lookup(key).await?;
            print_json(&result.map(|record| record.fields().clone()))?;
            cache.close().await?;
        }
        Command::Refresh => {
            let cache = open(&config, pairs).await?;
            match cache.refresh().await? {
                RefreshOutcome::Updated(fingerprint) => println!("updated {}", fingerprint),
                RefreshOutcome::Unchanged => println!("unchanged"),
            }
            cache.close().await?;
        }
        Command::Status => {
            let cache = open(&config, pairs).await?;
            print_json(&cache.status())?;
            cache.close().await?;
        }
        Command::Watch => {
            let cache = open(&config, pairs).await?;
            let task = cache.spawn_refresh();
            if task.is_none() {
                eprintln!("Expiry policy refreshes on lookup; nothing to run in the background");
            }

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;

            if let Some(task) = task {
                task.shutdown().await;
            }
            cache.close().await?;
        }
    }

    info!("tablecache shutting down");
    Ok(())
}

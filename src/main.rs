//! OCR Cache - maintenance CLI
//!
//! Inspects and maintains the cache database an OCR installation uses.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ocr_cache::cache::{KeyGenerator, KeyInput};
use ocr_cache::{CacheNamespace, CacheSystem, ClearScope, Config};

#[derive(Debug, Parser)]
#[command(name = "ocr_cache", version, about = "Inspect and maintain the OCR cache")]
struct Cli {
    /// Cache database file
    #[arg(long, env = "OCR_CACHE_DB_PATH", global = true)]
    db: Option<PathBuf>,

    /// Log level for this crate (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print cache statistics as JSON
    Stats,
    /// Delete every entry in a namespace, or `all`
    Clear { scope: ClearScope },
    /// Delete expired entries
    Purge,
    /// Print the content key a file would be cached under
    Key {
        namespace: CacheNamespace,
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `stats` output stays machine-readable
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(format!("ocr_cache={}", level))
            .with_context(|| format!("invalid log level: {}", level))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| "ocr_cache=info".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config = config.with_db_path(db);
    }

    // Key derivation needs no storage
    if let Command::Key { namespace, file } = &cli.command {
        let bytes = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
        println!("{}", KeyGenerator::new().derive(*namespace, KeyInput::Bytes(&bytes)));
        return Ok(());
    }

    let cache = CacheSystem::open(config.clone()).context("failed to open cache")?;
    if !cache.is_persistent() {
        anyhow::bail!("cache database at {} is unavailable", config.db_path.display());
    }

    match cli.command {
        Command::Stats => {
            let stats = cache.statistics();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Clear { scope } => {
            let removed = cache.clear(scope);
            info!("Removed {} entries", removed);
            println!("{}", removed);
        }
        Command::Purge => {
            let removed = cache.purge_expired();
            println!("{}", removed);
        }
        Command::Key { .. } => {}
    }
    Ok(())
}

//! Arbor index inspector
//!
//! Loads a local directory into the in-memory tree store and prints the
//! folder sizes served through the folder-size cache.

mod scan;

use anyhow::Result;
use arbor_cache::MemoryCache;
use arbor_common::Config;
use arbor_index::{FolderSizeCache, MemoryTreeStore};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "arbor-index")]
#[command(about = "Arbor tree index inspector")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/arbor/arbor.toml")]
    config: String,

    /// Log level (overrides the configuration file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index a local directory and print the size of every folder
    Scan {
        /// Directory to index
        dir: PathBuf,

        /// Only print folders up to this many levels below the directory
        #[arg(short, long)]
        depth: Option<usize>,

        /// Listing channel capacity
        #[arg(long)]
        stream_buffer: Option<usize>,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn load_config(path: &str) -> Result<Config> {
    if !std::path::Path::new(path).exists() {
        return Ok(Config::default());
    }
    let config_str = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to parse config file: {e}");
        Config::default()
    }))
}

async fn run_scan(
    config: &Config,
    dir: PathBuf,
    depth: Option<usize>,
    stream_buffer: Option<usize>,
) -> Result<()> {
    let mut index_config = config.index.clone();
    if let Some(buffer) = stream_buffer {
        index_config.stream_buffer = buffer;
    }

    let store = Arc::new(MemoryTreeStore::from_config(&index_config));
    let cache = Arc::new(MemoryCache::from_config(&config.cache));
    let folders = FolderSizeCache::new(store, Arc::clone(&cache))
        .with_stream_buffer(index_config.stream_buffer);

    let started = Instant::now();
    let summary = scan::index_directory(&folders, &dir).await?;
    info!(
        "Indexed {} files and {} folders from {} in {:?} ({} skipped)",
        summary.files,
        summary.folders,
        dir.display(),
        started.elapsed(),
        summary.skipped
    );

    println!("{:>14}  {:>6}  PATH", "SIZE", "ITEMS");
    for line in scan::folder_report(&folders, depth).await? {
        println!("{line}");
    }

    let stats = cache.stats();
    info!(
        "Folder size cache: {} hits, {} misses, {} sets, {} invalidations",
        stats.hits.load(Ordering::Relaxed),
        stats.misses.load(Ordering::Relaxed),
        stats.sets.load(Ordering::Relaxed),
        stats.deletes.load(Ordering::Relaxed)
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Config file: {}", args.config);

    match args.command {
        Commands::Scan {
            dir,
            depth,
            stream_buffer,
        } => run_scan(&config, dir, depth, stream_buffer).await,
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

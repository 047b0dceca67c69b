//! Blob cache CLI
//!
//! Reads, writes and clears the namespaced blob cache, and fetches URLs
//! through the cached-compute helper. The named-store backend lives only
//! as long as the process; `--desktop-shell` (or `BLOB_CACHE_DESKTOP_SHELL=1`)
//! selects the on-disk directory backend instead.

mod error;
mod fetcher;

use crate::error::{CliError, Result};
use crate::fetcher::HttpFetcher;
use blob_cache::{
    CacheConfig, CacheEntry, CacheFactory, CachedCompute, FixedEnvironment, Namespace,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "blob-cache", about = "Namespaced blob cache")]
struct Cli {
    /// Use the directory backend regardless of the environment
    #[arg(long)]
    desktop_shell: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a cached payload
    Get {
        namespace: Namespace,
        key: String,
        /// Write the payload to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Store a file's contents under a key
    Put {
        namespace: Namespace,
        key: String,
        file: PathBuf,
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
    },
    /// Remove a cached entry
    Delete { namespace: Namespace, key: String },
    /// Return the cached payload for a key, fetching the URL on a miss
    Fetch {
        namespace: Namespace,
        key: String,
        url: String,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Repeat the lookup; later rounds are served from the cache
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// Request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Remove every namespace's cached data
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout carries payloads, so logs go to stderr
    let env_filter = EnvFilter::from_default_env()
        .add_directive("blob_cache=info".parse()?)
        .add_directive("blob_cache_cli=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let cli = Cli::parse();

    let config = CacheConfig::from_env();
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Named-store quota: {} MB", config.quota_bytes / (1024 * 1024));

    let mut factory = CacheFactory::new(config);
    if cli.desktop_shell {
        factory = factory.with_environment(Arc::new(FixedEnvironment(true)));
    }
    info!("Backend: {}", factory.backend_kind());

    run(factory, cli.command).await
}

async fn run(factory: CacheFactory, command: Command) -> Result<()> {
    match command {
        Command::Get {
            namespace,
            key,
            out,
        } => {
            let cache = factory.open_cache(namespace).await?;
            match cache.match_entry(&key).await? {
                Some(entry) => {
                    info!(content_type = %entry.content_type, size = entry.size(), "Found");
                    write_payload(out.as_deref(), &entry.body).await
                }
                None => Err(CliError::NotFound(format!("{} in {}", key, namespace))),
            }
        }
        Command::Put {
            namespace,
            key,
            file,
            content_type,
        } => {
            let body = tokio::fs::read(&file).await?;
            let cache = factory.open_cache(namespace).await?;
            cache
                .put(&key, &CacheEntry::new(body, content_type))
                .await?;
            info!(namespace = %namespace, key = %key, "Stored");
            Ok(())
        }
        Command::Delete { namespace, key } => {
            let cache = factory.open_cache(namespace).await?;
            let removed = cache.delete(&key).await?;
            info!(namespace = %namespace, key = %key, removed, "Deleted");
            Ok(())
        }
        Command::Fetch {
            namespace,
            key,
            url,
            out,
            repeat,
            timeout_secs,
        } => {
            let fetcher = HttpFetcher::new(Duration::from_secs(timeout_secs))?;
            let helper = CachedCompute::new(factory);

            let mut last = None;
            for round in 1..=repeat.max(1) {
                let fetcher = fetcher.clone();
                let url = url.clone();
                let cached = helper
                    .cached_entry(namespace, &key, move || async move {
                        fetcher.fetch(&url).await
                    })
                    .await?;

                let label = if cached.outcome.is_hit() { "HIT" } else { "MISS" };
                info!(round, outcome = ?cached.outcome, "{}", label);
                last = Some(cached.entry);
            }

            let stats = helper.stats();
            info!(
                hits = stats.hits,
                misses = stats.misses,
                store_failures = stats.store_failures,
                "Fetch complete"
            );

            match last {
                Some(entry) => write_payload(out.as_deref(), &entry.body).await,
                None => Ok(()),
            }
        }
        Command::Clear => {
            let report = factory.clear_caches().await?;
            for (namespace, err) in &report.failed {
                eprintln!("failed to clear {}: {}", namespace, err);
            }
            if report.is_complete() {
                Ok(())
            } else {
                Err(CliError::ClearIncomplete(report.failed.len()))
            }
        }
    }
}

async fn write_payload(out: Option<&Path>, body: &[u8]) -> Result<()> {
    match out {
        Some(path) => tokio::fs::write(path, body).await?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(body).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

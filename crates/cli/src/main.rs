//! cachet command-line entry point.
//!
//! Fetches one URL through the response cache and prints the body to stdout.
//! Logging goes to stderr so the body can be piped.

use std::io::Write;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use http::{Request, Response};
use tracing_subscriber::EnvFilter;

use cachet_client::HttpCache;
use cachet_core::{CacheConfig, CacheFlagsExt, SqliteProvider, StorageProvider, TracingSink};

#[derive(Debug, Parser)]
#[command(name = "cachet", version, about = "Fetch URLs through a persistent HTTP response cache")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// GET a URL, serving it from the cache when possible
    Get {
        url: String,

        /// Always fetch; the response is still stored
        #[arg(long)]
        ignore_cache: bool,

        /// Serve expired entries without refreshing them
        #[arg(long)]
        ignore_expired: bool,

        /// Never touch the network; fail if nothing is cached
        #[arg(long)]
        only_cached: bool,

        /// Print the status line and headers before the body
        #[arg(short, long)]
        include: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = CacheConfig::load().context("loading configuration")?;

    match cli.command {
        Command::Get { url, ignore_cache, ignore_expired, only_cached, include } => {
            let request = Request::get(url.as_str())
                .with_ignore_cache(ignore_cache)
                .with_ignore_expired(ignore_expired)
                .with_only_cached(only_cached)
                .body(Bytes::new())
                .with_context(|| format!("invalid URL: {url}"))?;

            let cache = build_cache(&config).await?;
            let response = cache.execute(request).await?;
            print_response(&response, include)?;
        }
    }

    Ok(())
}

async fn build_cache(config: &CacheConfig) -> Result<HttpCache> {
    let provider = open_provider(config).await?;
    let cache = HttpCache::from_config(provider, config)?.with_log_sink(TracingSink);
    Ok(cache)
}

#[cfg(feature = "redis")]
async fn open_provider(config: &CacheConfig) -> Result<Box<dyn StorageProvider>> {
    if let Some(url) = config.redis_url.as_deref() {
        tracing::info!("using redis provider");
        let provider = cachet_core::provider::RedisProvider::connect(url).await?;
        return Ok(Box::new(provider));
    }
    open_sqlite(config).await
}

#[cfg(not(feature = "redis"))]
async fn open_provider(config: &CacheConfig) -> Result<Box<dyn StorageProvider>> {
    if config.redis_url.is_some() {
        tracing::warn!("redis_url is set but cachet was built without the redis feature; using sqlite");
    }
    open_sqlite(config).await
}

async fn open_sqlite(config: &CacheConfig) -> Result<Box<dyn StorageProvider>> {
    let provider = SqliteProvider::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache database {}", config.db_path.display()))?;
    Ok(Box::new(provider))
}

fn print_response(response: &Response<Bytes>, include: bool) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    if include {
        writeln!(stdout, "{:?} {}", response.version(), response.status())?;
        for (name, value) in response.headers() {
            writeln!(stdout, "{}: {}", name, String::from_utf8_lossy(value.as_bytes()))?;
        }
        writeln!(stdout)?;
    }
    stdout.write_all(response.body())?;
    stdout.flush()?;
    Ok(())
}

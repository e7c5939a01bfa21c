//! Ratebank CLI
//!
//! Host process for the rate cache: refresh rates, convert amounts, and
//! manage the persisted feed copy.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ratebank_common::{CurrencyRegistry, IsoCurrencyRegistry, Money};
use ratebank_fx::{RateCache, RateCacheConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod report;

/// Ratebank CLI
#[derive(Parser, Debug)]
#[command(name = "ratebank")]
#[command(about = "Reference exchange rates and currency conversion")]
struct Args {
    /// Feed URL (overrides RATEBANK_FEED_URL)
    #[arg(long, global = true)]
    feed_url: Option<String>,

    /// Persisted feed location (overrides RATEBANK_CACHE_PATH)
    #[arg(long, global = true)]
    cache_path: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Where to load rates from before acting.
#[derive(clap::Args, Debug)]
struct Source {
    /// Load rates from a local feed file instead of the network
    #[arg(long, conflicts_with = "offline")]
    feed_file: Option<String>,

    /// Load rates from the persisted feed copy
    #[arg(long)]
    offline: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh rates and print the table
    Rates {
        #[command(flatten)]
        source: Source,
    },
    /// Convert an amount given in minor units
    Convert {
        /// Amount in minor units of FROM (cents, yen, ...)
        #[arg(allow_hyphen_values = true)]
        amount: i64,
        /// Source currency code
        from: String,
        /// Target currency code
        to: String,
        #[command(flatten)]
        source: Source,
    },
    /// Fetch the feed and write it to the persisted location
    Save {
        /// Destination (defaults to the configured cache path)
        destination: Option<String>,
    },
    /// Print the persisted feed copy
    Export,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = RateCacheConfig::from_env();
    if let Some(url) = args.feed_url {
        config.feed_url = url;
    }
    if let Some(path) = args.cache_path {
        config = config.with_cache_path(Some(path));
    }

    let registry = Arc::new(IsoCurrencyRegistry::new());
    let cache = RateCache::from_config(config)
        .context("invalid rate cache configuration")?
        .with_registry(registry.clone());

    match args.command {
        Command::Rates { source } => {
            load(&cache, &source).await?;
            let table = cache.store().snapshot();
            let bookkeeping = cache.bookkeeping();
            if args.json {
                println!("{}", report::rates_json(&table, &bookkeeping));
            } else {
                print!("{}", report::rates_text(&table, &bookkeeping));
            }
        }
        Command::Convert {
            amount,
            from,
            to,
            source,
        } => {
            load(&cache, &source).await?;
            let output = cache
                .engine()
                .exchange_codes(amount, &from, &to)
                .with_context(|| format!("cannot convert {} to {}", from, to))?;
            let input = Money::new(amount, registry.resolve(&from)?);

            if args.json {
                println!(
                    "{}",
                    serde_json::json!({ "input": input, "output": output })
                );
            } else {
                let input_ratio = registry.subunit_ratio(&input.currency);
                let output_ratio = registry.subunit_ratio(&output.currency);
                println!(
                    "{}",
                    report::conversion_text(&input, input_ratio, &output, output_ratio)
                );
            }
        }
        Command::Save { destination } => {
            let destination = destination
                .or_else(|| cache.config().cache_id().map(str::to_string))
                .unwrap_or_default();
            cache.persist_current_feed(&destination).await?;
            info!("Saved rate feed to {}", destination);
        }
        Command::Export => {
            let bytes = cache.export_persisted_feed().await?;
            print!("{}", String::from_utf8_lossy(&bytes));
        }
    }

    Ok(())
}

async fn load(cache: &RateCache, source: &Source) -> anyhow::Result<()> {
    let outcome = if let Some(path) = &source.feed_file {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read feed file {}", path))?;
        cache.refresh_from_str(&content)?
    } else if source.offline {
        cache.refresh_from_persisted_cache().await?
    } else {
        cache.refresh_from_network().await?
    };

    info!("{}", report::refresh_summary(&outcome));
    Ok(())
}

//! Strategy Cache demo
//!
//! Runs a few strategies against the in-memory backend and logs what the
//! engine does with them. Set `RUST_LOG=strategy_cache=debug` to see every
//! protocol step.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strategy_cache::{
    spawn_cleanup_task, CallDescriptor, Config, MemoryBackend, Parameter, StrategyCache,
};

struct WebClient;

/// Demo entry point.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the backend and start the expiration sweep
/// 4. Run single, method, bulk and async strategies
/// 5. Abort the sweep and print backend statistics
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strategy_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Strategy Cache demo");

    let config = Config::from_env();
    info!(
        "Configuration loaded: sliding_expiration={}s, breaker_threshold={}, breaker_cooldown={}s, cleanup_interval={}s",
        config.sliding_expiration,
        config.circuit_breaker_threshold,
        config.circuit_breaker_cooldown,
        config.cleanup_interval
    );

    let backend = Arc::new(MemoryBackend::new());
    let cleanup_handle = spawn_cleanup_task(backend.clone(), config.cleanup_interval);
    let cache = StrategyCache::from_config(backend.clone(), &config);

    // Single value: computed once, then reused until invalidated.
    let sqrt = cache
        .with_key("Sqrt")
        .with_region("Math")
        .retrieve_using(|| Ok(2f64.sqrt()));
    let first = sqrt.get()?.context("sqrt produced no entry")?;
    let second = sqrt.get()?.context("sqrt produced no entry")?;
    let refreshed = sqrt
        .clone()
        .invalidate_if(|_| true)
        .get()?
        .context("sqrt produced no entry")?;
    info!(
        key = %sqrt.key(),
        value = first.value,
        versions = ?[first.version, second.version, refreshed.version],
        "Single strategy"
    );

    // Method strategy: the URL is passed through but not part of the key.
    let url = "https://example.com/readme.txt";
    let download = cache
        .method(&CallDescriptor::for_type::<WebClient>("DownloadText").param(Parameter::exclude_from_key(url)))?
        .expire_after(Duration::from_secs(30))
        .retrieve_using(move || Ok(format!("contents of {}", url)));
    let text = download.get_value()?;
    info!(key = %download.key(), text = %text, "Method strategy");

    // Bulk: only the keys not yet cached reach the retrieval callback.
    let squares = cache.bulk("Square", [2_u64, 3, 4]);
    squares.set_value(&2, 4_u64)?;
    let values = squares
        .retrieve_using(|misses: Vec<u64>| {
            info!(?misses, "Bulk retrieval");
            Ok(misses.into_iter().map(|k| (k, k * k)).collect())
        })
        .get_all_values()?;
    info!(?values, "Bulk strategy");

    // Async retrieval.
    let greeting = cache
        .with_key("Greeting")
        .retrieve_using_async(|| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok("hello".to_string())
        })
        .get_value_async()
        .await?;
    info!(greeting = %greeting, "Async strategy");

    cleanup_handle.abort();

    let stats = backend.stats();
    info!(
        "Backend stats: hits={}, misses={}, writes={}, validations={}, entries={}, hit_rate={:.2}",
        stats.hits,
        stats.misses,
        stats.writes,
        stats.validations,
        stats.total_entries,
        stats.hit_rate()
    );

    Ok(())
}

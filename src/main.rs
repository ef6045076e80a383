//! News Relay — Binary Entrypoint
//! Loads config, wires the feed client, watermark store, and destination
//! set, then runs the relay loop until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_relay::feed::HttpFeedClient;
use news_relay::relay::{RelayEngine, RetryPolicy};
use news_relay::watermark::FileWatermarkStore;
use news_relay::{build_destinations, load_config_default};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("news_relay=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_config_default()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        feed = %cfg.feed_url,
        destinations = cfg.destinations.len(),
        "news-relay starting"
    );

    let feed = Arc::new(HttpFeedClient::new(cfg.feed_url.clone()).with_timeout(cfg.feed_timeout_secs));
    let store = Arc::new(FileWatermarkStore::new(cfg.watermark_path.clone()));
    let destinations = build_destinations(&cfg);

    let engine = RelayEngine::new(
        feed,
        store,
        destinations,
        RetryPolicy {
            max_attempts: cfg.delivery_max_attempts,
            backoff: Duration::from_secs(cfg.delivery_backoff_secs),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received; finishing in-flight cycle");
            let _ = shutdown_tx.send(true);
        }
    });

    engine
        .run(Duration::from_secs(cfg.poll_interval_secs), shutdown_rx)
        .await;

    tracing::info!("news-relay stopped");
    Ok(())
}

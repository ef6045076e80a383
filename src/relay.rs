// src/relay.rs
//! The relay engine: poll the feed, decide newness against the persisted
//! watermark, fan the item out to every destination, and advance the
//! watermark only once every destination is accounted for.

use futures::future::join_all;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::destination::{DeliveryOutcome, Destination};
use crate::feed::{FeedClient, NewsItem};
use crate::render::render;
use crate::watermark::WatermarkStore;

/// One-time metrics registration (so series show up on whatever recorder
/// the embedding process installs).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_cycles_total", "Poll cycles started.");
        describe_counter!("relay_fetch_errors_total", "Feed fetch/parse failures.");
        describe_counter!("relay_store_errors_total", "Watermark store read/write failures.");
        describe_counter!("relay_items_announced_total", "Items fully announced.");
        describe_counter!("relay_deliveries_total", "Successful per-destination deliveries.");
        describe_counter!(
            "relay_delivery_retries_total",
            "Retryable per-destination delivery failures."
        );
        describe_counter!(
            "relay_delivery_fatal_total",
            "Fatal per-destination delivery failures."
        );
        describe_gauge!("relay_watermark", "Id of the last fully announced item.");
        describe_gauge!("relay_last_cycle_ts", "Unix ts when a cycle last ran.");
    });
}

/// Bounded in-cycle retry: `max_attempts` tries per destination with a fixed
/// pause between them. Exhaustion leaves the destination unresolved, which
/// blocks the watermark and lets the next cycle re-attempt the same item.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

/// What a single cycle did. Every failure mode is classified here so the
/// loop survives any one bad cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Upstream had nothing at all.
    NoNews,
    /// Latest item id is at or below the watermark (repeat or regression).
    AlreadyAnnounced { id: u64 },
    /// Every destination terminal; watermark advanced.
    Announced { id: u64 },
    /// One or more destinations still retryable after the in-cycle budget;
    /// watermark untouched, next cycle redelivers to all destinations.
    Stalled { id: u64, unresolved: usize },
    /// Feed fetch failed; retried next interval.
    FetchFailed,
    /// Watermark store failed; retried next interval. When the write side
    /// fails the item counts as not announced even though sends succeeded.
    StoreFailed,
}

pub struct RelayEngine {
    feed: Arc<dyn FeedClient>,
    store: Arc<dyn WatermarkStore>,
    destinations: Vec<Arc<dyn Destination>>,
    retry: RetryPolicy,
}

impl RelayEngine {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        store: Arc<dyn WatermarkStore>,
        destinations: Vec<Arc<dyn Destination>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            feed,
            store,
            destinations,
            retry,
        }
    }

    /// One fetch→dedup→fan-out→watermark pass.
    ///
    /// Only the single latest feed item is considered; if several items
    /// appeared since the previous cycle, older ones are skipped. That
    /// mirrors the upstream contract (the feed reports its newest entry
    /// first) and is intentional, not a bug.
    pub async fn run_cycle(&self) -> CycleOutcome {
        ensure_metrics_described();
        counter!("relay_cycles_total").increment(1);
        gauge!("relay_last_cycle_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

        // Read fresh each cycle; the store is the single source of truth and
        // may have been edited out-of-band (manual watermark rollback).
        let watermark = match self.store.read().await {
            Ok(w) => w,
            Err(e) => {
                counter!("relay_store_errors_total").increment(1);
                tracing::warn!(error = ?e, "watermark read failed; skipping cycle");
                return CycleOutcome::StoreFailed;
            }
        };

        let item = match self.feed.fetch_latest().await {
            Ok(Some(item)) => item,
            Ok(None) => return CycleOutcome::NoNews,
            Err(e) => {
                counter!("relay_fetch_errors_total").increment(1);
                tracing::warn!(error = ?e, feed = self.feed.name(), "feed fetch failed; skipping cycle");
                return CycleOutcome::FetchFailed;
            }
        };

        if item.id <= watermark {
            tracing::debug!(id = item.id, watermark, "item already announced");
            return CycleOutcome::AlreadyAnnounced { id: item.id };
        }

        tracing::info!(id = item.id, title = %item.title, "announcing new item");
        let outcomes = self.fan_out(&item).await;

        let unresolved = outcomes
            .iter()
            .filter(|(_, o)| !o.is_terminal())
            .count();
        if unresolved > 0 {
            tracing::warn!(
                id = item.id,
                unresolved,
                "delivery unresolved after retries; watermark held, will redeliver next cycle"
            );
            return CycleOutcome::Stalled {
                id: item.id,
                unresolved,
            };
        }

        // All destinations terminal (delivered or permanently failed): the
        // item is accounted for and the watermark may advance.
        match self.store.write(item.id).await {
            Ok(()) => {
                counter!("relay_items_announced_total").increment(1);
                gauge!("relay_watermark").set(item.id as f64);
                tracing::info!(id = item.id, "watermark advanced");
                CycleOutcome::Announced { id: item.id }
            }
            Err(e) => {
                counter!("relay_store_errors_total").increment(1);
                tracing::warn!(
                    error = ?e,
                    id = item.id,
                    "sends succeeded but watermark write failed; item will be redelivered"
                );
                CycleOutcome::StoreFailed
            }
        }
    }

    /// Deliver to every destination concurrently. Destinations are
    /// independent: one failing never blocks or skips another.
    async fn fan_out(&self, item: &NewsItem) -> Vec<(String, DeliveryOutcome)> {
        let attempts = self.destinations.iter().map(|dest| async move {
            let outcome = self.deliver_with_retry(dest.as_ref(), item).await;
            (dest.label().to_string(), outcome)
        });
        join_all(attempts).await
    }

    async fn deliver_with_retry(&self, dest: &dyn Destination, item: &NewsItem) -> DeliveryOutcome {
        let mut attempt = 0u8;
        loop {
            attempt += 1;
            // Rendered fresh per attempt; messages are never reused.
            let message = render(item, dest.kind());
            let outcome = dest.send(&message).await;
            match &outcome {
                DeliveryOutcome::Delivered => {
                    counter!("relay_deliveries_total").increment(1);
                    tracing::debug!(destination = dest.label(), id = item.id, "delivered");
                    return outcome;
                }
                DeliveryOutcome::Fatal(reason) => {
                    counter!("relay_delivery_fatal_total").increment(1);
                    tracing::error!(
                        destination = dest.label(),
                        id = item.id,
                        reason = %reason,
                        "fatal delivery failure"
                    );
                    return outcome;
                }
                DeliveryOutcome::Retryable(reason) => {
                    counter!("relay_delivery_retries_total").increment(1);
                    if attempt >= self.retry.max_attempts {
                        tracing::warn!(
                            destination = dest.label(),
                            id = item.id,
                            attempts = attempt,
                            reason = %reason,
                            "retry budget exhausted"
                        );
                        return outcome;
                    }
                    tracing::debug!(
                        destination = dest.label(),
                        id = item.id,
                        attempt,
                        reason = %reason,
                        "retryable delivery failure; backing off"
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
            }
        }
    }

    /// Timer-driven loop. Cycles are strictly sequential: the select only
    /// re-polls the ticker between cycles, and missed ticks are skipped, so
    /// overlapping cycles are structurally impossible. Flipping `shutdown`
    /// to `true` stops the loop after the in-flight cycle completes.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = interval.as_secs(),
            destinations = self.destinations.len(),
            "relay loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.run_cycle().await;
                    tracing::debug!(?outcome, "cycle finished");
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        tracing::info!("relay loop stopping");
                        break;
                    }
                }
            }
        }
    }
}

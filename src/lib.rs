// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod config;
pub mod destination;
pub mod feed;
pub mod relay;
pub mod render;
pub mod watermark;

// ---- Re-exports for stable public API ----
pub use crate::config::{load_config_default, load_config_from, DestinationConfig, RelayConfig};
pub use crate::destination::{DeliveryOutcome, Destination};
pub use crate::feed::{FeedClient, NewsItem};
pub use crate::relay::{CycleOutcome, RelayEngine, RetryPolicy};
pub use crate::render::{render, DestinationKind, FormattedMessage};
pub use crate::watermark::{FileWatermarkStore, MemoryWatermarkStore, WatermarkStore};

use std::sync::Arc;

use crate::destination::{DiscordWebhookDestination, TelegramDestination};

/// Build the configured destination set. Unlabeled Discord entries get a
/// label derived from their list position so log lines from multiple
/// webhooks stay distinguishable.
pub fn build_destinations(cfg: &RelayConfig) -> Vec<Arc<dyn Destination>> {
    cfg.destinations
        .iter()
        .enumerate()
        .map(|(i, d)| -> Arc<dyn Destination> {
            match d {
                DestinationConfig::Discord { webhook_url, label } => {
                    let label = label.clone().unwrap_or_else(|| format!("discord:{i}"));
                    Arc::new(
                        DiscordWebhookDestination::new(webhook_url.clone(), label)
                            .with_timeout(cfg.send_timeout_secs),
                    )
                }
                DestinationConfig::Telegram { bot_token, chat_id } => Arc::new(
                    TelegramDestination::new(bot_token.clone(), chat_id.clone())
                        .with_timeout(cfg.send_timeout_secs),
                ),
            }
        })
        .collect()
}

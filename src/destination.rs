// src/destination.rs
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::render::{DestinationKind, FormattedMessage, EMBED_COLOR};

/// Terminal-or-not result of one delivery attempt to one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Transient failure (network, rate limit, upstream 5xx); worth
    /// re-attempting.
    Retryable(String),
    /// Permanent failure (bad credentials, deleted channel); re-attempting
    /// cannot help. Counts as accounted-for when gating the watermark.
    Fatal(String),
}

impl DeliveryOutcome {
    /// Terminal means "no further attempt can change this" within the
    /// current cycle: delivered or permanently failed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryOutcome::Retryable(_))
    }
}

/// One configured outbound chat endpoint. The set of destinations is fixed
/// at startup; each exposes exactly one capability.
#[async_trait]
pub trait Destination: Send + Sync {
    fn kind(&self) -> DestinationKind;
    /// Stable identifier for logs ("discord:news", "telegram:-100123...").
    fn label(&self) -> &str;
    async fn send(&self, message: &FormattedMessage) -> DeliveryOutcome;
}

/// Map an HTTP send result onto the delivery taxonomy. 429 and 5xx are
/// transient; every other non-2xx is permanent.
fn classify(result: Result<reqwest::Response, reqwest::Error>, label: &str) -> DeliveryOutcome {
    match result {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                DeliveryOutcome::Delivered
            } else if status.as_u16() == 429 || status.is_server_error() {
                DeliveryOutcome::Retryable(format!("{label}: HTTP {status}"))
            } else {
                DeliveryOutcome::Fatal(format!("{label}: HTTP {status}"))
            }
        }
        Err(e) => DeliveryOutcome::Retryable(format!("{label}: {e}")),
    }
}

// --- Discord ---

#[derive(Serialize)]
struct DiscordEmbedBody {
    title: String,
    description: String,
    color: u32,
    thumbnail: DiscordThumbnail,
    footer: DiscordFooter,
}

#[derive(Serialize)]
struct DiscordThumbnail {
    url: String,
}

#[derive(Serialize)]
struct DiscordFooter {
    text: String,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbedBody>,
}

/// Posts rich embeds to a Discord channel webhook.
pub struct DiscordWebhookDestination {
    webhook_url: String,
    label: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl DiscordWebhookDestination {
    pub fn new(webhook_url: String, label: String) -> Self {
        Self {
            webhook_url,
            label,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait]
impl Destination for DiscordWebhookDestination {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Discord
    }

    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, message: &FormattedMessage) -> DeliveryOutcome {
        let FormattedMessage::DiscordEmbed {
            title,
            description,
            thumbnail_url,
            footer,
        } = message
        else {
            return DeliveryOutcome::Fatal(format!(
                "{}: message rendered for the wrong platform",
                self.label
            ));
        };

        let payload = DiscordWebhookPayload {
            content: None,
            embeds: vec![DiscordEmbedBody {
                title: title.clone(),
                description: description.clone(),
                color: EMBED_COLOR,
                thumbnail: DiscordThumbnail {
                    url: thumbnail_url.clone(),
                },
                footer: DiscordFooter {
                    text: footer.clone(),
                },
            }],
        };

        let res = self
            .client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await;
        classify(res, &self.label)
    }
}

// --- Telegram ---

#[derive(Serialize)]
struct TelegramSendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Sends MarkdownV2 messages through the Telegram bot API.
pub struct TelegramDestination {
    send_url: String,
    chat_id: String,
    label: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl TelegramDestination {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        let label = format!("telegram:{chat_id}");
        Self {
            send_url: format!("https://api.telegram.org/bot{bot_token}/sendMessage"),
            chat_id,
            label,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait]
impl Destination for TelegramDestination {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Telegram
    }

    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, message: &FormattedMessage) -> DeliveryOutcome {
        let FormattedMessage::TelegramMarkdown { text } = message else {
            return DeliveryOutcome::Fatal(format!(
                "{}: message rendered for the wrong platform",
                self.label
            ));
        };

        let payload = TelegramSendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "MarkdownV2",
        };

        let res = self
            .client
            .post(&self.send_url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await;
        classify(res, &self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_status(code: u16) -> reqwest::Response {
        reqwest::Response::from(http::Response::builder().status(code).body("").unwrap())
    }

    fn tag(o: &DeliveryOutcome) -> &'static str {
        match o {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Retryable(_) => "retryable",
            DeliveryOutcome::Fatal(_) => "fatal",
        }
    }

    #[test]
    fn http_status_classification_table() {
        let table = [
            (200, "delivered"),
            (204, "delivered"),
            (429, "retryable"),
            (500, "retryable"),
            (503, "retryable"),
            (400, "fatal"),
            (401, "fatal"),
            (404, "fatal"),
        ];
        for (status, want) in table {
            let out = classify(Ok(response_with_status(status)), "sink");
            assert_eq!(tag(&out), want, "status {status}");
        }
    }

    #[test]
    fn classification_reason_names_sink_and_status() {
        let out = classify(Ok(response_with_status(429)), "telegram:news");
        let DeliveryOutcome::Retryable(reason) = out else {
            panic!("429 must be retryable");
        };
        assert!(reason.contains("telegram:news"));
        assert!(reason.contains("429"));
    }

    #[test]
    fn terminal_covers_delivered_and_fatal() {
        assert!(DeliveryOutcome::Delivered.is_terminal());
        assert!(DeliveryOutcome::Fatal("gone".into()).is_terminal());
        assert!(!DeliveryOutcome::Retryable("429".into()).is_terminal());
    }

    #[test]
    fn discord_payload_serializes_embed_shape() {
        let payload = DiscordWebhookPayload {
            content: None,
            embeds: vec![DiscordEmbedBody {
                title: "T".into(),
                description: "B".into(),
                color: EMBED_COLOR,
                thumbnail: DiscordThumbnail {
                    url: "https://img.example/x.png".into(),
                },
                footer: DiscordFooter { text: "f".into() },
            }],
        };
        let v: serde_json::Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["embeds"][0]["color"], 0xD5059D);
        assert_eq!(v["embeds"][0]["thumbnail"]["url"], "https://img.example/x.png");
    }

    #[test]
    fn telegram_url_and_payload_shape() {
        let dest = TelegramDestination::new("123:abc".into(), "-1009".into());
        assert_eq!(dest.send_url, "https://api.telegram.org/bot123:abc/sendMessage");
        let payload = TelegramSendMessage {
            chat_id: "-1009",
            text: "hi",
            parse_mode: "MarkdownV2",
        };
        let v: serde_json::Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["parse_mode"], "MarkdownV2");
    }

    #[tokio::test]
    async fn wrong_shape_is_fatal_not_retryable() {
        let dest = TelegramDestination::new("t".into(), "c".into());
        let msg = FormattedMessage::DiscordEmbed {
            title: String::new(),
            description: String::new(),
            thumbnail_url: String::new(),
            footer: String::new(),
        };
        let out = dest.send(&msg).await;
        assert!(matches!(out, DeliveryOutcome::Fatal(_)));
    }
}

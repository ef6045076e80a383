// src/render.rs
//! Pure rendering: NewsItem + destination kind -> platform-shaped message.
//! No I/O here; the destination sinks serialize these forms onto the wire.

use crate::feed::NewsItem;

pub const EMBED_COLOR: u32 = 0xD5_059D;

const SOURCE_LINK_LABEL: &str = "Click here to visit the article site.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    Discord,
    Telegram,
}

impl std::fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DestinationKind::Discord => write!(f, "discord"),
            DestinationKind::Telegram => write!(f, "telegram"),
        }
    }
}

/// One rendered message, shaped for a single destination kind. Produced
/// fresh per delivery attempt and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormattedMessage {
    DiscordEmbed {
        title: String,
        description: String,
        thumbnail_url: String,
        footer: String,
    },
    TelegramMarkdown {
        text: String,
    },
}

pub fn render(item: &NewsItem, kind: DestinationKind) -> FormattedMessage {
    match kind {
        DestinationKind::Discord => FormattedMessage::DiscordEmbed {
            title: item.title.clone(),
            description: item.body.clone(),
            thumbnail_url: item.image_url.clone(),
            footer: format!("[{}]({})", SOURCE_LINK_LABEL, item.canonical_url),
        },
        DestinationKind::Telegram => FormattedMessage::TelegramMarkdown {
            text: format!(
                "*{}*\n\n_{}_\n\n*Source:* [{}]({})",
                escape_markdown_v2(&item.title),
                escape_markdown_v2(&item.body),
                escape_markdown_v2(SOURCE_LINK_LABEL),
                escape_link_url(&item.canonical_url),
            ),
        },
    }
}

/// Escape everything Telegram's MarkdownV2 treats as syntax.
pub fn escape_markdown_v2(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '='
                | '|' | '{' | '}' | '.' | '!' | '\\'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// Inside an inline-link URL only `)` and `\` are meta.
fn escape_link_url(url: &str) -> String {
    url.replace('\\', "\\\\").replace(')', "\\)")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> NewsItem {
        NewsItem {
            id: 101,
            title: "Markets rally".into(),
            body: "Everything is up.".into(),
            image_url: "https://img.example/t.png".into(),
            canonical_url: "https://news.example/a(1)".into(),
        }
    }

    #[test]
    fn discord_embed_carries_all_fields() {
        let msg = render(&item(), DestinationKind::Discord);
        match msg {
            FormattedMessage::DiscordEmbed {
                title,
                description,
                thumbnail_url,
                footer,
            } => {
                assert_eq!(title, "Markets rally");
                assert_eq!(description, "Everything is up.");
                assert_eq!(thumbnail_url, "https://img.example/t.png");
                assert!(footer.contains("https://news.example/a(1)"));
            }
            other => panic!("wrong shape: {other:?}"),
        }
    }

    #[test]
    fn telegram_text_is_escaped() {
        let mut it = item();
        it.title = "Up 5.2% (really!)".into();
        let msg = render(&it, DestinationKind::Telegram);
        let FormattedMessage::TelegramMarkdown { text } = msg else {
            panic!("wrong shape");
        };
        assert!(text.starts_with("*Up 5\\.2% \\(really\\!\\)*"));
        assert!(text.contains("*Source:*"));
        // link url keeps its parens balanced for the markdown parser
        assert!(text.contains("(https://news.example/a(1\\))"));
    }

    #[test]
    fn escape_handles_every_meta_char() {
        let escaped = escape_markdown_v2("_*[]()~`>#+-=|{}.!\\");
        for chunk in escaped.as_bytes().chunks(2) {
            assert_eq!(chunk[0], b'\\');
        }
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(escape_markdown_v2("hello world 42"), "hello world 42");
    }
}

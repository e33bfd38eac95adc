use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::{Notice, NotificationSink};

/// Incoming-webhook notifier. Non-2xx and transport errors are returned to the caller.
pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
    timeout: Duration,
}

impl SlackNotifier {
    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Slack mrkdwn control characters.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Block Kit payload with a plain `text` fallback for clients that do not render blocks.
pub fn build_payload(n: &Notice) -> serde_json::Value {
    let quoted = escape(&n.quote)
        .lines()
        .map(|l| format!("> {l}"))
        .collect::<Vec<_>>()
        .join("\n");
    let context = format!(
        "Posted {} · ID `{}` · source `{}`",
        escape(&n.created_at),
        escape(&n.item_id),
        escape(&n.source)
    );

    serde_json::json!({
        "text": format!("{}: {} {}", n.title, n.quote, n.link),
        "blocks": [
            {
                "type": "header",
                "text": { "type": "plain_text", "text": n.title }
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": quoted }
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("<{}|View original post>", n.link) }
            },
            {
                "type": "context",
                "elements": [ { "type": "mrkdwn", "text": context } ]
            }
        ]
    })
}

#[async_trait::async_trait]
impl NotificationSink for SlackNotifier {
    async fn notify(&self, notice: &Notice) -> Result<()> {
        self.client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&build_payload(notice))
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice() -> Notice {
        Notice {
            source: "107780257626128497".into(),
            title: "New post from Someone".into(),
            quote: "Line one <b>\nLine & two".into(),
            link: "https://example.test/1".into(),
            created_at: "2025-01-20T17:00:00.000Z".into(),
            item_id: "113".into(),
        }
    }

    #[test]
    fn payload_quotes_summary_and_carries_metadata() {
        let v = build_payload(&notice());
        let blocks = v["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0]["text"]["text"], "New post from Someone");
        assert_eq!(
            blocks[1]["text"]["text"],
            "> Line one &lt;b&gt;\n> Line &amp; two"
        );
        assert_eq!(
            blocks[2]["text"]["text"],
            "<https://example.test/1|View original post>"
        );
        let ctx = blocks[3]["elements"][0]["text"].as_str().unwrap();
        assert!(ctx.contains("2025-01-20T17:00:00.000Z"));
        assert!(ctx.contains("`113`"));
        assert!(v["text"].as_str().unwrap().contains("https://example.test/1"));
    }
}

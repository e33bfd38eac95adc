use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use std::collections::HashMap;
use std::time::Duration;

use crate::ingest::types::{FeedProvider, RawItem};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

/// Mastodon-style `accounts/{id}/statuses` feed.
pub struct StatusesProvider {
    mode: Mode,
}

enum Mode {
    /// Per-source JSON documents; `fallback` answers unknown sources.
    Fixture {
        by_source: HashMap<String, String>,
        fallback: Option<String>,
    },
    Http {
        base_url: String,
        client: reqwest::Client,
    },
}

impl StatusesProvider {
    /// Serve the same JSON document for every source.
    pub fn from_fixture_str(s: &str) -> Self {
        Self {
            mode: Mode::Fixture {
                by_source: HashMap::new(),
                fallback: Some(s.to_string()),
            },
        }
    }

    /// Serve one document per listed source; other sources fail like an unreachable feed.
    pub fn from_source_fixtures<'a>(fixtures: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            mode: Mode::Fixture {
                by_source: fixtures
                    .into_iter()
                    .map(|(source, body)| (source.to_string(), body.to_string()))
                    .collect(),
                fallback: None,
            },
        }
    }

    pub fn from_url(base_url: &str, user_agent: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            mode: Mode::Http {
                base_url: base_url.trim_end_matches('/').to_string(),
                client,
            },
        })
    }

    pub fn statuses_url(base_url: &str, source: &str) -> String {
        format!("{base_url}/api/v1/accounts/{source}/statuses")
    }
}

/// Parse a statuses page. Blank or `null` bodies are an empty page, anything but an array is an error.
pub fn parse_statuses(body: &str) -> Result<Vec<RawItem>> {
    let t0 = std::time::Instant::now();
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let value: serde_json::Value =
        serde_json::from_str(trimmed).context("parsing statuses json")?;
    let serde_json::Value::Array(items) = value else {
        bail!("statuses payload is not a JSON array");
    };
    histogram!("relay_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(items)
}

#[async_trait]
impl FeedProvider for StatusesProvider {
    async fn fetch(&self, source: &str) -> Result<Vec<RawItem>> {
        match &self.mode {
            Mode::Fixture {
                by_source,
                fallback,
            } => match by_source.get(source).or(fallback.as_ref()) {
                Some(s) => parse_statuses(s),
                None => bail!("no fixture for source {source}"),
            },
            Mode::Http { base_url, client } => {
                let url = Self::statuses_url(base_url, source);
                let body = client
                    .get(&url)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .send()
                    .await
                    .with_context(|| format!("GET {url}"))?
                    .error_for_status()
                    .context("statuses non-2xx")?
                    .text()
                    .await
                    .context("statuses .text()")?;
                parse_statuses(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "statuses"
    }
}

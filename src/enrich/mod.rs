//! Enrichment: provider abstraction + file cache + daily limit.
//!
//! The cache is keyed by item, so a re-run after a failed delivery posts the same summary
//! instead of asking the model again.

pub mod providers;

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use metrics::histogram;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ingest::types::NormalizedItem;

pub use providers::{GeminiProvider, MockProvider, OpenAiProvider};

/// Upper bound for a generated summary, in chars.
pub const MAX_SUMMARY_CHARS: usize = 280;

pub const SYSTEM_PROMPT: &str = "You summarise social media posts for a news digest. \
Return one or two neutral sentences (max 280 characters) describing what the post says. \
No hashtags, no emojis, no quotes around the answer. Output only the summary.";

/// Enrichment collaborator used by the relay.
pub trait Enricher: Send + Sync {
    fn enrich<'a>(
        &'a self,
        item: &'a NormalizedItem,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
    fn provider_name(&self) -> &'static str;
}

pub type DynEnricher = Arc<dyn Enricher>;

/// Low-level provider: does the remote call for an already built prompt.
pub trait Provider: Send + Sync + 'static {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

/// Render the model input for one item.
pub fn build_prompt(item: &NormalizedItem) -> String {
    let mut out = String::with_capacity(item.body.len() + 128);
    out.push_str("Author: ");
    out.push_str(item.display_name.as_deref().unwrap_or("unknown"));
    if !item.created_at.is_empty() {
        out.push_str("\nPosted: ");
        out.push_str(&item.created_at);
    }
    out.push_str("\nPost: ");
    out.push_str(&item.body);
    let media = item.media_count();
    if media > 0 {
        out.push_str(&format!("\nAttachments: {media} media item(s)"));
    }
    if let Some(shared) = &item.shared {
        out.push_str(&format!(
            "\nShares a post by {}: {}",
            shared.display_name.as_deref().unwrap_or("unknown"),
            shared.body
        ));
    }
    out
}

/// Single line, collapsed whitespace, at most [`MAX_SUMMARY_CHARS`] chars.
pub fn sanitize_summary(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_SUMMARY_CHARS * 4));
    let mut count = 0usize;
    let mut prev_space = true;
    for ch in input.chars() {
        if count >= MAX_SUMMARY_CHARS {
            break;
        }
        if ch.is_whitespace() || ch.is_control() {
            if !prev_space {
                out.push(' ');
                count += 1;
            }
            prev_space = true;
        } else {
            out.push(ch);
            count += 1;
            prev_space = false;
        }
    }
    out.trim_end().to_string()
}

// ------------------------------------------------------------
// Caching wrapper (file cache + daily limit)
// ------------------------------------------------------------

pub struct CachingEnricher<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
}

impl<P: Provider> CachingEnricher<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        let _ = fs::create_dir_all(&cache_dir); // best-effort
        let counter = Arc::new(Mutex::new(
            load_daily_counter(&cache_dir).unwrap_or_default(),
        ));
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    async fn enrich_impl(&self, item: &NormalizedItem) -> Result<String> {
        let key = cache_key(item);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            tracing::debug!(item_id = %item.id, "enrichment cache hit");
            return Ok(hit.summary);
        }

        {
            let mut g = self.counter.lock().map_err(|_| anyhow!("poisoned counter"))?;
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit_max {
                bail!(
                    "daily enrichment limit of {} reached ({})",
                    self.daily_limit_max,
                    self.inner.name()
                );
            }
        }

        let t0 = std::time::Instant::now();
        let raw = self.inner.generate(&build_prompt(item)).await?;
        histogram!("relay_enrich_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let summary = sanitize_summary(&raw);
        if summary.is_empty() {
            bail!("{} returned an empty summary", self.inner.name());
        }

        if let Err(e) = write_cache_file(
            &self.cache_dir,
            &key,
            &CachedSummary {
                item_id: item.id.clone(),
                summary: summary.clone(),
            },
        ) {
            tracing::warn!(error = ?e, item_id = %item.id, "enrichment cache write failed");
        }
        let mut g = self.counter.lock().map_err(|_| anyhow!("poisoned counter"))?;
        g.count = g.count.saturating_add(1);
        let _ = save_daily_counter(&self.cache_dir, &g);
        Ok(summary)
    }
}

impl<P: Provider> Enricher for CachingEnricher<P> {
    fn enrich<'a>(
        &'a self,
        item: &'a NormalizedItem,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.enrich_impl(item))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedSummary {
    item_id: String,
    summary: String,
}

fn cache_key(item: &NormalizedItem) -> String {
    let mut hasher = Sha256::new();
    hasher.update(item.id.as_bytes());
    hasher.update(b"\n");
    hasher.update(item.body.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<CachedSummary> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str(&s).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &CachedSummary) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value).map_err(io::Error::other)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().date_naive().to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_string(dc).map_err(io::Error::other)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(s.as_bytes())?;
    fs::rename(tmp, p)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::SharedItem;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        reply: &'static str,
    }

    impl Provider for CountingProvider {
        fn generate<'a>(
            &'a self,
            _prompt: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.reply.to_string();
            Box::pin(async move { Ok(reply) })
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn item(id: &str, body: &str) -> NormalizedItem {
        NormalizedItem {
            id: id.into(),
            created_at: "2025-01-20T17:00:00Z".into(),
            url: format!("https://example.test/{id}"),
            body: body.into(),
            display_name: Some("Someone".into()),
            media: None,
            shared: None,
        }
    }

    #[test]
    fn prompt_mentions_shared_post() {
        let mut it = item("1", "Look at this");
        it.shared = Some(SharedItem {
            id: "0".into(),
            created_at: String::new(),
            url: String::new(),
            body: "Original words".into(),
            display_name: Some("Other".into()),
            media: None,
        });
        let p = build_prompt(&it);
        assert!(p.starts_with("Author: Someone"));
        assert!(p.contains("Post: Look at this"));
        assert!(p.contains("Shares a post by Other: Original words"));
    }

    #[test]
    fn sanitize_collapses_and_caps() {
        assert_eq!(sanitize_summary("  a\n\n b\tc  "), "a b c");
        assert_eq!(sanitize_summary("\n\n"), "");
        let long = "é".repeat(400);
        assert_eq!(sanitize_summary(&long).chars().count(), MAX_SUMMARY_CHARS);
    }

    #[tokio::test]
    async fn second_call_for_same_item_hits_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let enricher = CachingEnricher::new(
            CountingProvider {
                calls: calls.clone(),
                reply: " A short\nsummary. ",
            },
            tmp.path().to_path_buf(),
            10,
        );
        let it = item("5", "body");
        assert_eq!(enricher.enrich(&it).await.unwrap(), "A short summary.");
        assert_eq!(enricher.enrich(&it).await.unwrap(), "A short summary.");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn daily_limit_blocks_real_calls_only() {
        let tmp = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let enricher = CachingEnricher::new(
            CountingProvider {
                calls: calls.clone(),
                reply: "ok",
            },
            tmp.path().to_path_buf(),
            1,
        );
        enricher.enrich(&item("1", "a")).await.unwrap();
        assert!(enricher.enrich(&item("2", "b")).await.is_err());
        // cached item still served after the limit is hit
        assert_eq!(enricher.enrich(&item("1", "a")).await.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_model_output_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let enricher = CachingEnricher::new(
            CountingProvider {
                calls: Arc::new(AtomicUsize::new(0)),
                reply: "   ",
            },
            tmp.path().to_path_buf(),
            10,
        );
        assert!(enricher.enrich(&item("1", "a")).await.is_err());
    }
}

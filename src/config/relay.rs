// src/config/relay.rs
use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cursor::FileCursorStore;
use crate::enrich::{CachingEnricher, DynEnricher, GeminiProvider, MockProvider, OpenAiProvider};
use crate::ingest::config::load_sources_default;
use crate::ingest::providers::statuses::{StatusesProvider, DEFAULT_USER_AGENT};
use crate::notify::bluesky::BlueskyPublisher;
use crate::notify::log::LogSink;
use crate::notify::slack::SlackNotifier;
use crate::notify::{NotificationSink, PrimarySink};
use crate::relay::{Relay, RelaySettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichProviderKind {
    Gemini,
    OpenAi,
    Mock,
}

impl EnrichProviderKind {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            other => bail!("unsupported ENRICH_PROVIDER: {other}"),
        }
    }
}

/// Everything one process needs, read from the environment at start-up.
#[derive(Clone)]
pub struct RelayConfig {
    pub sources: Vec<String>,
    pub feed_base_url: String,
    pub feed_user_agent: String,
    pub feed_timeout_secs: u64,
    pub cursor_store_path: PathBuf,
    pub commit_checkpoints: bool,
    pub interval_secs: u64,
    pub max_post_chars: usize,
    pub dry_run: bool,
    pub bluesky_service: String,
    pub bluesky_username: Option<String>,
    pub bluesky_password: Option<String>,
    pub slack_url: Option<String>,
    pub enrich_provider: EnrichProviderKind,
    pub enrich_api_key: Option<String>,
    pub enrich_model: Option<String>,
    pub enrich_daily_limit: u32,
    pub enrich_cache_dir: PathBuf,
}

impl std::fmt::Debug for RelayConfig {
    // Secrets stay out of logs: only presence is shown.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("sources", &self.sources)
            .field("feed_base_url", &self.feed_base_url)
            .field("cursor_store_path", &self.cursor_store_path)
            .field("commit_checkpoints", &self.commit_checkpoints)
            .field("interval_secs", &self.interval_secs)
            .field("max_post_chars", &self.max_post_chars)
            .field("dry_run", &self.dry_run)
            .field("bluesky_username", &self.bluesky_username)
            .field("bluesky_password", &self.bluesky_password.as_ref().map(|_| "***"))
            .field("slack_url", &self.slack_url.as_ref().map(|_| "***"))
            .field("enrich_provider", &self.enrich_provider)
            .field("enrich_api_key", &self.enrich_api_key.as_ref().map(|_| "***"))
            .field("enrich_model", &self.enrich_model)
            .finish_non_exhaustive()
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_opt(key) {
        Some(v) => v
            .parse()
            .map_err(|_| anyhow!("{key} has an invalid value: {v}")),
        None => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env_opt(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("{key} must be a boolean, got {v}"),
        },
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self> {
        let enrich_provider = EnrichProviderKind::parse(&env_or("ENRICH_PROVIDER", "gemini"))?;
        let enrich_api_key = match enrich_provider {
            EnrichProviderKind::Gemini => env_opt("GEMINI_API_KEY"),
            EnrichProviderKind::OpenAi => env_opt("OPENAI_API_KEY"),
            EnrichProviderKind::Mock => None,
        };

        let cfg = Self {
            sources: load_sources_default()?,
            feed_base_url: env_or("FEED_BASE_URL", "https://truthsocial.com"),
            feed_user_agent: env_or("FEED_USER_AGENT", DEFAULT_USER_AGENT),
            feed_timeout_secs: env_parse("FEED_TIMEOUT_SECS", 20)?,
            cursor_store_path: PathBuf::from(env_or("CURSOR_STORE_PATH", "state/cursors.json")),
            commit_checkpoints: env_bool("RELAY_COMMIT_CHECKPOINTS", true)?,
            interval_secs: env_parse("RELAY_INTERVAL_SECS", 300)?,
            max_post_chars: env_parse("POST_MAX_CHARS", 300)?,
            dry_run: env_bool("RELAY_DRY_RUN", false)?,
            bluesky_service: env_or("BLUESKY_SERVICE", "https://bsky.social"),
            bluesky_username: env_opt("BLUESKY_USERNAME"),
            bluesky_password: env_opt("BLUESKY_PASSWORD"),
            slack_url: env_opt("SLACK_URL"),
            enrich_provider,
            enrich_api_key,
            enrich_model: env_opt("ENRICH_MODEL"),
            enrich_daily_limit: env_parse("ENRICH_DAILY_LIMIT", 200)?,
            enrich_cache_dir: PathBuf::from(env_or("ENRICH_CACHE_DIR", "cache/enrich")),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("no sources configured (RELAY_SOURCES or config/sources.toml)");
        }
        if self.interval_secs == 0 {
            bail!("RELAY_INTERVAL_SECS must be positive");
        }
        if self.enrich_provider != EnrichProviderKind::Mock && self.enrich_api_key.is_none() {
            bail!("missing API key for {:?} enrichment", self.enrich_provider);
        }
        if !self.dry_run {
            if self.bluesky_username.is_none() || self.bluesky_password.is_none() {
                bail!("BLUESKY_USERNAME and BLUESKY_PASSWORD are required unless RELAY_DRY_RUN=1");
            }
            if self.slack_url.is_none() {
                bail!("SLACK_URL is required unless RELAY_DRY_RUN=1");
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> RelaySettings {
        RelaySettings {
            commit_checkpoints: self.commit_checkpoints,
            max_post_chars: self.max_post_chars,
        }
    }

    fn build_enricher(&self) -> Result<DynEnricher> {
        let key = || {
            self.enrich_api_key
                .clone()
                .context("enrichment API key missing")
        };
        let model = self.enrich_model.as_deref();
        let dir = self.enrich_cache_dir.clone();
        let limit = self.enrich_daily_limit;
        Ok(match self.enrich_provider {
            EnrichProviderKind::Gemini => Arc::new(CachingEnricher::new(
                GeminiProvider::new(key()?, model)?,
                dir,
                limit,
            )),
            EnrichProviderKind::OpenAi => Arc::new(CachingEnricher::new(
                OpenAiProvider::new(key()?, model)?,
                dir,
                limit,
            )),
            EnrichProviderKind::Mock => Arc::new(CachingEnricher::new(
                MockProvider {
                    fixed: "Mock summary of the post.".to_string(),
                },
                dir,
                limit,
            )),
        })
    }

    /// Construct the long-lived collaborators once; the relay reuses them on every run.
    pub fn build_relay(&self) -> Result<Relay> {
        let provider = Arc::new(StatusesProvider::from_url(
            &self.feed_base_url,
            &self.feed_user_agent,
            self.feed_timeout_secs,
        )?);
        let store = Arc::new(FileCursorStore::new(self.cursor_store_path.clone()));

        let (primary, notifier): (Arc<dyn PrimarySink>, Arc<dyn NotificationSink>) =
            if self.dry_run {
                (Arc::new(LogSink), Arc::new(LogSink))
            } else {
                let user = self.bluesky_username.clone().context("BLUESKY_USERNAME")?;
                let pass = self.bluesky_password.clone().context("BLUESKY_PASSWORD")?;
                let slack = self.slack_url.clone().context("SLACK_URL")?;
                (
                    Arc::new(BlueskyPublisher::new(&self.bluesky_service, user, pass)?),
                    Arc::new(SlackNotifier::new(slack)),
                )
            };

        Ok(Relay::new(
            self.sources.clone(),
            provider,
            store,
            self.build_enricher()?,
            primary,
            notifier,
        )
        .with_settings(self.settings()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    const KEYS: &[&str] = &[
        "RELAY_SOURCES",
        "RELAY_SOURCES_PATH",
        "RELAY_COMMIT_CHECKPOINTS",
        "RELAY_DRY_RUN",
        "RELAY_INTERVAL_SECS",
        "ENRICH_PROVIDER",
        "GEMINI_API_KEY",
        "BLUESKY_USERNAME",
        "BLUESKY_PASSWORD",
        "SLACK_URL",
        "POST_MAX_CHARS",
        "ENRICH_CACHE_DIR",
    ];

    fn clear() {
        for k in KEYS {
            env::remove_var(k);
        }
    }

    #[serial_test::serial]
    #[test]
    fn dry_run_with_mock_needs_only_sources() {
        clear();
        env::set_var("RELAY_SOURCES", "107780257626128497");
        env::set_var("RELAY_DRY_RUN", "1");
        env::set_var("ENRICH_PROVIDER", "mock");
        env::set_var("RELAY_COMMIT_CHECKPOINTS", "false");
        let tmp = tempfile::tempdir().unwrap();
        env::set_var("ENRICH_CACHE_DIR", tmp.path().display().to_string());

        let cfg = RelayConfig::from_env().unwrap();
        assert_eq!(cfg.sources, vec!["107780257626128497".to_string()]);
        assert!(!cfg.commit_checkpoints);
        assert_eq!(cfg.max_post_chars, 300);
        assert_eq!(cfg.interval_secs, 300);
        assert!(cfg.build_relay().is_ok());
        clear();
    }

    #[serial_test::serial]
    #[test]
    fn live_mode_requires_sink_credentials() {
        clear();
        env::set_var("RELAY_SOURCES", "1");
        env::set_var("GEMINI_API_KEY", "k");
        let err = RelayConfig::from_env().unwrap_err().to_string();
        assert!(err.contains("BLUESKY_USERNAME"), "{err}");

        env::set_var("BLUESKY_USERNAME", "relay.bsky.social");
        env::set_var("BLUESKY_PASSWORD", "app-password");
        env::set_var("SLACK_URL", "https://hooks.slack.test/x");
        let cfg = RelayConfig::from_env().unwrap();
        assert!(cfg.commit_checkpoints);
        assert!(!format!("{cfg:?}").contains("app-password"));
        clear();
    }

    #[serial_test::serial]
    #[test]
    fn bad_values_are_rejected() {
        clear();
        env::set_var("RELAY_SOURCES", "1");
        env::set_var("RELAY_DRY_RUN", "maybe");
        assert!(RelayConfig::from_env().is_err());
        env::set_var("RELAY_DRY_RUN", "1");
        env::set_var("ENRICH_PROVIDER", "claude");
        assert!(RelayConfig::from_env().is_err());
        env::set_var("ENRICH_PROVIDER", "mock");
        env::set_var("POST_MAX_CHARS", "lots");
        assert!(RelayConfig::from_env().is_err());
        clear();
    }
}

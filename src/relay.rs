//! Relay: fetch → normalize → select → (enrich → publish → notify → advance)* → commit.
//!
//! Sources are handled one after another and items strictly in queue order. The in-memory
//! cursor only moves after both sinks accepted an item, so a committed cursor always covers
//! exactly the delivered prefix of the queue.

use std::sync::Arc;

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use serde::Serialize;

use crate::cursor::CursorStore;
use crate::enrich::Enricher;
use crate::ingest::normalize::normalize;
use crate::ingest::select::select_new;
use crate::ingest::types::{FeedProvider, ItemId, NormalizedItem};
use crate::ingest::{ensure_metrics_described, fetch_batch};
use crate::notify::{compose_post, Notice, NotificationSink, PrimarySink};

#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    /// When false the final cursor is computed and reported but never written.
    pub commit_checkpoints: bool,
    pub max_post_chars: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            commit_checkpoints: true,
            max_post_chars: 300,
        }
    }
}

/// Step of the per-item delivery that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Enrich,
    Primary,
    Notify,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::Enrich => "enrich",
            Stage::Primary => "primary",
            Stage::Notify => "notify",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    /// Queue was empty; the store was not written.
    NoNewItems,
    Completed {
        delivered: usize,
        cursor: String,
    },
    /// Stopped at `failed_id`; `cursor` is the last fully delivered id, if any.
    Partial {
        delivered: usize,
        cursor: Option<String>,
        failed_id: String,
        stage: Stage,
        error: String,
    },
    /// Feed unreachable or malformed; treated as zero items.
    FetchFailed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: String,
    /// Whether a cursor write happened for this source.
    pub committed: bool,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

struct DeliveryRun {
    delivered: usize,
    reached: Option<ItemId>,
    failure: Option<(String, Stage, String)>,
}

pub struct Relay {
    sources: Vec<String>,
    provider: Arc<dyn FeedProvider>,
    store: Arc<dyn CursorStore>,
    enricher: Arc<dyn Enricher>,
    primary: Arc<dyn PrimarySink>,
    notifier: Arc<dyn NotificationSink>,
    settings: RelaySettings,
}

impl Relay {
    pub fn new(
        sources: Vec<String>,
        provider: Arc<dyn FeedProvider>,
        store: Arc<dyn CursorStore>,
        enricher: Arc<dyn Enricher>,
        primary: Arc<dyn PrimarySink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            sources,
            provider,
            store,
            enricher,
            primary,
            notifier,
            settings: RelaySettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RelaySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// One invocation over every configured source.
    ///
    /// Feed, enrichment and delivery failures end up in the per-source report; only cursor
    /// store failures abort the invocation with `Err`.
    pub async fn run_once(&self) -> Result<Vec<SourceReport>> {
        ensure_metrics_described();
        counter!("relay_runs_total").increment(1);

        let mut reports = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let report = self.run_source(source).await.map_err(|e| {
                tracing::error!(error = ?e, source = %source, "cursor store failure, aborting run");
                e
            })?;
            reports.push(report);
        }

        gauge!("relay_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        Ok(reports)
    }

    pub async fn run_source(&self, source: &str) -> Result<SourceReport> {
        let cursor = self
            .store
            .get(source)
            .await
            .with_context(|| format!("reading cursor for {source}"))?;

        let raw = match fetch_batch(self.provider.as_ref(), source).await {
            Ok(raw) => raw,
            Err(e) => {
                return Ok(SourceReport {
                    source: source.to_string(),
                    committed: false,
                    outcome: SourceOutcome::FetchFailed {
                        error: format!("{e:#}"),
                    },
                })
            }
        };

        let batch: Vec<NormalizedItem> = raw.iter().map(normalize).collect();
        let queue = select_new(batch, &cursor);
        counter!("relay_items_selected_total").increment(queue.len() as u64);
        if queue.is_empty() {
            tracing::info!(source, cursor = %cursor, "no new items");
            return Ok(SourceReport {
                source: source.to_string(),
                committed: false,
                outcome: SourceOutcome::NoNewItems,
            });
        }
        tracing::info!(source, cursor = %cursor, queued = queue.len(), "processing new items");

        let run = self.deliver_queue(source, &queue).await;
        let committed = self.commit(source, run.reached.as_ref()).await?;

        let outcome = match run.failure {
            None => SourceOutcome::Completed {
                delivered: run.delivered,
                cursor: run
                    .reached
                    .as_ref()
                    .map_or_else(|| cursor.to_string(), ItemId::to_string),
            },
            Some((failed_id, stage, error)) => SourceOutcome::Partial {
                delivered: run.delivered,
                cursor: run.reached.as_ref().map(ItemId::to_string),
                failed_id,
                stage,
                error,
            },
        };
        Ok(SourceReport {
            source: source.to_string(),
            committed,
            outcome,
        })
    }

    /// Deliver items in order until the first failure.
    async fn deliver_queue(&self, source: &str, queue: &[NormalizedItem]) -> DeliveryRun {
        let mut run = DeliveryRun {
            delivered: 0,
            reached: None,
            failure: None,
        };

        for item in queue {
            let Some(id) = item.item_id() else {
                // select_new only yields numeric ids
                continue;
            };
            if let Err((stage, e)) = self.deliver_one(source, item).await {
                tracing::warn!(
                    source,
                    item_id = %item.id,
                    stage = stage.as_str(),
                    error = ?e,
                    remaining = queue.len() - run.delivered,
                    "delivery aborted, remaining items stay queued"
                );
                counter!("relay_delivery_failures_total", "stage" => stage.as_str()).increment(1);
                run.failure = Some((item.id.clone(), stage, format!("{e:#}")));
                break;
            }
            counter!("relay_items_delivered_total").increment(1);
            tracing::info!(source, item_id = %id, "item delivered");
            run.delivered += 1;
            run.reached = Some(id);
        }
        run
    }

    async fn deliver_one(
        &self,
        source: &str,
        item: &NormalizedItem,
    ) -> std::result::Result<(), (Stage, anyhow::Error)> {
        let summary = self
            .enricher
            .enrich(item)
            .await
            .map_err(|e| (Stage::Enrich, e))?;

        let post = compose_post(&summary, &item.url, self.settings.max_post_chars);
        self.primary
            .publish(&post)
            .await
            .map_err(|e| (Stage::Primary, e))?;

        let notice = Notice::for_item(source, item, &summary);
        self.notifier
            .notify(&notice)
            .await
            .map_err(|e| (Stage::Notify, e))?;
        Ok(())
    }

    /// Write the reached cursor. No write when nothing advanced or checkpoints are disabled.
    async fn commit(&self, source: &str, reached: Option<&ItemId>) -> Result<bool> {
        let Some(value) = reached else {
            return Ok(false);
        };
        if !self.settings.commit_checkpoints {
            tracing::info!(source, cursor = %value, "checkpoint disabled, cursor not written");
            return Ok(false);
        }
        self.store
            .set(source, value)
            .await
            .with_context(|| format!("writing cursor {value} for {source}"))?;
        counter!("relay_cursor_commits_total").increment(1);
        tracing::info!(source, cursor = %value, "cursor committed");
        Ok(true)
    }
}

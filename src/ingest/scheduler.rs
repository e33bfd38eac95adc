// src/ingest/scheduler.rs
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::relay::{Relay, SourceReport};

#[derive(Clone, Copy, Debug)]
pub struct RelaySchedulerCfg {
    pub interval_secs: u64,
}

/// Keeps invocations of one process from overlapping.
///
/// This sits in front of the relay, not inside it: the relay itself takes no locks and
/// assumes whoever triggers it does not run two invocations at once.
#[derive(Default)]
pub struct RunGate {
    lock: Mutex<()>,
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when another invocation is still in flight.
    pub async fn try_run(&self, relay: &Relay) -> Option<Result<Vec<SourceReport>>> {
        let _guard = self.lock.try_lock().ok()?;
        Some(relay.run_once().await)
    }
}

/// Log one invocation's reports at the level its outcome deserves.
pub fn log_reports(reports: &[SourceReport]) {
    for r in reports {
        tracing::info!(
            target: "relay",
            source = %r.source,
            committed = r.committed,
            outcome = ?r.outcome,
            "source finished"
        );
    }
}

/// Spawn the fixed-period trigger. Ticks that find a run in flight are skipped.
pub fn spawn_scheduler(
    cfg: RelaySchedulerCfg,
    relay: Arc<Relay>,
    gate: Arc<RunGate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(cfg.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match gate.try_run(&relay).await {
                None => tracing::warn!(target: "relay", "previous run still in flight, tick skipped"),
                Some(Ok(reports)) => log_reports(&reports),
                Some(Err(e)) => tracing::error!(target: "relay", error = ?e, "run failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::MemoryCursorStore;
    use crate::enrich::{CachingEnricher, MockProvider};
    use crate::ingest::providers::statuses::StatusesProvider;
    use crate::notify::log::LogSink;

    fn relay(cache: &std::path::Path) -> Relay {
        let enricher = CachingEnricher::new(
            MockProvider {
                fixed: "summary".into(),
            },
            cache.to_path_buf(),
            10,
        );
        Relay::new(
            vec!["1".into()],
            Arc::new(StatusesProvider::from_fixture_str(r#"[{"id":"5","url":"u"}]"#)),
            Arc::new(MemoryCursorStore::new()),
            Arc::new(enricher),
            Arc::new(LogSink),
            Arc::new(LogSink),
        )
    }

    #[tokio::test]
    async fn gate_skips_while_a_run_is_in_flight() {
        let tmp = tempfile::tempdir().unwrap();
        let relay = relay(tmp.path());
        let gate = RunGate::new();

        {
            let _held = gate.lock.try_lock().unwrap();
            assert!(gate.try_run(&relay).await.is_none());
        }

        let reports = gate.try_run(&relay).await.expect("gate free").unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].committed);
    }
}

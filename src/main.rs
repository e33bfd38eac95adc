//! Feed relay service entrypoint.
//! Runs the relay on a fixed period and serves `/health`, `/run` and `/metrics`.

use std::sync::Arc;

use feed_relay::api::{self, AppState};
use feed_relay::ingest::scheduler::{spawn_scheduler, RelaySchedulerCfg, RunGate};
use feed_relay::metrics::Metrics;
use feed_relay::RelayConfig;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default, JSON lines with `RELAY_LOG_JSON=1`.
/// The runtime may already have a subscriber installed; that one wins.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feed_relay=info,warn"));
    let json = std::env::var("RELAY_LOG_JSON").is_ok_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = RelayConfig::from_env()?;
    tracing::info!(config = ?cfg, "relay configured");

    let relay = Arc::new(cfg.build_relay()?);
    let gate = Arc::new(RunGate::new());

    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = ?e, "metrics disabled");
            None
        }
    };

    spawn_scheduler(
        RelaySchedulerCfg {
            interval_secs: cfg.interval_secs,
        },
        relay.clone(),
        gate.clone(),
    );

    let router = api::router(AppState { relay, gate }, metrics.as_ref());
    Ok(router.into())
}

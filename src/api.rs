use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::ingest::scheduler::{log_reports, RunGate};
use crate::metrics::Metrics;
use crate::relay::Relay;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub gate: Arc<RunGate>,
}

/// `GET /health`, `GET /sources`, `POST /run`, plus `/metrics` when a recorder is installed.
pub fn router(state: AppState, metrics: Option<&Metrics>) -> Router {
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/sources", get(list_sources))
        .route("/run", post(run_now))
        .with_state(state);
    match metrics {
        Some(m) => app.merge(m.router()),
        None => app,
    }
}

async fn list_sources(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "sources": state.relay.sources() }))
}

/// Manual trigger sharing the scheduler's gate.
async fn run_now(State(state): State<AppState>) -> Response {
    match state.gate.try_run(&state.relay).await {
        None => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "a run is already in progress" })),
        )
            .into_response(),
        Some(Ok(reports)) => {
            log_reports(&reports);
            Json(json!({ "sources": reports })).into_response()
        }
        Some(Err(e)) => {
            tracing::error!(error = ?e, "manual run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("{e:#}") })),
            )
                .into_response()
        }
    }
}

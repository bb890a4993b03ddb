use crate::state::{AppState, ServicePhase};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use facegate_core::IngestState;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// `GET /health`: process is up.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /ready`: 200 only once the initial index is published.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let phase = state.phase();
    let ready = phase == ServicePhase::IndexReady;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "ready": ready, "phase": phase.to_string() })))
}

#[derive(Debug, Serialize)]
pub struct LabelStatus {
    pub label: String,
    pub embeddings: usize,
    pub samples: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub phase: String,
    /// Absent until models are loaded.
    pub ingest_state: Option<IngestState>,
    pub index_version: u64,
    pub dimension: usize,
    pub threshold: f32,
    pub store: String,
    pub labels: Vec<LabelStatus>,
}

/// `GET /api/status`
pub async fn service_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let index = state.index.current();
    let labels = index
        .entries
        .values()
        .map(|set| LabelStatus {
            label: set.label.clone(),
            embeddings: set.embeddings.len(),
            samples: set.samples_seen,
            skipped: set.samples_skipped,
        })
        .collect();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        phase: state.phase().to_string(),
        ingest_state: state.services().map(|s| s.coordinator.state()),
        index_version: index.version,
        dimension: index.dimension,
        threshold: state.threshold,
        store: state.store.describe(),
        labels,
    })
}

//! HTTP server for the ingester service.
//!
//! Provides endpoints for:
//! - `POST /ingest` - Ingest an uploaded archive file by id
//! - `GET /status` - Get active/recent ingestions
//! - `GET /health` - Health check

use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use ingestion::{IngestOutcome, IngestStage, Ingester};

/// Shared state for the HTTP server.
pub struct ServerState {
    /// Core ingestion pipeline
    pub ingester: Ingester,
    /// Tracking for active/completed ingestions
    pub tracker: IngestionTracker,
}

/// Request body for /ingest endpoint.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    /// Id of the uploaded archive file to ingest
    pub file_id: Uuid,
    /// Replace an existing measurement instead of updating it in place
    #[serde(default)]
    pub overwrite: bool,
}

/// Response body for /ingest endpoint.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub file_id: Uuid,
    /// Last pipeline stage reached.
    pub stage: IngestStage,
    pub subject_id: Option<Uuid>,
    pub measurement_id: Option<Uuid>,
    pub error_message: Option<String>,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            success: outcome.success,
            file_id: outcome.file_id,
            stage: outcome.stage,
            subject_id: outcome.subject_id,
            measurement_id: outcome.measurement_id,
            error_message: outcome.error_message,
        }
    }
}

/// Tracking for ingestion operations.
pub struct IngestionTracker {
    active: Mutex<HashMap<Uuid, ActiveIngestion>>,
    completed: Mutex<VecDeque<CompletedIngestion>>,
    max_completed: usize,
}

/// An active ingestion operation.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveIngestion {
    pub id: Uuid,
    pub file_id: Uuid,
    pub overwrite: bool,
    pub started_at: DateTime<Utc>,
    pub status: String,
}

/// A completed ingestion operation.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedIngestion {
    pub id: Uuid,
    pub file_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub stage: IngestStage,
    pub measurement_id: Option<Uuid>,
    pub error_message: Option<String>,
}

impl IngestionTracker {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            completed: Mutex::new(VecDeque::new()),
            max_completed: 100,
        }
    }

    pub async fn start(&self, id: Uuid, file_id: Uuid, overwrite: bool) {
        let ingestion = ActiveIngestion {
            id,
            file_id,
            overwrite,
            started_at: Utc::now(),
            status: "processing".to_string(),
        };
        self.active.lock().await.insert(id, ingestion);
    }

    pub async fn complete(&self, id: Uuid, outcome: &IngestOutcome) {
        let mut active = self.active.lock().await;
        if let Some(ingestion) = active.remove(&id) {
            let completed_at = Utc::now();
            let duration_ms = (completed_at - ingestion.started_at).num_milliseconds() as u64;

            let completed = CompletedIngestion {
                id,
                file_id: ingestion.file_id,
                started_at: ingestion.started_at,
                completed_at,
                duration_ms,
                success: outcome.success,
                stage: outcome.stage,
                measurement_id: outcome.measurement_id,
                error_message: outcome.error_message.clone(),
            };

            let mut completed_list = self.completed.lock().await;
            completed_list.push_front(completed);

            // Keep only recent entries
            while completed_list.len() > self.max_completed {
                completed_list.pop_back();
            }
        }
    }

    pub async fn get_status(&self) -> StatusResponse {
        let active = self.active.lock().await;
        let completed = self.completed.lock().await;

        StatusResponse {
            active: active.values().cloned().collect(),
            recent: completed.iter().take(20).cloned().collect(),
            total_completed: completed.len(),
        }
    }
}

/// Response for /status endpoint.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub active: Vec<ActiveIngestion>,
    pub recent: Vec<CompletedIngestion>,
    pub total_completed: usize,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// POST /ingest - Ingest an archive file
async fn ingest_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Json(request): Json<IngestRequest>,
) -> impl IntoResponse {
    let id = Uuid::new_v4();

    info!(
        id = %id,
        file_id = %request.file_id,
        overwrite = request.overwrite,
        "received ingest request"
    );

    state.tracker.start(id, request.file_id, request.overwrite).await;

    let outcome = state.ingester.ingest(request.file_id, request.overwrite).await;
    state.tracker.complete(id, &outcome).await;

    let code = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (code, Json(IngestResponse::from(outcome)))
}

/// GET /status - Get ingestion status
async fn status_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    let status = state.tracker.get_status().await;
    Json(status)
}

/// GET /health - Health check
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "ingester".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Build the HTTP router.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/ingest", post(ingest_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(Extension(state))
}

/// Start the HTTP server.
pub async fn start_server(state: Arc<ServerState>, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port = port, "starting ingester HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(success: bool) -> IngestOutcome {
        IngestOutcome {
            file_id: Uuid::new_v4(),
            success,
            stage: if success {
                IngestStage::Persisted
            } else {
                IngestStage::Validated
            },
            subject_id: success.then(Uuid::new_v4),
            measurement_id: success.then(Uuid::new_v4),
            error_message: (!success).then(|| "mandatory documents missing".to_string()),
        }
    }

    #[tokio::test]
    async fn tracker_moves_completed_entries_off_the_active_list() {
        let tracker = IngestionTracker::new();
        let id = Uuid::new_v4();
        let done = outcome(true);

        tracker.start(id, done.file_id, false).await;
        assert_eq!(tracker.get_status().await.active.len(), 1);

        tracker.complete(id, &done).await;
        let status = tracker.get_status().await;
        assert!(status.active.is_empty());
        assert_eq!(status.recent.len(), 1);
        assert_eq!(status.recent[0].file_id, done.file_id);
        assert!(status.recent[0].success);
    }

    #[tokio::test]
    async fn tracker_caps_recent_history() {
        let tracker = IngestionTracker::new();
        for _ in 0..105 {
            let id = Uuid::new_v4();
            let done = outcome(true);
            tracker.start(id, done.file_id, false).await;
            tracker.complete(id, &done).await;
        }

        let status = tracker.get_status().await;
        assert_eq!(status.total_completed, 100);
        assert_eq!(status.recent.len(), 20);
    }

    #[tokio::test]
    async fn tracker_keeps_newest_first() {
        let tracker = IngestionTracker::new();
        let first = outcome(true);
        let second = outcome(false);

        let id = Uuid::new_v4();
        tracker.start(id, first.file_id, false).await;
        tracker.complete(id, &first).await;

        let id = Uuid::new_v4();
        tracker.start(id, second.file_id, true).await;
        tracker.complete(id, &second).await;

        let status = tracker.get_status().await;
        assert_eq!(status.recent[0].file_id, second.file_id);
        assert_eq!(status.recent[1].file_id, first.file_id);
    }

    #[test]
    fn response_mirrors_the_outcome() {
        let failed = outcome(false);
        let response = IngestResponse::from(failed.clone());
        assert!(!response.success);
        assert_eq!(response.file_id, failed.file_id);
        assert_eq!(response.stage, IngestStage::Validated);
        assert_eq!(
            response.error_message.as_deref(),
            Some("mandatory documents missing")
        );
    }
}

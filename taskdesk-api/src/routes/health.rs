/// Health check endpoint
///
/// Reports whether the server is up and whether the storage backend
/// answers.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "storage": "connected"
/// }
/// ```
///
/// Returns 503 with `"status": "degraded"` when storage is unreachable.

use crate::app::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Application version
    pub version: String,

    /// Storage status
    pub storage: String,
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, storage) = match state.tasks.ping().await {
        Ok(()) => (StatusCode::OK, "healthy", "connected"),
        Err(e) => {
            tracing::warn!(error = %e, "Storage health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "disconnected")
        }
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: taskdesk_shared::VERSION.to_string(),
            storage: storage.to_string(),
        }),
    )
}

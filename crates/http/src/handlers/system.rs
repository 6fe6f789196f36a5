use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use voiceplan_storage::traits::HealthStore;

use crate::AppState;
use crate::response_types::{ReadinessResponse, VersionResponse};

pub async fn health() -> &'static str {
    "ok"
}

/// Ready once the storage backend answers a ping.
pub async fn readiness(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let backend = state.storage.backend_name();
    match state.storage.ping().await {
        Ok(()) => (StatusCode::OK, Json(ReadinessResponse { status: "ready", backend, message: None })),
        Err(e) => {
            tracing::warn!(backend, error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "unavailable",
                    backend,
                    message: Some("storage backend unreachable".to_owned()),
                }),
            )
        },
    }
}

pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse { version: env!("CARGO_PKG_VERSION") })
}

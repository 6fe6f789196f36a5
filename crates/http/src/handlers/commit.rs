use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use uuid::Uuid;
use voiceplan_core::{AuditEntry, CommitOptions, CommitOutcome, RollbackOutcome};

use crate::AppState;
use crate::api_error::ApiError;
use crate::identity::Identity;

pub async fn commit_plan(
    State(state): State<Arc<AppState>>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
    Json(options): Json<CommitOptions>,
) -> Result<Json<CommitOutcome>, ApiError> {
    Ok(Json(state.commits.commit(&actor, id, options).await?))
}

pub async fn rollback_plan(
    State(state): State<Arc<AppState>>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<RollbackOutcome>, ApiError> {
    Ok(Json(state.commits.rollback(&actor, id).await?))
}

pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    Ok(Json(state.commits.list_audit(&actor, id).await?))
}

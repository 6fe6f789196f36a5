use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use uuid::Uuid;
use voiceplan_core::VoiceSession;

use crate::AppState;
use crate::api_error::ApiError;
use crate::identity::Identity;
use crate::query_types::{CreateSessionRequest, ListSessionsQuery};

/// Body is optional; an empty body creates an English session.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Identity(actor): Identity,
    body: Bytes,
) -> Result<(StatusCode, Json<VoiceSession>), ApiError> {
    let request: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?
    };
    let session = state.sessions.create_session(&actor, request.language.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Identity(actor): Identity,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<VoiceSession>>, ApiError> {
    Ok(Json(state.sessions.list_sessions(&actor, query.limit).await?))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<VoiceSession>, ApiError> {
    Ok(Json(state.sessions.get_session(&actor, id).await?))
}

pub async fn start_capture(
    State(state): State<Arc<AppState>>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<VoiceSession>, ApiError> {
    Ok(Json(state.sessions.start_capture(&actor, id).await?))
}

pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<VoiceSession>, ApiError> {
    Ok(Json(state.sessions.cancel_session(&actor, id).await?))
}

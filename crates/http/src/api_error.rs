//! Typed API error for HTTP handlers.
//!
//! Converts service errors into HTTP responses with a JSON body
//! `{"error": message, "code": CODE}` and a matching status code.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use voiceplan_service::ServiceError;

/// API error with HTTP status code and human-readable message.
///
/// Use via `Result<Json<T>, ApiError>` in handlers. `Internal` and storage
/// failures log the real error server-side and return a static message.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request: malformed body, form or query.
    BadRequest(String),
    /// 401 Unauthorized: identity headers missing or malformed.
    Unauthorized(String),
    Service(ServiceError),
    /// 500 Internal Server Error. Details logged, not exposed.
    Internal(anyhow::Error),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Service(err) => service_status(err),
        }
    }
}

fn service_status(err: &ServiceError) -> StatusCode {
    if err.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    match err {
        ServiceError::FeatureDisabled(_) => StatusCode::FORBIDDEN,
        ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ServiceError::InvalidState(_) | ServiceError::Conflict(_) => StatusCode::CONFLICT,
        ServiceError::Storage(e) if e.is_duplicate() => StatusCode::CONFLICT,
        ServiceError::ValidationFailed { .. } | ServiceError::DryRunFailed(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        },
        ServiceError::TranscriptionFailed(_)
        | ServiceError::PlanGenerationFailed(_)
        | ServiceError::SpeechFailed(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Storage(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::CommitFailed(_) | ServiceError::Storage(_) | ServiceError::NotFound { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest(msg) => json!({"error": msg, "code": "BAD_REQUEST"}),
            Self::Unauthorized(msg) => json!({"error": msg, "code": "UNAUTHORIZED"}),
            Self::Internal(err) => {
                tracing::error!(error = ?err, "internal server error");
                json!({"error": "internal server error", "code": "INTERNAL"})
            },
            Self::Service(ServiceError::ValidationFailed { message, report }) => {
                json!({"error": message, "code": "VALIDATION_FAILED", "report": report})
            },
            Self::Service(err) => {
                let code = err.code();
                if matches!(err, ServiceError::Storage(_)) && !err.is_not_found() {
                    tracing::error!(error = %err, "storage error");
                    json!({"error": "storage unavailable", "code": code})
                } else {
                    if status.is_server_error() {
                        tracing::error!(code, error = %err, "request failed");
                    }
                    json!({"error": err.to_string(), "code": code})
                }
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

#[cfg(test)]
mod tests {
    use voiceplan_storage::StorageError;

    use super::*;

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (ServiceError::FeatureDisabled("voice_planning"), StatusCode::FORBIDDEN),
            (ServiceError::NotFound { entity: "voice session", id: "x".into() }, StatusCode::NOT_FOUND),
            (ServiceError::InvalidState("nope".into()), StatusCode::CONFLICT),
            (ServiceError::Conflict("twice".into()), StatusCode::CONFLICT),
            (ServiceError::DryRunFailed("no plan".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ServiceError::PlanGenerationFailed("down".into()), StatusCode::BAD_GATEWAY),
            (ServiceError::SpeechFailed("down".into()), StatusCode::BAD_GATEWAY),
            (ServiceError::CommitFailed("db".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ServiceError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (
                ServiceError::Storage(StorageError::NotFound { entity: "audit entry", id: "1".into() }),
                StatusCode::NOT_FOUND,
            ),
            (ServiceError::Storage(StorageError::Duplicate("row".into())), StatusCode::CONFLICT),
            (
                ServiceError::Storage(StorageError::Unavailable("pool closed".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn unauthorized_is_401() {
        assert_eq!(ApiError::Unauthorized("missing".into()).status(), StatusCode::UNAUTHORIZED);
    }
}

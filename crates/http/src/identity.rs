//! Caller identity from headers set by the upstream auth middleware.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;
use voiceplan_service::Actor;

use crate::api_error::ApiError;

pub const USER_HEADER: &str = "x-user-id";
pub const ORGANIZATION_HEADER: &str = "x-organization-id";

/// Extractor resolving the authenticated [`Actor`].
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Actor);

fn header_uuid(parts: &Parts, name: &str) -> Result<Uuid, ApiError> {
    let raw = parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))?;
    raw.to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("{name} must be a UUID")))
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_uuid(parts, USER_HEADER)?;
        let organization_id = header_uuid(parts, ORGANIZATION_HEADER)?;
        Ok(Self(Actor::new(user_id, organization_id)))
    }
}

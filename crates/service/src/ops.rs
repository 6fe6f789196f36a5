//! Operational tasks shared by the CLI and readiness probes.

use serde::Serialize;
use uuid::Uuid;
use voiceplan_core::{SessionStatus, VoiceSession};
use voiceplan_storage::traits::{HealthStore, SessionStore, UserStore};
use voiceplan_storage::{StorageBackend, UserRecord, normalize_email};

use crate::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmokeReport {
    pub backend: &'static str,
    pub ping: bool,
    pub session_round_trip: bool,
}

impl SmokeReport {
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.ping && self.session_round_trip
    }
}

/// Ping the backend, then write and read back a throwaway session.
///
/// The probe session is left in `failed` so it never shows up as live work.
pub async fn smoke_test(storage: &StorageBackend) -> Result<SmokeReport, ServiceError> {
    let backend = storage.backend_name();
    storage.ping().await?;
    tracing::info!(backend, "storage ping ok");

    let mut probe = VoiceSession::new(Uuid::nil(), Uuid::nil(), "en");
    probe.fail("smoke test probe")?;
    storage.save_session(&probe).await?;
    let session_round_trip = storage
        .get_session(probe.id)
        .await?
        .is_some_and(|s| s.id == probe.id && s.status == SessionStatus::Failed);
    if !session_round_trip {
        tracing::warn!(backend, session_id = %probe.id, "session round trip mismatch");
    }
    Ok(SmokeReport { backend, ping: true, session_round_trip })
}

/// Create or update a user row keyed by normalized email.
pub async fn provision_user(
    storage: &StorageBackend,
    email: &str,
    organization_id: Uuid,
    role: &str,
) -> Result<UserRecord, ServiceError> {
    let email = normalize_email(email);
    if !looks_like_email(&email) {
        return Err(ServiceError::InvalidInput(format!("not a valid email address: {email}")));
    }
    let role = role.trim();
    if role.is_empty() {
        return Err(ServiceError::InvalidInput("role must not be empty".to_owned()));
    }
    let user = storage.upsert_user(&email, organization_id, role).await?;
    tracing::info!(user_id = %user.id, email = %user.email, org = %organization_id, role, "user provisioned");
    Ok(user)
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;
use voiceplan_core::constants::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use voiceplan_core::{EventKind, FLAG_VOICE_PLANNING, FeatureGate, SessionStatus, VoiceSession};
use voiceplan_storage::StorageBackend;
use voiceplan_storage::traits::SessionStore;

use crate::events::EventEmitter;
use crate::{Actor, ServiceError};

pub(crate) const CANCELLED_MESSAGE: &str = "cancelled by user";

/// Fail fast when `flag` is off for the actor.
pub(crate) fn require_flag(
    flags: &dyn FeatureGate,
    flag: &'static str,
    actor: &Actor,
) -> Result<(), ServiceError> {
    if flags.is_enabled(flag, &actor.flag_context()) {
        Ok(())
    } else {
        tracing::debug!(flag, org = %actor.organization_id, "feature disabled");
        Err(ServiceError::FeatureDisabled(flag))
    }
}

/// Load a session owned by the actor's organization. Foreign sessions read as missing.
pub(crate) async fn load_session(
    storage: &StorageBackend,
    actor: &Actor,
    id: Uuid,
) -> Result<VoiceSession, ServiceError> {
    match storage.get_session(id).await? {
        Some(session) if session.organization_id == actor.organization_id => Ok(session),
        _ => Err(ServiceError::session_not_found(id)),
    }
}

pub struct SessionService {
    storage: Arc<StorageBackend>,
    flags: Arc<dyn FeatureGate>,
    events: Arc<EventEmitter>,
}

impl SessionService {
    #[must_use]
    pub fn new(
        storage: Arc<StorageBackend>,
        flags: Arc<dyn FeatureGate>,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self { storage, flags, events }
    }

    pub async fn create_session(
        &self,
        actor: &Actor,
        language: Option<&str>,
    ) -> Result<VoiceSession, ServiceError> {
        require_flag(self.flags.as_ref(), FLAG_VOICE_PLANNING, actor)?;
        let language = language.map(str::trim).filter(|l| !l.is_empty()).unwrap_or("en");
        let session = VoiceSession::new(actor.organization_id, actor.user_id, language);
        self.storage.save_session(&session).await?;
        self.events
            .chain(*actor, Some(session.id))
            .emit(EventKind::SessionCreated, json!({"language": session.language}));
        tracing::info!(session_id = %session.id, org = %actor.organization_id, "voice session created");
        Ok(session)
    }

    /// Move an idle session into `recording`.
    pub async fn start_capture(&self, actor: &Actor, id: Uuid) -> Result<VoiceSession, ServiceError> {
        require_flag(self.flags.as_ref(), FLAG_VOICE_PLANNING, actor)?;
        let mut session = load_session(&self.storage, actor, id).await?;
        let from = session.status;
        session.transition(SessionStatus::Recording)?;
        self.storage.save_session(&session).await?;
        self.events.chain(*actor, Some(id)).emit(
            EventKind::SessionStatusChanged,
            json!({"from": from, "to": session.status}),
        );
        Ok(session)
    }

    pub async fn get_session(&self, actor: &Actor, id: Uuid) -> Result<VoiceSession, ServiceError> {
        load_session(&self.storage, actor, id).await
    }

    pub async fn list_sessions(
        &self,
        actor: &Actor,
        limit: Option<usize>,
    ) -> Result<Vec<VoiceSession>, ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        Ok(self.storage.list_sessions(actor.organization_id, limit).await?)
    }

    /// Record the session as failed with a cancellation message.
    ///
    /// In-flight provider or database calls for the session are not interrupted;
    /// a running orchestration may still persist later stage results.
    pub async fn cancel_session(&self, actor: &Actor, id: Uuid) -> Result<VoiceSession, ServiceError> {
        require_flag(self.flags.as_ref(), FLAG_VOICE_PLANNING, actor)?;
        let mut session = load_session(&self.storage, actor, id).await?;
        let from = session.status;
        session.fail(CANCELLED_MESSAGE).map_err(|_| {
            ServiceError::InvalidState(format!("session in status {from} cannot be cancelled"))
        })?;
        self.storage.save_session(&session).await?;
        self.events.chain(*actor, Some(id)).emit(EventKind::SessionCancelled, json!({"from": from}));
        tracing::info!(session_id = %id, from = %from, "voice session cancelled");
        Ok(session)
    }
}

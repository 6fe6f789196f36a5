use async_trait::async_trait;
use uuid::Uuid;
use voiceplan_core::{CommitStatus, VoiceSession};

use crate::error::StorageError;

/// Voice session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session.
    async fn save_session(&self, session: &VoiceSession) -> Result<(), StorageError>;

    /// Get session by ID.
    async fn get_session(&self, id: Uuid) -> Result<Option<VoiceSession>, StorageError>;

    /// Most recent sessions of an organization, newest first.
    async fn list_sessions(
        &self,
        organization_id: Uuid,
        limit: usize,
    ) -> Result<Vec<VoiceSession>, StorageError>;

    /// Sessions with the given commit status across all organizations, oldest first.
    async fn list_sessions_by_commit_status(
        &self,
        status: CommitStatus,
        limit: usize,
    ) -> Result<Vec<VoiceSession>, StorageError>;
}

//! Unified storage backend with enum dispatch.

use async_trait::async_trait;
use uuid::Uuid;
use voiceplan_core::{AuditEntry, CommitCounts, CommitStatus, VoiceSession};

use crate::error::StorageError;
use crate::memory::MemoryStorage;
use crate::pg_storage::PgStorage;
use crate::rows::{CommittedPlan, PlanRows};
use crate::traits::{AuditStore, HealthStore, PlanStore, SessionStore, UserStore};
use crate::types::UserRecord;

macro_rules! dispatch {
    ($self:expr, $trait:path, $method:ident ( $($arg:expr),* $(,)? )) => {
        match $self {
            StorageBackend::Postgres(s) => <PgStorage as $trait>::$method(s, $($arg),*).await,
            StorageBackend::Memory(s) => <MemoryStorage as $trait>::$method(s, $($arg),*).await,
        }
    };
}

#[derive(Clone, Debug)]
pub enum StorageBackend {
    Postgres(PgStorage),
    Memory(MemoryStorage),
}

impl StorageBackend {
    pub async fn new_postgres(database_url: &str) -> Result<Self, StorageError> {
        Ok(Self::Postgres(PgStorage::new(database_url).await?))
    }

    #[must_use]
    pub fn new_memory() -> Self {
        Self::Memory(MemoryStorage::new())
    }

    /// PostgreSQL when a URL is configured, otherwise the in-memory backend.
    pub async fn from_database_url(database_url: Option<&str>) -> Result<Self, StorageError> {
        match database_url {
            Some(url) => Self::new_postgres(url).await,
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory storage (data is not persisted)");
                Ok(Self::new_memory())
            },
        }
    }
}

// ── SessionStore ─────────────────────────────────────────────────

#[async_trait]
impl SessionStore for StorageBackend {
    async fn save_session(&self, session: &VoiceSession) -> Result<(), StorageError> {
        dispatch!(self, SessionStore, save_session(session))
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<VoiceSession>, StorageError> {
        dispatch!(self, SessionStore, get_session(id))
    }

    async fn list_sessions(
        &self,
        organization_id: Uuid,
        limit: usize,
    ) -> Result<Vec<VoiceSession>, StorageError> {
        dispatch!(self, SessionStore, list_sessions(organization_id, limit))
    }

    async fn list_sessions_by_commit_status(
        &self,
        status: CommitStatus,
        limit: usize,
    ) -> Result<Vec<VoiceSession>, StorageError> {
        dispatch!(self, SessionStore, list_sessions_by_commit_status(status, limit))
    }
}

// ── PlanStore ────────────────────────────────────────────────────

#[async_trait]
impl PlanStore for StorageBackend {
    async fn commit_plan(&self, rows: PlanRows) -> Result<CommittedPlan, StorageError> {
        dispatch!(self, PlanStore, commit_plan(rows))
    }

    async fn rollback_plan(&self, session_id: Uuid) -> Result<CommitCounts, StorageError> {
        dispatch!(self, PlanStore, rollback_plan(session_id))
    }

    async fn count_plan_rows(&self, session_id: Uuid) -> Result<CommitCounts, StorageError> {
        dispatch!(self, PlanStore, count_plan_rows(session_id))
    }
}

// ── AuditStore ───────────────────────────────────────────────────

#[async_trait]
impl AuditStore for StorageBackend {
    async fn open_audit(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        dispatch!(self, AuditStore, open_audit(entry))
    }

    async fn close_audit(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        dispatch!(self, AuditStore, close_audit(entry))
    }

    async fn list_audit(&self, session_id: Uuid) -> Result<Vec<AuditEntry>, StorageError> {
        dispatch!(self, AuditStore, list_audit(session_id))
    }
}

// ── UserStore ────────────────────────────────────────────────────

#[async_trait]
impl UserStore for StorageBackend {
    async fn upsert_user(
        &self,
        email: &str,
        organization_id: Uuid,
        role: &str,
    ) -> Result<UserRecord, StorageError> {
        dispatch!(self, UserStore, upsert_user(email, organization_id, role))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StorageError> {
        dispatch!(self, UserStore, get_user_by_email(email))
    }
}

// ── HealthStore ──────────────────────────────────────────────────

#[async_trait]
impl HealthStore for StorageBackend {
    async fn ping(&self) -> Result<(), StorageError> {
        dispatch!(self, HealthStore, ping())
    }

    fn backend_name(&self) -> &'static str {
        match self {
            Self::Postgres(s) => s.backend_name(),
            Self::Memory(s) => s.backend_name(),
        }
    }
}

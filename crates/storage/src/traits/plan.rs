use async_trait::async_trait;
use uuid::Uuid;
use voiceplan_core::{AuditEntry, CommitCounts};

use crate::error::StorageError;
use crate::rows::{CommittedPlan, PlanRows};

/// Production plan tables: projects, milestones, tasks, dependencies.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Write every row in one all-or-nothing unit and mark them committed.
    async fn commit_plan(&self, rows: PlanRows) -> Result<CommittedPlan, StorageError>;

    /// Delete every row tied to the session, children before parents.
    async fn rollback_plan(&self, session_id: Uuid) -> Result<CommitCounts, StorageError>;

    /// Count rows currently tied to the session.
    async fn count_plan_rows(&self, session_id: Uuid) -> Result<CommitCounts, StorageError>;
}

/// Commit/rollback audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a freshly opened entry.
    async fn open_audit(&self, entry: &AuditEntry) -> Result<(), StorageError>;

    /// Persist the closed state (status, result, error, completion time).
    async fn close_audit(&self, entry: &AuditEntry) -> Result<(), StorageError>;

    /// Entries for a session, oldest first.
    async fn list_audit(&self, session_id: Uuid) -> Result<Vec<AuditEntry>, StorageError>;
}

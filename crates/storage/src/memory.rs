//! In-process storage backend.
//!
//! Single-node only. State lives behind one mutex; a plan commit stages all of
//! its rows and publishes them under a single lock acquisition, so readers
//! never observe a partial commit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;
use voiceplan_core::{AuditEntry, CommitCounts, CommitStatus, VoiceSession};

use crate::error::StorageError;
use crate::rows::{CommittedPlan, DependencyRow, MilestoneRow, PlanRows, ProjectRow, TaskRow};
use crate::traits::{AuditStore, HealthStore, PlanStore, SessionStore, UserStore};
use crate::types::{UserRecord, normalize_email};

#[derive(Debug, Default)]
struct MemoryState {
    sessions: HashMap<Uuid, VoiceSession>,
    projects: Vec<ProjectRow>,
    milestones: Vec<MilestoneRow>,
    tasks: Vec<TaskRow>,
    dependencies: Vec<DependencyRow>,
    audit: Vec<AuditEntry>,
    users: HashMap<String, UserRecord>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
    fail_commits: Arc<AtomicBool>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent plan commits fail before any row is published.
    pub fn set_commit_failure(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn newest_first(mut sessions: Vec<VoiceSession>, limit: usize) -> Vec<VoiceSession> {
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sessions.truncate(limit);
    sessions
}

#[async_trait]
impl SessionStore for MemoryStorage {
    async fn save_session(&self, session: &VoiceSession) -> Result<(), StorageError> {
        self.lock().sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<VoiceSession>, StorageError> {
        Ok(self.lock().sessions.get(&id).cloned())
    }

    async fn list_sessions(
        &self,
        organization_id: Uuid,
        limit: usize,
    ) -> Result<Vec<VoiceSession>, StorageError> {
        let matching = self
            .lock()
            .sessions
            .values()
            .filter(|s| s.organization_id == organization_id)
            .cloned()
            .collect();
        Ok(newest_first(matching, limit))
    }

    async fn list_sessions_by_commit_status(
        &self,
        status: CommitStatus,
        limit: usize,
    ) -> Result<Vec<VoiceSession>, StorageError> {
        let mut matching: Vec<VoiceSession> = self
            .lock()
            .sessions
            .values()
            .filter(|s| s.commit_status == Some(status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matching.truncate(limit);
        Ok(matching)
    }
}

#[async_trait]
impl PlanStore for MemoryStorage {
    async fn commit_plan(&self, mut rows: PlanRows) -> Result<CommittedPlan, StorageError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("commit rejected by fault injection".into()));
        }
        rows.mark_committed();
        let committed = CommittedPlan { project_id: rows.project.id, counts: rows.counts() };

        let mut state = self.lock();
        state.projects.push(rows.project);
        state.milestones.extend(rows.milestones);
        state.tasks.extend(rows.tasks);
        state.dependencies.extend(rows.dependencies);
        Ok(committed)
    }

    async fn rollback_plan(&self, session_id: Uuid) -> Result<CommitCounts, StorageError> {
        let mut state = self.lock();
        let before = count_rows(&state, session_id);
        state.dependencies.retain(|d| d.voice_session_id != session_id);
        state.tasks.retain(|t| t.provenance.voice_session_id != session_id);
        state.milestones.retain(|m| m.provenance.voice_session_id != session_id);
        state.projects.retain(|p| p.provenance.voice_session_id != session_id);
        Ok(before)
    }

    async fn count_plan_rows(&self, session_id: Uuid) -> Result<CommitCounts, StorageError> {
        Ok(count_rows(&self.lock(), session_id))
    }
}

fn count_rows(state: &MemoryState, session_id: Uuid) -> CommitCounts {
    CommitCounts {
        projects: state.projects.iter().filter(|p| p.provenance.voice_session_id == session_id).count(),
        milestones: state
            .milestones
            .iter()
            .filter(|m| m.provenance.voice_session_id == session_id)
            .count(),
        tasks: state.tasks.iter().filter(|t| t.provenance.voice_session_id == session_id).count(),
        dependencies: state.dependencies.iter().filter(|d| d.voice_session_id == session_id).count(),
    }
}

#[async_trait]
impl AuditStore for MemoryStorage {
    async fn open_audit(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        let mut state = self.lock();
        if state.audit.iter().any(|a| a.id == entry.id) {
            return Err(StorageError::Duplicate(format!("audit entry {}", entry.id)));
        }
        state.audit.push(entry.clone());
        Ok(())
    }

    async fn close_audit(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        let mut state = self.lock();
        let slot = state
            .audit
            .iter_mut()
            .find(|a| a.id == entry.id)
            .ok_or_else(|| StorageError::NotFound { entity: "audit entry", id: entry.id.to_string() })?;
        slot.clone_from(entry);
        Ok(())
    }

    async fn list_audit(&self, session_id: Uuid) -> Result<Vec<AuditEntry>, StorageError> {
        Ok(self.lock().audit.iter().filter(|a| a.session_id == session_id).cloned().collect())
    }
}

#[async_trait]
impl UserStore for MemoryStorage {
    async fn upsert_user(
        &self,
        email: &str,
        organization_id: Uuid,
        role: &str,
    ) -> Result<UserRecord, StorageError> {
        let key = normalize_email(email);
        let now = Utc::now();
        let mut state = self.lock();
        let record = state
            .users
            .entry(key.clone())
            .and_modify(|u| {
                u.organization_id = organization_id;
                role.clone_into(&mut u.role);
                u.updated_at = now;
            })
            .or_insert_with(|| UserRecord {
                id: Uuid::new_v4(),
                email: key,
                organization_id,
                role: role.to_owned(),
                created_at: now,
                updated_at: now,
            });
        Ok(record.clone())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StorageError> {
        Ok(self.lock().users.get(&normalize_email(email)).cloned())
    }
}

#[async_trait]
impl HealthStore for MemoryStorage {
    async fn ping(&self) -> Result<(), StorageError> {
        drop(self.lock());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

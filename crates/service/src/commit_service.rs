//! Voice plan commit: dry run, shadow and production modes, rollback and audit.
//!
//! Every shadow or production attempt opens an audit row before any
//! precondition is checked and closes it with the outcome, success or not.
//! Dry runs write nothing at all.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;
use voiceplan_core::{
    AuditEntry, AuditOperation, CommitCounts, CommitMode, CommitOptions, CommitOutcome,
    CommitStatus, EventKind, FLAG_VOICE_PLAN_COMMIT, FLAG_VOICE_PLAN_ROLLBACK,
    FLAG_VOICE_PLAN_SHADOW_MODE, FeatureGate, PlanDocument, RollbackOutcome, SessionStatus,
    ValidationContext, ValidationOptions, ValidationReport, VoiceSession, validate_plan,
};
use voiceplan_storage::traits::{AuditStore, PlanStore, SessionStore};
use voiceplan_storage::{PlanRows, StorageBackend};

use crate::events::{EventChain, EventEmitter};
use crate::session_service::{load_session, require_flag};
use crate::{Actor, ServiceError};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillFailure {
    pub session_id: Uuid,
    pub code: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillReport {
    pub examined: usize,
    pub committed: usize,
    pub failed: Vec<BackfillFailure>,
}

pub struct CommitService {
    storage: Arc<StorageBackend>,
    flags: Arc<dyn FeatureGate>,
    events: Arc<EventEmitter>,
}

impl CommitService {
    #[must_use]
    pub fn new(
        storage: Arc<StorageBackend>,
        flags: Arc<dyn FeatureGate>,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self { storage, flags, events }
    }

    pub async fn commit(
        &self,
        actor: &Actor,
        session_id: Uuid,
        options: CommitOptions,
    ) -> Result<CommitOutcome, ServiceError> {
        require_flag(self.flags.as_ref(), FLAG_VOICE_PLAN_COMMIT, actor)?;
        let session = load_session(&self.storage, actor, session_id).await?;

        if options.mode == CommitMode::DryRun {
            return dry_run(&session, options);
        }

        let mode = if options.mode == CommitMode::Production
            && self.flags.is_enabled(FLAG_VOICE_PLAN_SHADOW_MODE, &actor.flag_context())
        {
            tracing::info!(session_id = %session_id, "shadow mode flag active, production commit downgraded");
            CommitMode::Shadow
        } else {
            options.mode
        };
        self.audited_commit(actor, session, CommitOptions { mode, ..options }).await
    }

    /// Re-commit shadow-committed sessions in production mode.
    ///
    /// Operator task: the commit flags are not consulted, and the shadow-mode
    /// flag cannot downgrade these commits.
    pub async fn backfill_shadow_sessions(&self, limit: usize) -> Result<BackfillReport, ServiceError> {
        let sessions =
            self.storage.list_sessions_by_commit_status(CommitStatus::Shadow, limit).await?;
        let mut report = BackfillReport { examined: sessions.len(), ..BackfillReport::default() };
        for session in sessions {
            let session_id = session.id;
            let actor = Actor::new(session.user_id, session.organization_id);
            let options = CommitOptions { mode: CommitMode::Production, ..CommitOptions::default() };
            match self.audited_commit(&actor, session, options).await {
                Ok(outcome) => {
                    report.committed += 1;
                    tracing::info!(session_id = %session_id, tasks = outcome.counts.tasks, "backfilled shadow session");
                },
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "backfill commit failed");
                    report.failed.push(BackfillFailure { session_id, code: e.code(), error: e.to_string() });
                },
            }
        }
        Ok(report)
    }

    async fn audited_commit(
        &self,
        actor: &Actor,
        mut session: VoiceSession,
        options: CommitOptions,
    ) -> Result<CommitOutcome, ServiceError> {
        let mut audit = AuditEntry::open(
            session.id,
            session.organization_id,
            actor.user_id,
            AuditOperation::Commit,
            options.mode,
        );
        self.storage.open_audit(&audit).await?;

        let mut chain = self.events.chain(*actor, Some(session.id));
        let result = self.execute_commit(actor, &mut session, options, audit.id, &mut chain).await;
        match &result {
            Ok(outcome) => audit.complete(serde_json::to_value(outcome).unwrap_or_default()),
            Err(e) => audit.fail(e.to_string(), Some(json!({"code": e.code(), "mode": options.mode}))),
        }
        if let Err(e) = self.storage.close_audit(&audit).await {
            tracing::error!(audit_id = %audit.id, session_id = %session.id, error = %e, "failed to close commit audit entry");
        }
        result
    }

    async fn execute_commit(
        &self,
        actor: &Actor,
        session: &mut VoiceSession,
        options: CommitOptions,
        audit_id: Uuid,
        chain: &mut EventChain<'_>,
    ) -> Result<CommitOutcome, ServiceError> {
        if !matches!(
            session.status,
            SessionStatus::Completed | SessionStatus::CommitFailed | SessionStatus::Committed
        ) {
            return Err(ServiceError::InvalidState(format!(
                "session in status {} cannot be committed",
                session.status
            )));
        }
        let plan_json = session
            .plan_json
            .clone()
            .ok_or_else(|| ServiceError::InvalidState("session has no plan to commit".to_owned()))?;
        if session.is_committed() && !options.force_commit {
            return Err(ServiceError::Conflict(format!("session {} is already committed", session.id)));
        }

        let report = validate(&plan_json, actor, options.strict);
        if !report.passes(options.strict) {
            if !options.force_commit {
                return Err(ServiceError::validation(report.summary(), Some(report)));
            }
            tracing::warn!(session_id = %session.id, summary = %report.summary(), "force-committing plan that failed validation");
        }
        let plan = PlanDocument::from_value(&plan_json)
            .map_err(|e| ServiceError::validation(format!("plan does not map onto rows: {e}"), None))?;
        let rows = PlanRows::build(session, &plan, session.plan_confidence);

        match options.mode {
            CommitMode::Shadow => self.shadow_commit(session, rows, report, audit_id, chain).await,
            CommitMode::Production => self.production_commit(session, rows, report, audit_id, chain).await,
            CommitMode::DryRun => Err(ServiceError::DryRunFailed("dry run reached the write path".to_owned())),
        }
    }

    async fn shadow_commit(
        &self,
        session: &mut VoiceSession,
        rows: PlanRows,
        validation: ValidationReport,
        audit_id: Uuid,
        chain: &mut EventChain<'_>,
    ) -> Result<CommitOutcome, ServiceError> {
        let project_id = Uuid::new_v4();
        let counts = rows.counts();
        tracing::info!(
            session_id = %session.id,
            synthetic_project_id = %project_id,
            project = %rows.project.name,
            milestones = counts.milestones,
            tasks = counts.tasks,
            dependencies = counts.dependencies,
            "shadow commit: production writes skipped"
        );
        session.commit_status = Some(CommitStatus::Shadow);
        session.committed_project_id = Some(project_id);
        session.updated_at = chrono::Utc::now();
        self.storage.save_session(session).await?;
        chain.emit(
            EventKind::PlanShadowCommitted,
            json!({"project_id": project_id, "counts": counts}),
        );
        Ok(CommitOutcome {
            session_id: session.id,
            mode: CommitMode::Shadow,
            project_id: Some(project_id),
            counts,
            validation,
            audit_id: Some(audit_id),
        })
    }

    async fn production_commit(
        &self,
        session: &mut VoiceSession,
        rows: PlanRows,
        validation: ValidationReport,
        audit_id: Uuid,
        chain: &mut EventChain<'_>,
    ) -> Result<CommitOutcome, ServiceError> {
        let from = session.status;
        session.transition(SessionStatus::Committing)?;
        session.commit_status = Some(CommitStatus::Pending);
        self.storage.save_session(session).await?;
        chain.emit(EventKind::SessionStatusChanged, json!({"from": from, "to": session.status}));

        match self.storage.commit_plan(rows).await {
            Ok(committed) => {
                session.transition(SessionStatus::Committed)?;
                session.commit_status = Some(CommitStatus::Committed);
                session.committed_project_id = Some(committed.project_id);
                session.error_message = None;
                self.storage.save_session(session).await?;
                chain.emit(
                    EventKind::PlanCommitted,
                    json!({"project_id": committed.project_id, "counts": committed.counts}),
                );
                tracing::info!(session_id = %session.id, project_id = %committed.project_id, "plan committed");
                Ok(CommitOutcome {
                    session_id: session.id,
                    mode: CommitMode::Production,
                    project_id: Some(committed.project_id),
                    counts: committed.counts,
                    validation,
                    audit_id: Some(audit_id),
                })
            },
            Err(e) => {
                let message = e.to_string();
                session.transition(SessionStatus::CommitFailed)?;
                session.commit_status = Some(CommitStatus::Failed);
                session.error_message = Some(message.clone());
                if let Err(save_err) = self.storage.save_session(session).await {
                    tracing::error!(session_id = %session.id, error = %save_err, "failed to record commit failure on session");
                }
                chain.emit(EventKind::PlanCommitFailed, json!({"error": message}));
                Err(ServiceError::CommitFailed(message))
            },
        }
    }

    pub async fn rollback(&self, actor: &Actor, session_id: Uuid) -> Result<RollbackOutcome, ServiceError> {
        require_flag(self.flags.as_ref(), FLAG_VOICE_PLAN_ROLLBACK, actor)?;
        let mut session = load_session(&self.storage, actor, session_id).await?;

        let mut audit = AuditEntry::open(
            session.id,
            session.organization_id,
            actor.user_id,
            AuditOperation::Rollback,
            CommitMode::Production,
        );
        self.storage.open_audit(&audit).await?;

        let result = self.execute_rollback(actor, &mut session, audit.id).await;
        match &result {
            Ok(outcome) => audit.complete(serde_json::to_value(outcome).unwrap_or_default()),
            Err(e) => audit.fail(e.to_string(), Some(json!({"code": e.code()}))),
        }
        if let Err(e) = self.storage.close_audit(&audit).await {
            tracing::error!(audit_id = %audit.id, session_id = %session_id, error = %e, "failed to close rollback audit entry");
        }
        result
    }

    async fn execute_rollback(
        &self,
        actor: &Actor,
        session: &mut VoiceSession,
        audit_id: Uuid,
    ) -> Result<RollbackOutcome, ServiceError> {
        if session.status != SessionStatus::Committed || !session.is_committed() {
            return Err(ServiceError::InvalidState(format!(
                "only committed sessions can be rolled back (status {})",
                session.status
            )));
        }
        let deleted = self.storage.rollback_plan(session.id).await?;
        session.transition(SessionStatus::RolledBack)?;
        session.commit_status = Some(CommitStatus::RolledBack);
        session.committed_project_id = None;
        self.storage.save_session(session).await?;
        self.events
            .chain(*actor, Some(session.id))
            .emit(EventKind::PlanRolledBack, json!({"deleted": deleted}));
        tracing::info!(session_id = %session.id, rows = deleted.total(), "plan rolled back");
        Ok(RollbackOutcome { session_id: session.id, deleted, audit_id })
    }

    pub async fn list_audit(&self, actor: &Actor, session_id: Uuid) -> Result<Vec<AuditEntry>, ServiceError> {
        load_session(&self.storage, actor, session_id).await?;
        Ok(self.storage.list_audit(session_id).await?)
    }
}

fn validate(plan: &serde_json::Value, actor: &Actor, strict: bool) -> ValidationReport {
    let context = ValidationContext {
        organization_id: Some(actor.organization_id),
        user_id: Some(actor.user_id),
    };
    let options = ValidationOptions { strict, dry_run: true, ..ValidationOptions::default() };
    validate_plan(plan, &context, &options)
}

fn dry_run(session: &VoiceSession, options: CommitOptions) -> Result<CommitOutcome, ServiceError> {
    let plan = session
        .plan_json
        .as_ref()
        .ok_or_else(|| ServiceError::DryRunFailed("session has no plan".to_owned()))?;
    let actor = Actor::new(session.user_id, session.organization_id);
    let validation = validate(plan, &actor, options.strict);
    let counts = validation.dry_run.map(CommitCounts::from).unwrap_or_default();
    tracing::debug!(session_id = %session.id, valid = validation.is_valid, "dry run complete");
    Ok(CommitOutcome {
        session_id: session.id,
        mode: CommitMode::DryRun,
        project_id: None,
        counts,
        validation,
        audit_id: None,
    })
}

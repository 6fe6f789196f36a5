//! Commit modes, row counts and the audit trail record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::plan::{DryRunSummary, ValidationReport};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Validate and count only; nothing is written, not even an audit row.
    DryRun,
    /// Full logic path with a synthetic project id and no production writes.
    Shadow,
    #[default]
    Production,
}

impl CommitMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::DryRun => "dry_run",
            Self::Shadow => "shadow",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for CommitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommitMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dry_run" => Ok(Self::DryRun),
            "shadow" => Ok(Self::Shadow),
            "production" => Ok(Self::Production),
            other => Err(CoreError::invalid_enum("commit mode", other)),
        }
    }
}

/// Caller options for a commit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitOptions {
    #[serde(default)]
    pub mode: CommitMode,
    /// Commit despite validation errors, or re-commit an already committed plan.
    #[serde(default)]
    pub force_commit: bool,
    /// Treat warnings as blocking.
    #[serde(default)]
    pub strict: bool,
}

/// Rows written (or, for dry run and shadow, that would be written).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitCounts {
    pub projects: usize,
    pub milestones: usize,
    pub tasks: usize,
    pub dependencies: usize,
}

impl CommitCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.projects + self.milestones + self.tasks + self.dependencies
    }
}

impl From<DryRunSummary> for CommitCounts {
    fn from(s: DryRunSummary) -> Self {
        Self {
            projects: s.projects,
            milestones: s.milestones,
            tasks: s.tasks,
            dependencies: s.dependencies,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitOutcome {
    pub session_id: Uuid,
    pub mode: CommitMode,
    /// Real id for production, synthetic for shadow, absent for dry run.
    pub project_id: Option<Uuid>,
    pub counts: CommitCounts,
    pub validation: ValidationReport,
    pub audit_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollbackOutcome {
    pub session_id: Uuid,
    pub deleted: CommitCounts,
    pub audit_id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Commit,
    Rollback,
}

impl AuditOperation {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        }
    }
}

impl FromStr for AuditOperation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit" => Ok(Self::Commit),
            "rollback" => Ok(Self::Rollback),
            other => Err(CoreError::invalid_enum("audit operation", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Started,
    Completed,
    Failed,
}

impl AuditStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for AuditStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::invalid_enum("audit status", other)),
        }
    }
}

/// Durable record of one commit or rollback attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: Uuid,
    pub session_id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub operation: AuditOperation,
    pub mode: CommitMode,
    pub status: AuditStatus,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AuditEntry {
    #[must_use]
    pub fn open(
        session_id: Uuid,
        organization_id: Uuid,
        user_id: Uuid,
        operation: AuditOperation,
        mode: CommitMode,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            organization_id,
            user_id,
            operation,
            mode,
            status: AuditStatus::Started,
            result: None,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn complete(&mut self, result: serde_json::Value) {
        self.status = AuditStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>, result: Option<serde_json::Value>) {
        self.status = AuditStatus::Failed;
        self.error_message = Some(error.into());
        self.result = result;
        self.completed_at = Some(Utc::now());
    }
}

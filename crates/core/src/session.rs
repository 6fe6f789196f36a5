//! Voice session aggregate and its lifecycle enums.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// One attempt to turn spoken input into a structured project plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceSession {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub language: String,
    pub status: SessionStatus,
    pub transcript: Option<String>,
    pub transcript_confidence: Option<f64>,
    pub plan_json: Option<serde_json::Value>,
    pub plan_confidence: Option<f64>,
    pub commit_status: Option<CommitStatus>,
    pub committed_project_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub committed_at: Option<DateTime<Utc>>,
}

impl VoiceSession {
    #[must_use]
    pub fn new(organization_id: Uuid, user_id: Uuid, language: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            user_id,
            language: language.into(),
            status: SessionStatus::Initializing,
            transcript: None,
            transcript_confidence: None,
            plan_json: None,
            plan_confidence: None,
            commit_status: None,
            committed_project_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            committed_at: None,
        }
    }

    /// Move to `next`, enforcing the lifecycle table and stamping timestamps.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] when `next` is not reachable from
    /// the current status.
    pub fn transition(&mut self, next: SessionStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        match next {
            SessionStatus::Completed => self.completed_at = Some(now),
            SessionStatus::Committed => self.committed_at = Some(now),
            _ => {},
        }
        Ok(())
    }

    /// Mark the session failed with a reason. Failure is reachable from every
    /// non-terminal pipeline state.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] if the session is already terminal.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), CoreError> {
        self.transition(SessionStatus::Failed)?;
        self.error_message = Some(reason.into());
        Ok(())
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.commit_status == Some(CommitStatus::Committed)
    }
}

/// Pipeline status of a voice session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initializing,
    Recording,
    Processing,
    Transcribing,
    Generating,
    Validating,
    Completed,
    Committing,
    Committed,
    CommitFailed,
    Failed,
    RolledBack,
}

impl SessionStatus {
    pub const ALL: &'static [SessionStatus] = &[
        Self::Initializing,
        Self::Recording,
        Self::Processing,
        Self::Transcribing,
        Self::Generating,
        Self::Validating,
        Self::Completed,
        Self::Committing,
        Self::Committed,
        Self::CommitFailed,
        Self::Failed,
        Self::RolledBack,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Initializing => "initializing",
            Self::Recording => "recording",
            Self::Processing => "processing",
            Self::Transcribing => "transcribing",
            Self::Generating => "generating",
            Self::Validating => "validating",
            Self::Completed => "completed",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::CommitFailed => "commit_failed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Forward-only lifecycle. Stages are never skipped backwards; commit is only
    /// reachable from a completed (or previously failed/forced) commit state.
    #[must_use]
    pub const fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus as S;
        matches!(
            (*self, next),
            (S::Initializing, S::Recording | S::Processing)
                | (S::Recording, S::Processing)
                | (S::Processing, S::Transcribing | S::Generating)
                | (S::Transcribing, S::Generating)
                | (S::Generating, S::Validating)
                | (S::Validating, S::Completed)
                | (S::Completed | S::CommitFailed | S::Committed, S::Committing)
                | (S::Committing, S::Committed | S::CommitFailed)
                | (S::Committed, S::RolledBack)
                | (
                    S::Initializing
                        | S::Recording
                        | S::Processing
                        | S::Transcribing
                        | S::Generating
                        | S::Validating,
                    S::Failed
                )
        )
    }

    /// Whether orchestration can start from this status.
    #[must_use]
    pub const fn accepts_orchestration(&self) -> bool {
        matches!(*self, Self::Initializing | Self::Recording)
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(*self, Self::Failed | Self::RolledBack)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::invalid_enum("session status", s))
    }
}

/// Commit state of the plan attached to a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    Pending,
    Shadow,
    Committed,
    Failed,
    RolledBack,
}

impl CommitStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Pending => "pending",
            Self::Shadow => "shadow",
            Self::Committed => "committed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommitStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "shadow" => Ok(Self::Shadow),
            "committed" => Ok(Self::Committed),
            "failed" => Ok(Self::Failed),
            "rolled_back" => Ok(Self::RolledBack),
            other => Err(CoreError::invalid_enum("commit status", other)),
        }
    }
}

/// Orchestration stage, used for timing and failure attribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Transcription,
    PlanGeneration,
    Validation,
    Alternatives,
    Refinement,
    Commit,
}

impl PipelineStage {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Transcription => "transcription",
            Self::PlanGeneration => "plan_generation",
            Self::Validation => "validation",
            Self::Alternatives => "alternatives",
            Self::Refinement => "refinement",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

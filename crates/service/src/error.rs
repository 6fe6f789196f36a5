//! Typed error enum for the service layer.
//!
//! Every variant maps to one stable machine code (see [`ServiceError::code`])
//! that the HTTP layer and CLI surface verbatim.

use voiceplan_core::{CoreError, ValidationReport};
use voiceplan_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The flag guarding the operation is off for this user/organization.
    #[error("feature disabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Wrong session status for the requested operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("validation failed: {message}")]
    ValidationFailed { message: String, report: Option<Box<ValidationReport>> },

    /// Double commit or another competing write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("plan generation failed: {0}")]
    PlanGenerationFailed(String),

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("dry run failed: {0}")]
    DryRunFailed(String),

    #[error("speech synthesis failed: {0}")]
    SpeechFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

impl ServiceError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::FeatureDisabled(_) => "FEATURE_DISABLED",
            Self::NotFound { .. } | Self::Storage(StorageError::NotFound { .. }) => "NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::Conflict(_) => "CONFLICT",
            Self::TranscriptionFailed(_) => "TRANSCRIPTION_FAILED",
            Self::PlanGenerationFailed(_) => "PLAN_GENERATION_FAILED",
            Self::CommitFailed(_) => "COMMIT_FAILED",
            Self::DryRunFailed(_) => "DRY_RUN_FAILED",
            Self::SpeechFailed(_) => "SPEECH_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    pub(crate) fn session_not_found(id: uuid::Uuid) -> Self {
        Self::NotFound { entity: "voice session", id: id.to_string() }
    }

    pub(crate) fn validation(message: impl Into<String>, report: Option<ValidationReport>) -> Self {
        Self::ValidationFailed { message: message.into(), report: report.map(Box::new) }
    }

    /// Whether this error is likely transient (worth retrying).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_transient())
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code() == "NOT_FOUND"
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition { .. } => Self::InvalidState(err.to_string()),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

use std::result::Result as StdResult;

use thiserror::Error;

/// Errors raised by core domain logic.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A persisted or user-supplied enum value did not match any known variant.
    #[error("invalid {kind}: {value}")]
    InvalidEnum { kind: &'static str, value: String },

    /// Session status change not allowed by the lifecycle table.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    /// Event envelope failed schema validation.
    #[error("invalid event envelope: {0}")]
    InvalidEnvelope(String),

    /// Key lifecycle operation not allowed for the key's current status.
    #[error("invalid key state: {0}")]
    InvalidKeyState(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn invalid_enum(kind: &'static str, value: &str) -> Self {
        Self::InvalidEnum { kind, value: value.to_owned() }
    }
}

pub type Result<T> = StdResult<T, CoreError>;

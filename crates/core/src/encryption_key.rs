//! Encryption key metadata and lifecycle. No key material is modeled.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

pub const DEFAULT_KEY_ALGORITHM: &str = "aes-256-gcm";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Rotating,
    Expired,
    Revoked,
}

impl KeyStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Active => "active",
            Self::Rotating => "rotating",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "rotating" => Ok(Self::Rotating),
            "expired" => Ok(Self::Expired),
            "revoked" => Ok(Self::Revoked),
            other => Err(CoreError::invalid_enum("key status", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncryptionKeyMeta {
    pub id: Uuid,
    pub algorithm: String,
    pub status: KeyStatus,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
    pub rotated_at: Option<DateTime<Utc>>,
}

impl EncryptionKeyMeta {
    #[must_use]
    pub fn generate(algorithm: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            algorithm: algorithm.into(),
            status: KeyStatus::Active,
            usage_count: 0,
            created_at: Utc::now(),
            rotated_at: None,
        }
    }

    /// Count one encrypt/decrypt use. Only active and rotating keys may be used;
    /// a rotating key still decrypts data written before rotation.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidKeyState`] for expired or revoked keys.
    pub fn record_use(&mut self) -> Result<u64, CoreError> {
        match self.status {
            KeyStatus::Active | KeyStatus::Rotating => {
                self.usage_count = self.usage_count.saturating_add(1);
                Ok(self.usage_count)
            },
            KeyStatus::Expired | KeyStatus::Revoked => Err(CoreError::InvalidKeyState(format!(
                "key {} is {} and cannot be used",
                self.id, self.status
            ))),
        }
    }

    #[must_use]
    pub fn needs_rotation(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.status == KeyStatus::Active && now - self.created_at >= max_age
    }

    /// Replace this key with a fresh active one; this key becomes `rotating`.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidKeyState`] unless the key is active.
    pub fn rotate(&mut self) -> Result<Self, CoreError> {
        if self.status != KeyStatus::Active {
            return Err(CoreError::InvalidKeyState(format!(
                "only active keys rotate; key {} is {}",
                self.id, self.status
            )));
        }
        self.status = KeyStatus::Rotating;
        self.rotated_at = Some(Utc::now());
        Ok(Self::generate(self.algorithm.clone()))
    }

    /// # Errors
    /// Returns [`CoreError::InvalidKeyState`] if the key is revoked.
    pub fn expire(&mut self) -> Result<(), CoreError> {
        if self.status == KeyStatus::Revoked {
            return Err(CoreError::InvalidKeyState(format!("key {} is revoked", self.id)));
        }
        self.status = KeyStatus::Expired;
        Ok(())
    }

    pub fn revoke(&mut self) {
        self.status = KeyStatus::Revoked;
    }
}

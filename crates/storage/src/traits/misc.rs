use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;
use crate::types::UserRecord;

/// User provisioning.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user or update organization and role of an existing email.
    async fn upsert_user(
        &self,
        email: &str,
        organization_id: Uuid,
        role: &str,
    ) -> Result<UserRecord, StorageError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StorageError>;
}

/// Connectivity checks.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Round trip to the backend.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Short backend name for logs and readiness output.
    fn backend_name(&self) -> &'static str;
}

//! UserStore implementation for PgStorage.

use super::*;

use sqlx::Row;
use uuid::Uuid;

use crate::traits::UserStore;
use crate::types::{UserRecord, normalize_email};

fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<UserRecord, StorageError> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        organization_id: row.try_get("organization_id")?,
        role: row.try_get("role")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl UserStore for PgStorage {
    async fn upsert_user(
        &self,
        email: &str,
        organization_id: Uuid,
        role: &str,
    ) -> Result<UserRecord, StorageError> {
        let row = sqlx::query(
            "INSERT INTO users (id, email, organization_id, role)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (email) DO UPDATE SET
               organization_id = EXCLUDED.organization_id,
               role = EXCLUDED.role,
               updated_at = NOW()
             RETURNING id, email, organization_id, role, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(normalize_email(email))
        .bind(organization_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;
        row_to_user(&row)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StorageError> {
        let row = sqlx::query(
            "SELECT id, email, organization_id, role, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }
}

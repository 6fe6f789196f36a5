//! AuditStore implementation for PgStorage.

use super::*;

use sqlx::Row;
use uuid::Uuid;
use voiceplan_core::{AuditEntry, AuditOperation, AuditStatus, CommitMode};

use crate::traits::AuditStore;

fn row_to_audit(row: &sqlx::postgres::PgRow) -> Result<AuditEntry, StorageError> {
    let operation: String = row.try_get("operation")?;
    let mode: String = row.try_get("mode")?;
    let status: String = row.try_get("status")?;
    Ok(AuditEntry {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        organization_id: row.try_get("organization_id")?,
        user_id: row.try_get("user_id")?,
        operation: parse_column::<AuditOperation>("operation", &operation)?,
        mode: parse_column::<CommitMode>("mode", &mode)?,
        status: parse_column::<AuditStatus>("status", &status)?,
        result: row.try_get("result")?,
        error_message: row.try_get("error_message")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

#[async_trait]
impl AuditStore for PgStorage {
    async fn open_audit(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO voice_plan_audit (id, session_id, organization_id, user_id, operation, mode,
               status, result, error_message, started_at, completed_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
        )
        .bind(entry.id)
        .bind(entry.session_id)
        .bind(entry.organization_id)
        .bind(entry.user_id)
        .bind(entry.operation.as_str())
        .bind(entry.mode.as_str())
        .bind(entry.status.as_str())
        .bind(&entry.result)
        .bind(&entry.error_message)
        .bind(entry.started_at)
        .bind(entry.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close_audit(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE voice_plan_audit SET status = $1, result = $2, error_message = $3, completed_at = $4
             WHERE id = $5",
        )
        .bind(entry.status.as_str())
        .bind(&entry.result)
        .bind(&entry.error_message)
        .bind(entry.completed_at)
        .bind(entry.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound { entity: "audit entry", id: entry.id.to_string() });
        }
        Ok(())
    }

    async fn list_audit(&self, session_id: Uuid) -> Result<Vec<AuditEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, session_id, organization_id, user_id, operation, mode, status, result,
               error_message, started_at, completed_at
             FROM voice_plan_audit WHERE session_id = $1 ORDER BY started_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_audit).collect()
    }
}

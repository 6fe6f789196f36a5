//! SessionStore implementation for PgStorage.

use super::*;

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;
use voiceplan_core::{CommitStatus, SessionStatus, VoiceSession};

use crate::traits::SessionStore;

const SESSION_COLUMNS: &str = "id, organization_id, user_id, language, status, transcript, \
    transcript_confidence, plan_json, plan_confidence, commit_status, committed_project_id, \
    error_message, created_at, updated_at, completed_at, committed_at";

fn row_to_session(row: &sqlx::postgres::PgRow) -> Result<VoiceSession, StorageError> {
    let status: String = row.try_get("status")?;
    let commit_status: Option<String> = row.try_get("commit_status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(VoiceSession {
        id: row.try_get("id")?,
        organization_id: row.try_get("organization_id")?,
        user_id: row.try_get("user_id")?,
        language: row.try_get("language")?,
        status: parse_column::<SessionStatus>("status", &status)?,
        transcript: row.try_get("transcript")?,
        transcript_confidence: row.try_get("transcript_confidence")?,
        plan_json: row.try_get("plan_json")?,
        plan_confidence: row.try_get("plan_confidence")?,
        commit_status: commit_status
            .as_deref()
            .map(|s| parse_column::<CommitStatus>("commit_status", s))
            .transpose()?,
        committed_project_id: row.try_get("committed_project_id")?,
        error_message: row.try_get("error_message")?,
        created_at,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
        committed_at: row.try_get("committed_at")?,
    })
}

#[async_trait]
impl SessionStore for PgStorage {
    async fn save_session(&self, session: &VoiceSession) -> Result<(), StorageError> {
        sqlx::query(&format!(
            "INSERT INTO voice_sessions ({SESSION_COLUMNS})
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
             ON CONFLICT (id) DO UPDATE SET
               language = EXCLUDED.language,
               status = EXCLUDED.status,
               transcript = EXCLUDED.transcript,
               transcript_confidence = EXCLUDED.transcript_confidence,
               plan_json = EXCLUDED.plan_json,
               plan_confidence = EXCLUDED.plan_confidence,
               commit_status = EXCLUDED.commit_status,
               committed_project_id = EXCLUDED.committed_project_id,
               error_message = EXCLUDED.error_message,
               updated_at = EXCLUDED.updated_at,
               completed_at = EXCLUDED.completed_at,
               committed_at = EXCLUDED.committed_at"
        ))
        .bind(session.id)
        .bind(session.organization_id)
        .bind(session.user_id)
        .bind(&session.language)
        .bind(session.status.as_str())
        .bind(&session.transcript)
        .bind(session.transcript_confidence)
        .bind(&session.plan_json)
        .bind(session.plan_confidence)
        .bind(session.commit_status.map(|s| s.as_str()))
        .bind(session.committed_project_id)
        .bind(&session.error_message)
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(session.completed_at)
        .bind(session.committed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<VoiceSession>, StorageError> {
        let row =
            sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM voice_sessions WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn list_sessions(
        &self,
        organization_id: Uuid,
        limit: usize,
    ) -> Result<Vec<VoiceSession>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM voice_sessions
             WHERE organization_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(organization_id)
        .bind(usize_to_i64(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_session).collect()
    }

    async fn list_sessions_by_commit_status(
        &self,
        status: CommitStatus,
        limit: usize,
    ) -> Result<Vec<VoiceSession>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM voice_sessions
             WHERE commit_status = $1 ORDER BY created_at ASC LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(usize_to_i64(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_session).collect()
    }
}

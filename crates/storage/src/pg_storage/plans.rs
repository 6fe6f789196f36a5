//! PlanStore implementation for PgStorage.
//!
//! A commit is one transaction; dropping it without `commit()` rolls back.

use super::*;

use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;
use voiceplan_core::CommitCounts;

use crate::rows::{
    COMMIT_STATUS_COMMITTED, COMMIT_STATUS_PENDING, CommittedPlan, PlanRows, VoiceProvenance,
};
use crate::traits::PlanStore;

const PROVENANCE_TABLES: [&str; 3] = ["projects", "milestones", "tasks"];

async fn insert_rows(tx: &mut Transaction<'_, Postgres>, rows: &PlanRows) -> Result<(), StorageError> {
    let p = &rows.project;
    sqlx::query(
        "INSERT INTO projects (id, organization_id, owner_id, name, description, start_date, end_date,
           voice_session_id, voice_generated, voice_confidence, voice_commit_status, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
    )
    .bind(p.id)
    .bind(p.organization_id)
    .bind(p.owner_id)
    .bind(&p.name)
    .bind(&p.description)
    .bind(&p.start_date)
    .bind(&p.end_date)
    .bind(p.provenance.voice_session_id)
    .bind(p.provenance.voice_generated)
    .bind(p.provenance.voice_confidence)
    .bind(&p.provenance.voice_commit_status)
    .bind(p.created_at)
    .execute(&mut **tx)
    .await?;

    for m in &rows.milestones {
        let VoiceProvenance { voice_session_id, voice_generated, voice_confidence, voice_commit_status } =
            &m.provenance;
        sqlx::query(
            "INSERT INTO milestones (id, project_id, name, description, due_date,
               voice_session_id, voice_generated, voice_confidence, voice_commit_status)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(m.id)
        .bind(m.project_id)
        .bind(&m.name)
        .bind(&m.description)
        .bind(&m.due_date)
        .bind(voice_session_id)
        .bind(voice_generated)
        .bind(voice_confidence)
        .bind(voice_commit_status)
        .execute(&mut **tx)
        .await?;
    }

    for t in &rows.tasks {
        sqlx::query(
            "INSERT INTO tasks (id, project_id, milestone_id, plan_key, title, description, priority,
               estimated_hours, assignee, voice_session_id, voice_generated, voice_confidence,
               voice_commit_status)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
        )
        .bind(t.id)
        .bind(t.project_id)
        .bind(t.milestone_id)
        .bind(&t.plan_key)
        .bind(&t.title)
        .bind(&t.description)
        .bind(&t.priority)
        .bind(t.estimated_hours)
        .bind(&t.assignee)
        .bind(t.provenance.voice_session_id)
        .bind(t.provenance.voice_generated)
        .bind(t.provenance.voice_confidence)
        .bind(&t.provenance.voice_commit_status)
        .execute(&mut **tx)
        .await?;
    }

    for d in &rows.dependencies {
        sqlx::query(
            "INSERT INTO voice_plan_dependencies (id, voice_session_id, task_id, depends_on_task_id)
             VALUES ($1,$2,$3,$4)",
        )
        .bind(d.id)
        .bind(d.voice_session_id)
        .bind(d.task_id)
        .bind(d.depends_on_task_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl PlanStore for PgStorage {
    async fn commit_plan(&self, rows: PlanRows) -> Result<CommittedPlan, StorageError> {
        let session_id = rows.project.provenance.voice_session_id;
        let mut tx = self.pool.begin().await?;

        insert_rows(&mut tx, &rows).await?;

        for table in PROVENANCE_TABLES {
            sqlx::query(&format!(
                "UPDATE {table} SET voice_commit_status = $1
                 WHERE voice_session_id = $2 AND voice_commit_status = $3"
            ))
            .bind(COMMIT_STATUS_COMMITTED)
            .bind(session_id)
            .bind(COMMIT_STATUS_PENDING)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(
            session_id = %session_id,
            project_id = %rows.project.id,
            milestones = rows.milestones.len(),
            tasks = rows.tasks.len(),
            dependencies = rows.dependencies.len(),
            "plan committed"
        );
        Ok(CommittedPlan { project_id: rows.project.id, counts: rows.counts() })
    }

    async fn rollback_plan(&self, session_id: Uuid) -> Result<CommitCounts, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = CommitCounts::default();
        for (table, slot) in [
            ("voice_plan_dependencies", &mut deleted.dependencies),
            ("tasks", &mut deleted.tasks),
            ("milestones", &mut deleted.milestones),
            ("projects", &mut deleted.projects),
        ] {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE voice_session_id = $1"))
                .bind(session_id)
                .execute(&mut *tx)
                .await?;
            *slot = usize::try_from(result.rows_affected()).unwrap_or(usize::MAX);
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn count_plan_rows(&self, session_id: Uuid) -> Result<CommitCounts, StorageError> {
        let row = sqlx::query(
            "SELECT
               (SELECT COUNT(*) FROM projects WHERE voice_session_id = $1) AS projects,
               (SELECT COUNT(*) FROM milestones WHERE voice_session_id = $1) AS milestones,
               (SELECT COUNT(*) FROM tasks WHERE voice_session_id = $1) AS tasks,
               (SELECT COUNT(*) FROM voice_plan_dependencies WHERE voice_session_id = $1) AS dependencies",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(CommitCounts {
            projects: i64_to_usize(row.try_get("projects")?),
            milestones: i64_to_usize(row.try_get("milestones")?),
            tasks: i64_to_usize(row.try_get("tasks")?),
            dependencies: i64_to_usize(row.try_get("dependencies")?),
        })
    }
}

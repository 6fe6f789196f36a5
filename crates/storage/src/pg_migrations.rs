//! PostgreSQL schema migrations for voiceplan storage.
//!
//! Every statement is idempotent; running the set twice is a no-op.

use anyhow::Result;
use sqlx::PgPool;

/// Run all PostgreSQL migrations.
pub async fn run_pg_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS voice_sessions (
            id UUID PRIMARY KEY,
            organization_id UUID NOT NULL,
            user_id UUID NOT NULL,
            language TEXT NOT NULL DEFAULT 'en',
            status TEXT NOT NULL DEFAULT 'initializing',
            transcript TEXT,
            transcript_confidence DOUBLE PRECISION,
            plan_json JSONB,
            plan_confidence DOUBLE PRECISION,
            commit_status TEXT,
            committed_project_id UUID,
            error_message TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            completed_at TIMESTAMPTZ,
            committed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_voice_sessions_org ON voice_sessions (organization_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_voice_sessions_commit ON voice_sessions (commit_status, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id UUID PRIMARY KEY,
            organization_id UUID NOT NULL,
            owner_id UUID NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            start_date TEXT,
            end_date TEXT,
            voice_session_id UUID,
            voice_generated BOOLEAN NOT NULL DEFAULT FALSE,
            voice_confidence DOUBLE PRECISION,
            voice_commit_status TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS milestones (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects (id),
            name TEXT NOT NULL,
            description TEXT,
            due_date TEXT,
            voice_session_id UUID,
            voice_generated BOOLEAN NOT NULL DEFAULT FALSE,
            voice_confidence DOUBLE PRECISION,
            voice_commit_status TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects (id),
            milestone_id UUID REFERENCES milestones (id),
            plan_key TEXT,
            title TEXT NOT NULL,
            description TEXT,
            priority TEXT NOT NULL DEFAULT 'medium',
            estimated_hours DOUBLE PRECISION,
            assignee TEXT,
            voice_session_id UUID,
            voice_generated BOOLEAN NOT NULL DEFAULT FALSE,
            voice_confidence DOUBLE PRECISION,
            voice_commit_status TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS voice_plan_dependencies (
            id UUID PRIMARY KEY,
            voice_session_id UUID NOT NULL,
            task_id UUID NOT NULL REFERENCES tasks (id),
            depends_on_task_id UUID NOT NULL REFERENCES tasks (id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    for (table, index) in [
        ("projects", "idx_projects_voice_session"),
        ("milestones", "idx_milestones_voice_session"),
        ("tasks", "idx_tasks_voice_session"),
        ("voice_plan_dependencies", "idx_voice_deps_session"),
    ] {
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {index} ON {table} (voice_session_id)"
        ))
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS voice_plan_audit (
            id UUID PRIMARY KEY,
            session_id UUID NOT NULL,
            organization_id UUID NOT NULL,
            user_id UUID NOT NULL,
            operation TEXT NOT NULL,
            mode TEXT NOT NULL,
            status TEXT NOT NULL,
            result JSONB,
            error_message TEXT,
            started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            completed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_voice_plan_audit_session ON voice_plan_audit (session_id, started_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            organization_id UUID NOT NULL,
            role TEXT NOT NULL DEFAULT 'member',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("PostgreSQL migrations complete");
    Ok(())
}

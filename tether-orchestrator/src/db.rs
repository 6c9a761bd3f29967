use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            caller_id TEXT NOT NULL,
            status VARCHAR(50) NOT NULL,
            requested_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            runner_id VARCHAR(255),
            parameters JSONB NOT NULL DEFAULT '{}',
            output_len BIGINT NOT NULL DEFAULT 0,
            result_success BOOLEAN,
            result_exit_code INTEGER,
            result_output JSONB,
            result_error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create output log table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_output (
            job_id UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            seq BIGINT NOT NULL,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (job_id, seq)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_requested_at ON jobs(requested_at DESC)")
        .execute(pool)
        .await?;

    // Ownership and cursor state live apart from jobs: they expire on their
    // own schedule and never cascade from job deletion.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_owners (
            job_id UUID PRIMARY KEY,
            caller_id TEXT NOT NULL,
            session_hash VARCHAR(64) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_cursors (
            job_id UUID NOT NULL,
            session_hash VARCHAR(64) NOT NULL,
            cursor_value BIGINT NOT NULL CHECK (cursor_value >= 0),
            cursor_sig TEXT NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (job_id, session_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_task_owners_expires_at ON task_owners(expires_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_task_cursors_expires_at ON task_cursors(expires_at)",
    )
    .execute(pool)
    .await?;

    // Create final results table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_results (
            job_id UUID PRIMARY KEY,
            text TEXT NOT NULL,
            artifacts TEXT[] NOT NULL DEFAULT '{}',
            finalized_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

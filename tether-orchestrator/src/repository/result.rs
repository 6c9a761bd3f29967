//! Result Repository
//!
//! Persists the normalised final output of finished jobs. The first write
//! for a job wins; later writes return the stored record unchanged.

use async_trait::async_trait;
use sqlx::PgPool;
use tether_core::domain::output::FinalOutput;
use uuid::Uuid;

use super::StoreResult;

#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Store `output` unless a result already exists; returns the stored result
    async fn insert_if_absent(&self, job_id: Uuid, output: &FinalOutput)
    -> StoreResult<FinalOutput>;

    async fn find(&self, job_id: Uuid) -> StoreResult<Option<FinalOutput>>;
}

/// Postgres implementation of ResultRepository
pub struct PgResultRepository {
    pool: PgPool,
}

impl PgResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultRepository for PgResultRepository {
    async fn insert_if_absent(
        &self,
        job_id: Uuid,
        output: &FinalOutput,
    ) -> StoreResult<FinalOutput> {
        let row: Option<(String, Vec<String>)> = sqlx::query_as(
            r#"
            WITH inserted AS (
                INSERT INTO task_results (job_id, text, artifacts, finalized_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (job_id) DO NOTHING
                RETURNING text, artifacts
            )
            SELECT text, artifacts FROM inserted
            UNION ALL
            SELECT text, artifacts FROM task_results WHERE job_id = $1
            LIMIT 1
            "#,
        )
        .bind(job_id)
        .bind(&output.text)
        .bind(&output.artifacts)
        .bind(chrono::Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        if let Some((text, artifacts)) = row {
            return Ok(FinalOutput { text, artifacts });
        }

        // A concurrent insert committed after this statement's snapshot was
        // taken; it is visible to a fresh read.
        Ok(self.find(job_id).await?.unwrap_or_else(|| output.clone()))
    }

    async fn find(&self, job_id: Uuid) -> StoreResult<Option<FinalOutput>> {
        let row: Option<(String, Vec<String>)> =
            sqlx::query_as("SELECT text, artifacts FROM task_results WHERE job_id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(text, artifacts)| FinalOutput { text, artifacts }))
    }
}

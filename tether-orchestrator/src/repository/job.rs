//! Job Repository
//!
//! The job runner collaborator: job records plus each job's append-only
//! output log. Output chunks are numbered from 1 per job.

use async_trait::async_trait;
use sqlx::PgPool;
use tether_core::domain::job::{Job, JobResult, JobStatus};
use tether_core::domain::output::OutputSlice;
use tether_core::dto::job::CreateJob;
use uuid::Uuid;

use super::{StoreError, StoreResult, cursor_to_db};

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Create a queued job and return it
    async fn submit(&self, req: CreateJob) -> StoreResult<Job>;

    /// Find a job by ID
    async fn find(&self, job_id: Uuid) -> StoreResult<Option<Job>>;

    /// Jobs in a given status, oldest first
    async fn list_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>>;

    /// Move a queued job to Running; false if it was not queued
    async fn mark_running(&self, job_id: Uuid, runner_id: &str) -> StoreResult<bool>;

    /// Record the final status and result
    ///
    /// Only a job that is still queued or running is completed; false if the
    /// job does not exist or has already finished.
    async fn complete(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<JobResult>,
    ) -> StoreResult<bool>;

    /// Append chunks to the output log, returning the new log length,
    /// or `None` if the job does not exist or has already finished
    async fn append_output(
        &self,
        job_id: Uuid,
        chunks: Vec<serde_json::Value>,
    ) -> StoreResult<Option<u64>>;

    /// Read at most `limit` chunks positioned after `since`
    async fn read_output(&self, job_id: Uuid, since: u64, limit: usize)
    -> StoreResult<OutputSlice>;
}

/// Postgres implementation of JobRepository
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn submit(&self, req: CreateJob) -> StoreResult<Job> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let parameters = serde_json::to_value(&req.parameters)
            .map_err(|e| StoreError::Corrupt(format!("unencodable parameters: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, caller_id, status, requested_at, parameters)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(&req.caller_id)
        .bind(JobStatus::Queued.as_str())
        .bind(now)
        .bind(parameters)
        .execute(&self.pool)
        .await?;

        Ok(Job {
            id,
            caller_id: req.caller_id,
            status: JobStatus::Queued,
            requested_at: now,
            started_at: None,
            completed_at: None,
            runner_id: None,
            parameters: req.parameters,
            result: None,
        })
    }

    async fn find(&self, job_id: Uuid) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, caller_id, status, requested_at, started_at, completed_at,
                   runner_id, parameters, result_success, result_exit_code,
                   result_output, result_error_message
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn list_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, caller_id, status, requested_at, started_at, completed_at,
                   runner_id, parameters, result_success, result_exit_code,
                   result_output, result_error_message
            FROM jobs
            WHERE status = $1
            ORDER BY requested_at ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn mark_running(&self, job_id: Uuid, runner_id: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1, started_at = $2, runner_id = $3
            WHERE id = $4 AND status = $5
            "#,
        )
        .bind(JobStatus::Running.as_str())
        .bind(chrono::Utc::now())
        .bind(runner_id)
        .bind(job_id)
        .bind(JobStatus::Queued.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<JobResult>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1, completed_at = $2,
                result_success = $3, result_exit_code = $4,
                result_output = $5, result_error_message = $6
            WHERE id = $7 AND status IN ($8, $9)
            "#,
        )
        .bind(status.as_str())
        .bind(chrono::Utc::now())
        .bind(result.as_ref().map(|r| r.success))
        .bind(result.as_ref().map(|r| r.exit_code))
        .bind(result.as_ref().and_then(|r| r.output.clone()))
        .bind(result.as_ref().and_then(|r| r.error_message.clone()))
        .bind(job_id)
        .bind(JobStatus::Queued.as_str())
        .bind(JobStatus::Running.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_output(
        &self,
        job_id: Uuid,
        chunks: Vec<serde_json::Value>,
    ) -> StoreResult<Option<u64>> {
        let count = cursor_to_db(chunks.len() as u64)?;
        let mut tx = self.pool.begin().await?;

        // Bumping the counter locks the job row, so concurrent appends get
        // contiguous, non-overlapping sequence numbers and an append
        // serialized after a completion sees the terminal status.
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET output_len = output_len + $1
            WHERE id = $2 AND status IN ($3, $4)
            RETURNING output_len
            "#,
        )
        .bind(count)
        .bind(job_id)
        .bind(JobStatus::Queued.as_str())
        .bind(JobStatus::Running.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((output_len,)) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let now = chrono::Utc::now();
        let first_seq = output_len - count + 1;
        for (offset, chunk) in chunks.into_iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO job_output (job_id, seq, payload, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(job_id)
            .bind(first_seq + offset as i64)
            .bind(chunk)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        u64::try_from(output_len)
            .map(Some)
            .map_err(|_| StoreError::Corrupt(format!("negative output_len for job {}", job_id)))
    }

    async fn read_output(
        &self,
        job_id: Uuid,
        since: u64,
        limit: usize,
    ) -> StoreResult<OutputSlice> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT payload
            FROM job_output
            WHERE job_id = $1 AND seq > $2
            ORDER BY seq ASC
            LIMIT $3
            "#,
        )
        .bind(job_id)
        .bind(cursor_to_db(since)?)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let units: Vec<serde_json::Value> = rows.into_iter().map(|(payload,)| payload).collect();
        let next_cursor = since + units.len() as u64;

        Ok(OutputSlice { units, next_cursor })
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    caller_id: String,
    status: String,
    requested_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    runner_id: Option<String>,
    parameters: serde_json::Value,
    result_success: Option<bool>,
    result_exit_code: Option<i32>,
    result_output: Option<serde_json::Value>,
    result_error_message: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!("job {} has unknown status {}", row.id, row.status))
        })?;

        let result = row.result_success.map(|success| JobResult {
            success,
            exit_code: row.result_exit_code.unwrap_or(0),
            output: row.result_output,
            error_message: row.result_error_message,
        });

        let parameters = serde_json::from_value(row.parameters).unwrap_or_default();

        Ok(Job {
            id: row.id,
            caller_id: row.caller_id,
            status,
            requested_at: row.requested_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            runner_id: row.runner_id,
            parameters,
            result,
        })
    }
}

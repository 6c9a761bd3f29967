//! Job Service
//!
//! Business logic for the runner side of the job lifecycle: claiming queued
//! jobs, streaming output and reporting completion.

use tether_core::domain::job::{Job, JobResult, JobStatus};
use uuid::Uuid;

use crate::repository::{StoreError, bounded};
use crate::service::finalize;
use crate::state::AppState;

/// Most chunks accepted in one output batch
pub const MAX_CHUNKS_PER_BATCH: usize = 1000;

/// Largest accepted chunk, measured as serialized JSON
pub const MAX_CHUNK_BYTES: usize = 64 * 1024;

/// Service error type
#[derive(Debug)]
pub enum JobError {
    NotFound(Uuid),
    InvalidState(String),
    ValidationError(String),
    StoreError(StoreError),
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        JobError::StoreError(err)
    }
}

/// Get a job by ID
pub async fn get_job(state: &AppState, id: Uuid) -> Result<Job, JobError> {
    let job = bounded(state.config.store_timeout, "job read", state.stores.jobs.find(id))
        .await?
        .ok_or(JobError::NotFound(id))?;

    Ok(job)
}

/// List jobs waiting for a runner
pub async fn list_scheduled(state: &AppState) -> Result<Vec<Job>, JobError> {
    let jobs = bounded(
        state.config.store_timeout,
        "job listing",
        state.stores.jobs.list_by_status(JobStatus::Queued),
    )
    .await?;
    Ok(jobs)
}

/// Reserve a job for execution by a runner
pub async fn reserve_job_for_execution(
    state: &AppState,
    job_id: Uuid,
    runner_id: &str,
) -> Result<Job, JobError> {
    let timeout = state.config.store_timeout;
    let job = get_job(state, job_id).await?;

    if job.status != JobStatus::Queued {
        return Err(JobError::InvalidState(format!(
            "Job {} is not in Queued state (current: {:?})",
            job_id, job.status
        )));
    }

    // Another runner may claim it between the read and the update
    let claimed = bounded(
        timeout,
        "job claim",
        state.stores.jobs.mark_running(job_id, runner_id),
    )
    .await?;
    if !claimed {
        return Err(JobError::InvalidState(format!(
            "Job {} was claimed by another runner",
            job_id
        )));
    }

    tracing::info!("Job {} reserved by runner {}", job_id, runner_id);

    get_job(state, job_id).await
}

/// Append a batch of output chunks, returning the new output length
pub async fn append_output(
    state: &AppState,
    job_id: Uuid,
    chunks: Vec<serde_json::Value>,
) -> Result<u64, JobError> {
    validate_output_batch(&chunks)?;

    let job = get_job(state, job_id).await?;
    if job.status.is_terminal() {
        return Err(JobError::InvalidState(format!(
            "Job {} already finished ({:?})",
            job_id, job.status
        )));
    }

    let batch_len = chunks.len();
    let output_len = bounded(
        state.config.store_timeout,
        "output append",
        state.stores.jobs.append_output(job_id, chunks),
    )
    .await?
    .ok_or_else(|| {
        JobError::InvalidState(format!("Job {} is no longer accepting output", job_id))
    })?;

    tracing::debug!(
        "Appended {} chunk(s) to job {} (length {})",
        batch_len,
        job_id,
        output_len
    );

    Ok(output_len)
}

/// Complete a job with final status and result
pub async fn complete_job(
    state: &AppState,
    job_id: Uuid,
    status: JobStatus,
    result: Option<JobResult>,
) -> Result<(), JobError> {
    validate_completion_status(status)?;

    let job = get_job(state, job_id).await?;
    if job.status.is_terminal() {
        return Err(JobError::InvalidState(format!(
            "Job {} already finished ({:?})",
            job_id, job.status
        )));
    }
    if job.status != JobStatus::Running {
        tracing::warn!(
            "Completing job {} that is not in Running state (current: {:?})",
            job_id,
            job.status
        );
    }

    // Another completion may land between the read and the update
    let updated = bounded(
        state.config.store_timeout,
        "job completion",
        state.stores.jobs.complete(job_id, status, result),
    )
    .await?;
    if !updated {
        return Err(JobError::InvalidState(format!(
            "Job {} was completed concurrently",
            job_id
        )));
    }

    tracing::info!("Job {} completed with status: {:?}", job_id, status);

    // Persist the final output now in case its caller never polls again
    if let Err(err) = finalize::finalize(state, job_id).await {
        tracing::error!("Failed to finalize job {}: {}", job_id, err);
    }

    Ok(())
}

// =============================================================================
// Validation
// =============================================================================

fn validate_completion_status(status: JobStatus) -> Result<(), JobError> {
    match status {
        JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut | JobStatus::Cancelled => {
            Ok(())
        }
        _ => Err(JobError::ValidationError(format!(
            "Invalid completion status: {:?}",
            status
        ))),
    }
}

fn validate_output_batch(chunks: &[serde_json::Value]) -> Result<(), JobError> {
    if chunks.is_empty() {
        return Err(JobError::ValidationError(
            "Output batch cannot be empty".to_string(),
        ));
    }

    if chunks.len() > MAX_CHUNKS_PER_BATCH {
        return Err(JobError::ValidationError(format!(
            "Too many chunks in one batch (max {})",
            MAX_CHUNKS_PER_BATCH
        )));
    }

    for (index, chunk) in chunks.iter().enumerate() {
        let size = serde_json::to_vec(chunk).map(|bytes| bytes.len()).unwrap_or(usize::MAX);
        if size > MAX_CHUNK_BYTES {
            return Err(JobError::ValidationError(format!(
                "Chunk {} is too large ({} bytes, max {})",
                index, size, MAX_CHUNK_BYTES
            )));
        }
    }

    Ok(())
}

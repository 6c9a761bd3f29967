//! Job API Handlers
//!
//! Runner-facing endpoints for the job lifecycle. Every handler takes the
//! [`Runner`] extractor, so browsers cannot read jobs or push output.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tether_core::domain::job::Job;
use tether_core::dto::job::{
    AppendOutputResponse, CompleteJobRequest, ExecuteJobRequest, JobExecutionInfo,
};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::session::Runner;
use crate::service::job_service::{self, JobError};
use crate::state::AppState;

/// GET /job/{id}
/// Get job details by ID
pub async fn get_job(
    _runner: Runner,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    tracing::debug!("Getting job: {}", id);

    let job = job_service::get_job(&state, id).await.map_err(job_error)?;

    Ok(Json(job))
}

/// GET /job/list/scheduled
/// List all scheduled (queued) jobs
///
/// Query parameters:
/// - `runner_id` (optional): only used for logging
pub async fn list_scheduled_jobs(
    _runner: Runner,
    State(state): State<AppState>,
    Query(params): Query<ScheduledJobsQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    if let Some(runner_id) = &params.runner_id {
        tracing::debug!("Listing scheduled jobs for runner: {}", runner_id);
    } else {
        tracing::debug!("Listing all scheduled jobs");
    }

    let jobs = job_service::list_scheduled(&state).await.map_err(job_error)?;

    Ok(Json(jobs))
}

#[derive(Debug, Deserialize)]
pub struct ScheduledJobsQuery {
    pub runner_id: Option<String>,
}

/// POST /job/execute/{id}
/// Reserve a job for execution by a runner
pub async fn execute_job(
    _runner: Runner,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ExecuteJobRequest>,
) -> ApiResult<Json<JobExecutionInfo>> {
    tracing::info!("Runner {} executing job: {}", req.runner_id, id);

    let job = job_service::reserve_job_for_execution(&state, id, &req.runner_id)
        .await
        .map_err(job_error)?;

    Ok(Json(JobExecutionInfo {
        job_id: job.id,
        parameters: job.parameters,
    }))
}

/// POST /job/{id}/output
/// Append a batch of output chunks to a running job
pub async fn append_job_output(
    _runner: Runner,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(chunks): Json<Vec<serde_json::Value>>,
) -> ApiResult<(StatusCode, Json<AppendOutputResponse>)> {
    tracing::debug!("Adding {} output chunk(s) for job: {}", chunks.len(), id);

    let output_len = job_service::append_output(&state, id, chunks)
        .await
        .map_err(job_error)?;

    Ok((StatusCode::CREATED, Json(AppendOutputResponse { output_len })))
}

/// POST /job/{id}/complete
/// Mark a job as complete with final status and result
pub async fn complete_job(
    _runner: Runner,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteJobRequest>,
) -> ApiResult<StatusCode> {
    tracing::info!("Completing job: {} with status {:?}", id, req.status);

    job_service::complete_job(&state, id, req.status, req.result)
        .await
        .map_err(job_error)?;

    Ok(StatusCode::NO_CONTENT)
}

fn job_error(err: JobError) -> ApiError {
    match err {
        JobError::NotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
        JobError::InvalidState(msg) => ApiError::BadRequest(msg),
        JobError::ValidationError(msg) => ApiError::BadRequest(msg),
        JobError::StoreError(err) => ApiError::StoreError(err),
    }
}

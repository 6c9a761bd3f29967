//! Job DTOs for the runner-facing endpoints

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{JobResult, JobStatus};

/// Request to create a new job on behalf of a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub caller_id: String,
    pub parameters: std::collections::HashMap<String, serde_json::Value>,
}

/// Runner claiming a queued job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteJobRequest {
    pub runner_id: String,
}

/// Everything a runner needs to start executing a claimed job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionInfo {
    pub job_id: Uuid,
    pub parameters: std::collections::HashMap<String, serde_json::Value>,
}

/// Final status reported by a runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteJobRequest {
    pub status: JobStatus,
    pub result: Option<JobResult>,
}

/// Acknowledgement of an output batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AppendOutputResponse {
    /// Total number of chunks in the job's output log after the append
    pub output_len: u64,
}

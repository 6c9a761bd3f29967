//! Job-related API endpoints used by runners
//!
//! Every request carries the token set with [`TetherClient::runner_token`].

use crate::TetherClient;
use crate::error::{ClientError, Result};
use tether_core::domain::job::{Job, JobResult, JobStatus};
use tether_core::dto::job::{
    AppendOutputResponse, CompleteJobRequest, ExecuteJobRequest, JobExecutionInfo,
};
use uuid::Uuid;

impl TetherClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Get a job by ID
    ///
    /// # Arguments
    /// * `job_id` - The job UUID
    ///
    /// # Returns
    /// The job details
    pub async fn get_job(&self, job_id: Uuid) -> Result<Job> {
        let url = format!("{}/job/{}", self.base_url, job_id);
        let response = self.runner_request(self.client.get(&url)).send().await?;

        self.handle_response(response).await
    }

    /// List all scheduled (queued) jobs
    ///
    /// # Returns
    /// A list of scheduled jobs, oldest first
    pub async fn list_scheduled_jobs(&self) -> Result<Vec<Job>> {
        let url = format!("{}/job/list/scheduled", self.base_url);
        let response = self.runner_request(self.client.get(&url)).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Job Execution (Runner-specific)
    // =============================================================================

    /// Claim a job for execution by a runner
    ///
    /// # Arguments
    /// * `job_id` - The ID of the job to claim
    /// * `runner_id` - The ID of the runner claiming the job
    ///
    /// # Returns
    /// Information needed to execute the job
    pub async fn claim_job(&self, job_id: Uuid, runner_id: &str) -> Result<JobExecutionInfo> {
        let url = format!("{}/job/execute/{}", self.base_url, job_id);
        let response = self
            .runner_request(self.client.post(&url))
            .json(&ExecuteJobRequest {
                runner_id: runner_id.to_string(),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Append output chunks to a running job
    ///
    /// # Returns
    /// The total number of chunks in the job's output after the append
    pub async fn append_output(&self, job_id: Uuid, chunks: Vec<serde_json::Value>) -> Result<u64> {
        if chunks.is_empty() {
            return Err(ClientError::InvalidRequest(
                "Output batch cannot be empty".to_string(),
            ));
        }

        let url = format!("{}/job/{}/output", self.base_url, job_id);
        let response = self.runner_request(self.client.post(&url)).json(&chunks).send().await?;

        let ack: AppendOutputResponse = self.handle_response(response).await?;
        Ok(ack.output_len)
    }

    /// Complete a job with the execution result
    ///
    /// # Arguments
    /// * `job_id` - The ID of the job that completed
    /// * `status` - The terminal status to record
    /// * `result` - The execution result, if any
    pub async fn complete_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<JobResult>,
    ) -> Result<()> {
        let url = format!("{}/job/{}/complete", self.base_url, job_id);
        let response = self
            .runner_request(self.client.post(&url))
            .json(&CompleteJobRequest { status, result })
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    fn runner_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.runner_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

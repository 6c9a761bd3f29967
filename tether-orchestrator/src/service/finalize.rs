//! Finalization Service
//!
//! Turns the raw result of a finished job into the text shown to the caller
//! and persists it once. Both the poll path and the runner's completion path
//! call in here, so every operation is idempotent.

use serde_json::Value;
use tether_core::domain::job::Job;
use tether_core::domain::output::FinalOutput;
use uuid::Uuid;

use crate::repository::{StoreResult, bounded};
use crate::state::AppState;

const RESOURCES_HEADING: &str = "Resources";

/// Finalize a job by id
///
/// Returns `None` if the job does not exist or is not finished yet.
pub async fn finalize(state: &AppState, job_id: Uuid) -> StoreResult<Option<FinalOutput>> {
    let job = bounded(
        state.config.store_timeout,
        "job read",
        state.stores.jobs.find(job_id),
    )
    .await?;

    match job {
        Some(job) => finalize_job(state, &job).await,
        None => Ok(None),
    }
}

/// Finalize an already loaded job
///
/// The first stored output wins; later calls return it unchanged.
pub async fn finalize_job(state: &AppState, job: &Job) -> StoreResult<Option<FinalOutput>> {
    if !job.status.is_terminal() {
        return Ok(None);
    }

    let rendered = render_final_output(job);
    let stored = bounded(
        state.config.store_timeout,
        "result write",
        state.stores.results.insert_if_absent(job.id, &rendered),
    )
    .await?;

    tracing::debug!("Job {} finalized ({} artifact(s))", job.id, stored.artifacts.len());

    Ok(Some(stored))
}

/// Render the caller-facing output of a finished job
pub fn render_final_output(job: &Job) -> FinalOutput {
    let normalized = job
        .result
        .as_ref()
        .and_then(|result| result.output.as_ref())
        .map(normalize_output)
        .unwrap_or_default();

    let mut text = append_artifacts(&normalized.text, &normalized.artifacts);

    if job.status.is_failure() && text.trim().is_empty() {
        text = job
            .result
            .as_ref()
            .and_then(|result| result.error_message.clone())
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| format!("Job {}", job.status.as_str()));
    }

    FinalOutput {
        text,
        artifacts: normalized.artifacts,
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Normalize a raw job output into text plus artifact paths
fn normalize_output(raw: &Value) -> FinalOutput {
    match raw {
        Value::String(raw_text) => match serde_json::from_str::<Value>(raw_text) {
            Ok(parsed) => normalize_output(&parsed),
            Err(_) => FinalOutput {
                text: raw_text.clone(),
                artifacts: Vec::new(),
            },
        },
        Value::Object(fields) => {
            let artifacts = fields
                .get("artifacts")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .filter(|path| !path.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default();

            match fields.get("text").and_then(Value::as_str) {
                Some(text) if !text.is_empty() => FinalOutput {
                    text: text.to_string(),
                    artifacts,
                },
                _ => {
                    let pretty = serde_json::to_string_pretty(raw).unwrap_or_default();
                    FinalOutput {
                        text: format!("```json\n{}\n```", pretty),
                        artifacts,
                    }
                }
            }
        }
        _ => FinalOutput::default(),
    }
}

/// Append artifact paths the text does not mention yet
fn append_artifacts(text: &str, artifacts: &[String]) -> String {
    let missing: Vec<&String> = artifacts
        .iter()
        .filter(|path| !text.contains(path.as_str()))
        .collect();

    if missing.is_empty() {
        return text.to_string();
    }

    let lines = missing
        .iter()
        .map(|path| format!("- `{}`", path))
        .collect::<Vec<_>>()
        .join("\n");

    let body = text.trim();
    if body.is_empty() {
        format!("{}\n{}", RESOURCES_HEADING, lines)
    } else {
        format!("{}\n\n{}\n{}", body, RESOURCES_HEADING, lines)
    }
}

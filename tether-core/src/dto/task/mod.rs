//! Task DTOs for the browser-facing submission and polling endpoints
//!
//! These bodies use camelCase field names on the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::JobStatus;
use crate::domain::output::{FinalOutput, OutputChunk};
use crate::domain::task::RejectReason;

/// Request to submit a background task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitTask {
    #[serde(default)]
    pub parameters: std::collections::HashMap<String, serde_json::Value>,
}

/// Accepted task together with the initial signed cursor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAccepted {
    pub job_id: Uuid,
    pub cursor: u64,
    pub cursor_sig: String,
}

/// Query string of a poll request
///
/// `cursor` is kept as raw text; anything that is not a non-negative integer
/// is treated as 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollQuery {
    pub cursor: Option<String>,
    pub cursor_sig: Option<String>,
}

impl PollQuery {
    pub fn normalized_cursor(&self) -> u64 {
        self.cursor
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(0)
    }

    /// The signature with surrounding whitespace removed, if non-empty
    pub fn normalized_sig(&self) -> Option<String> {
        self.cursor_sig
            .as_deref()
            .map(str::trim)
            .filter(|sig| !sig.is_empty())
            .map(ToString::to_string)
    }
}

/// Output delivered by one poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalPayload {
    pub reasoning_text: String,
    pub text: String,
}

impl IncrementalPayload {
    /// Concatenate the deltas of all recognised chunks, in order
    pub fn from_units(units: &[serde_json::Value]) -> Self {
        let mut payload = Self::default();
        for chunk in units.iter().filter_map(OutputChunk::decode) {
            match chunk {
                OutputChunk::TextDelta { delta } => payload.text.push_str(&delta),
                OutputChunk::ReasoningDelta { delta } => payload.reasoning_text.push_str(&delta),
            }
        }
        payload
    }
}

/// Successful poll response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub status: JobStatus,
    pub is_completed: bool,
    pub is_failed: bool,
    pub next_cursor: u64,
    pub next_cursor_sig: String,
    pub incremental_payload: IncrementalPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<FinalOutput>,
    pub error: Option<String>,
}

/// Body of a refused poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub error: String,
    pub cause: RejectReason,
}

impl Rejection {
    pub fn forbidden(cause: RejectReason) -> Self {
        Self {
            error: "Forbidden".to_string(),
            cause,
        }
    }
}

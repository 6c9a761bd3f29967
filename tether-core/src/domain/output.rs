//! Job output domain types
//!
//! A job's output is an append-only log of JSON chunks. Chunks are numbered
//! from 1 in append order; a cursor value `c` means chunks `1..=c` have
//! already been delivered.

use serde::{Deserialize, Serialize};

/// A recognised output chunk
///
/// Runners may append any JSON value; values that don't decode into one of
/// these variants still occupy a position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutputChunk {
    TextDelta { delta: String },
    ReasoningDelta { delta: String },
}

impl OutputChunk {
    /// Decode a raw chunk, returning `None` for unrecognised shapes
    pub fn decode(raw: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(raw.clone()).ok()
    }
}

/// Chunks read from a job's output log starting just past a cursor
#[derive(Debug, Clone, Default)]
pub struct OutputSlice {
    pub units: Vec<serde_json::Value>,
    pub next_cursor: u64,
}

impl OutputSlice {
    /// An empty read that leaves the cursor where it was
    pub fn empty(cursor: u64) -> Self {
        Self {
            units: Vec::new(),
            next_cursor: cursor,
        }
    }
}

/// Normalised final output of a finished job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalOutput {
    pub text: String,
    pub artifacts: Vec<String>,
}

//! Task polling domain types
//!
//! Ownership binds a job to the caller and session allowed to poll it;
//! cursor state tracks how much output that session has acknowledged.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Binding of a job to the single caller/session allowed to poll it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub job_id: Uuid,
    pub caller_id: String,
    pub session_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Last acknowledged cursor for a (job, session) pair and the token issued with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorState {
    pub cursor: u64,
    pub signature: String,
}

/// Why a poll was refused
///
/// The wire codes are stable; clients branch on them to decide between
/// re-establishing their session and resyncing authoritative state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingCursorSig,
    MissingTaskSession,
    TaskOwnerNotFound,
    TaskOwnerMismatch,
    TaskSessionMismatch,
    InvalidCursorSig,
    StaleCursorState,
    RunPayloadUserMismatch,
    CursorAdvanceConflict,
}

/// Broad class of a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectClass {
    /// The caller is not allowed to poll this job; terminal for the poll
    Authorization,
    /// The request lost to a newer state; refetch authoritative state
    ReplayOrStale,
}

impl RejectReason {
    #[cfg(test)]
    const ALL: [RejectReason; 9] = [
        RejectReason::MissingCursorSig,
        RejectReason::MissingTaskSession,
        RejectReason::TaskOwnerNotFound,
        RejectReason::TaskOwnerMismatch,
        RejectReason::TaskSessionMismatch,
        RejectReason::InvalidCursorSig,
        RejectReason::StaleCursorState,
        RejectReason::RunPayloadUserMismatch,
        RejectReason::CursorAdvanceConflict,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::MissingCursorSig => "missing_cursor_sig",
            RejectReason::MissingTaskSession => "missing_task_session",
            RejectReason::TaskOwnerNotFound => "task_owner_not_found",
            RejectReason::TaskOwnerMismatch => "task_owner_mismatch",
            RejectReason::TaskSessionMismatch => "task_session_mismatch",
            RejectReason::InvalidCursorSig => "invalid_cursor_sig",
            RejectReason::StaleCursorState => "stale_cursor_state",
            RejectReason::RunPayloadUserMismatch => "run_payload_user_mismatch",
            RejectReason::CursorAdvanceConflict => "cursor_advance_conflict",
        }
    }

    #[cfg(test)]
    fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|reason| reason.as_str() == code)
    }

    pub fn class(self) -> RejectClass {
        match self {
            RejectReason::StaleCursorState | RejectReason::CursorAdvanceConflict => {
                RejectClass::ReplayOrStale
            }
            _ => RejectClass::Authorization,
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

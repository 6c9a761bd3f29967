//! Task Service
//!
//! Submission and signed-cursor polling of background tasks.
//!
//! A poll is accepted only if the caller owns the task from the same browser
//! session, the presented cursor token verifies, and the (cursor, token) pair
//! is exactly the one last issued for that session. Each accepted poll
//! rotates the token through a compare-and-swap, so a token is good for one
//! poll and concurrent polls with the same token have exactly one winner.

use subtle::ConstantTimeEq;
use tether_core::domain::job::{Job, JobStatus};
use tether_core::domain::output::{FinalOutput, OutputSlice};
use tether_core::domain::task::{CursorState, OwnershipRecord, RejectReason};
use tether_core::dto::job::CreateJob;
use tether_core::dto::task::{IncrementalPayload, PollResponse, SubmitTask, TaskAccepted};
use uuid::Uuid;

use crate::repository::{StoreError, bounded};
use crate::security::SigningError;
use crate::security::session::hash_session_id;
use crate::service::finalize;
use crate::state::AppState;

/// Service error type
#[derive(Debug)]
pub enum TaskError {
    /// The request was refused; the reason is safe to return to the caller
    Rejected(RejectReason),
    StoreError(StoreError),
    SigningError(SigningError),
}

impl From<StoreError> for TaskError {
    fn from(err: StoreError) -> Self {
        TaskError::StoreError(err)
    }
}

impl From<SigningError> for TaskError {
    fn from(err: SigningError) -> Self {
        TaskError::SigningError(err)
    }
}

impl From<RejectReason> for TaskError {
    fn from(reason: RejectReason) -> Self {
        TaskError::Rejected(reason)
    }
}

/// Who is polling: the authenticated caller and their browser session
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub caller_id: String,
    pub session_id: Option<String>,
}

/// A normalized poll request
#[derive(Debug, Clone)]
pub struct PollRequest {
    pub job_id: Uuid,
    pub cursor: u64,
    pub cursor_sig: Option<String>,
}

/// Submit a task on behalf of `caller_id` from the session `session_id`
///
/// Records ownership and seeds the session's cursor state with a token for
/// cursor 0.
pub async fn submit_task(
    state: &AppState,
    caller_id: &str,
    session_id: &str,
    req: SubmitTask,
) -> Result<TaskAccepted, TaskError> {
    let timeout = state.config.store_timeout;
    let session_hash = hash_session_id(session_id);

    let job = bounded(
        timeout,
        "job submission",
        state.stores.jobs.submit(CreateJob {
            caller_id: caller_id.to_string(),
            parameters: req.parameters,
        }),
    )
    .await?;

    let record = OwnershipRecord {
        job_id: job.id,
        caller_id: caller_id.to_string(),
        session_hash: session_hash.clone(),
        created_at: chrono::Utc::now(),
    };
    bounded(
        timeout,
        "ownership write",
        state.stores.owners.record(&record, state.config.owner_ttl),
    )
    .await?;

    let cursor_sig = state.signer.issue(job.id, &session_hash, 0)?;
    let initial = CursorState {
        cursor: 0,
        signature: cursor_sig.clone(),
    };
    bounded(
        timeout,
        "cursor initialization",
        state
            .stores
            .cursors
            .initialize(job.id, &session_hash, &initial, state.config.owner_ttl),
    )
    .await?;

    tracing::info!("Task {} submitted by caller {}", job.id, caller_id);

    Ok(TaskAccepted {
        job_id: job.id,
        cursor: 0,
        cursor_sig,
    })
}

/// Poll a task for output produced since `req.cursor`
///
/// Checks run in a fixed order and the first failing one decides the
/// rejection reason.
pub async fn poll(
    state: &AppState,
    identity: &SessionIdentity,
    req: PollRequest,
) -> Result<PollResponse, TaskError> {
    let timeout = state.config.store_timeout;
    let job_id = req.job_id;

    let cursor_sig = req
        .cursor_sig
        .as_deref()
        .map(str::trim)
        .filter(|sig| !sig.is_empty())
        .ok_or(RejectReason::MissingCursorSig)?;

    let session_id = identity
        .session_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or(RejectReason::MissingTaskSession)?;
    let session_hash = hash_session_id(session_id);

    // Ownership
    let owner = bounded(timeout, "ownership read", state.stores.owners.find(job_id))
        .await?
        .ok_or(RejectReason::TaskOwnerNotFound)?;
    if owner.caller_id != identity.caller_id {
        return Err(reject(job_id, RejectReason::TaskOwnerMismatch));
    }
    if owner.session_hash != session_hash {
        return Err(reject(job_id, RejectReason::TaskSessionMismatch));
    }

    // Token
    if !state
        .signer
        .verify(cursor_sig, job_id, &session_hash, req.cursor)
    {
        return Err(reject(job_id, RejectReason::InvalidCursorSig));
    }

    // Stored cursor state
    let current = bounded(
        timeout,
        "cursor read",
        state.stores.cursors.read(job_id, &session_hash),
    )
    .await?;
    let expected = CursorState {
        cursor: req.cursor,
        signature: cursor_sig.to_string(),
    };
    if !current.is_some_and(|stored| matches_state(&stored, &expected)) {
        return Err(reject(job_id, RejectReason::StaleCursorState));
    }

    // Runner-side job record
    let job = bounded(timeout, "job read", state.stores.jobs.find(job_id))
        .await?
        .filter(|job| job.caller_id == identity.caller_id)
        .ok_or_else(|| reject(job_id, RejectReason::RunPayloadUserMismatch))?;

    let slice = read_increment(state, job_id, req.cursor).await;
    let next_cursor = slice.next_cursor;
    let next_cursor_sig = state.signer.issue(job_id, &session_hash, next_cursor)?;
    let next = CursorState {
        cursor: next_cursor,
        signature: next_cursor_sig.clone(),
    };

    let advanced = bounded(
        timeout,
        "cursor swap",
        state.stores.cursors.compare_and_swap(
            job_id,
            &session_hash,
            &expected,
            &next,
            state.config.owner_ttl,
        ),
    )
    .await?;
    if !advanced {
        return Err(reject(job_id, RejectReason::CursorAdvanceConflict));
    }

    tracing::debug!(
        "Task {} advanced {} -> {} ({} unit(s))",
        job_id,
        req.cursor,
        next_cursor,
        slice.units.len()
    );

    let final_output = if job.status == JobStatus::Succeeded {
        final_output_for(state, &job).await
    } else {
        None
    };

    Ok(PollResponse {
        status: job.status,
        is_completed: job.status == JobStatus::Succeeded,
        is_failed: job.status.is_failure(),
        next_cursor,
        next_cursor_sig,
        incremental_payload: IncrementalPayload::from_units(&slice.units),
        final_output,
        error: job.result.and_then(|result| result.error_message),
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

fn reject(job_id: Uuid, reason: RejectReason) -> TaskError {
    tracing::warn!("Poll of task {} rejected: {}", job_id, reason);
    TaskError::Rejected(reason)
}

/// Exact match on cursor and signature, the signature compared in constant time
fn matches_state(stored: &CursorState, expected: &CursorState) -> bool {
    stored.cursor == expected.cursor
        && bool::from(
            stored
                .signature
                .as_bytes()
                .ct_eq(expected.signature.as_bytes()),
        )
}

/// Read output past `cursor`, treating a slow or failed read as no new output
async fn read_increment(state: &AppState, job_id: Uuid, cursor: u64) -> OutputSlice {
    let read = state
        .stores
        .jobs
        .read_output(job_id, cursor, state.config.max_units_per_poll);

    match tokio::time::timeout(state.config.output_read_timeout, read).await {
        Ok(Ok(slice)) if slice.next_cursor >= cursor => slice,
        Ok(Ok(slice)) => {
            tracing::warn!(
                "Output read for task {} went backwards ({} < {}), ignoring",
                job_id,
                slice.next_cursor,
                cursor
            );
            OutputSlice::empty(cursor)
        }
        Ok(Err(err)) => {
            tracing::warn!("Transient output read failure for task {}: {}", job_id, err);
            OutputSlice::empty(cursor)
        }
        Err(_) => {
            tracing::warn!("Output read for task {} timed out", job_id);
            OutputSlice::empty(cursor)
        }
    }
}

/// Persisted final output, or a freshly rendered one if persisting fails
async fn final_output_for(state: &AppState, job: &Job) -> Option<FinalOutput> {
    match finalize::finalize_job(state, job).await {
        Ok(output) => output,
        Err(err) => {
            tracing::error!("Failed to persist final output of task {}: {}", job.id, err);
            Some(finalize::render_final_output(job))
        }
    }
}

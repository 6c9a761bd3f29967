//! Task API Handlers
//!
//! Browser-facing endpoints for submitting tasks and polling their output.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderValue, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use tether_core::dto::task::{PollQuery, PollResponse, SubmitTask};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::session::Caller;
use crate::security::session::{new_session_id, session_cookie};
use crate::service::task_service::{self, PollRequest, TaskError};
use crate::state::AppState;

/// POST /tasks
/// Submit a task; mints a session cookie if the browser has none yet
pub async fn submit_task(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(req): Json<SubmitTask>,
) -> ApiResult<Response> {
    let (session_id, minted) = match identity.session_id {
        Some(session_id) => (session_id, false),
        None => (new_session_id(), true),
    };

    let accepted = task_service::submit_task(&state, &identity.caller_id, &session_id, req)
        .await
        .map_err(task_error)?;

    let mut response = Json(accepted).into_response();
    if minted {
        let cookie = session_cookie(
            &state.config.session_cookie,
            &session_id,
            state.config.session_cookie_secure,
        );
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::InternalError(format!("Invalid session cookie: {}", e)))?;
        response.headers_mut().append(SET_COOKIE, value);
    }

    Ok(response)
}

/// GET /tasks/{job_id}?cursor=&cursor_sig=
/// Poll a task for output produced since `cursor`
pub async fn poll_task(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(job_id): Path<Uuid>,
    Query(query): Query<PollQuery>,
) -> ApiResult<Json<PollResponse>> {
    let req = PollRequest {
        job_id,
        cursor: query.normalized_cursor(),
        cursor_sig: query.normalized_sig(),
    };

    let response = task_service::poll(&state, &identity, req)
        .await
        .map_err(task_error)?;

    Ok(Json(response))
}

fn task_error(err: TaskError) -> ApiError {
    match err {
        TaskError::Rejected(reason) => ApiError::Forbidden(reason),
        TaskError::StoreError(err) => ApiError::StoreError(err),
        TaskError::SigningError(err) => ApiError::InternalError(format!("Signing failed: {}", err)),
    }
}

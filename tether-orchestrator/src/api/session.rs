//! Caller extraction
//!
//! The caller id comes from a header set by the authenticating gateway in
//! front of this service; the browser session id comes from a cookie.
//! Runners authenticate separately with a shared bearer token.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use subtle::ConstantTimeEq;

use crate::api::error::ApiError;
use crate::security::session::read_cookie;
use crate::service::task_service::SessionIdentity;
use crate::state::AppState;

/// Authenticated caller plus their session id, if the cookie is present
///
/// Rejects the request with 401 when the caller header is missing or blank.
#[derive(Debug, Clone)]
pub struct Caller(pub SessionIdentity);

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let caller_id = parts
            .headers
            .get(state.config.caller_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ApiError::Unauthorized)?
            .to_string();

        let cookies = parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");
        let session_id = read_cookie(Some(cookies.as_str()), &state.config.session_cookie);

        Ok(Caller(SessionIdentity {
            caller_id,
            session_id,
        }))
    }
}

/// A request made by a task runner
///
/// Rejects the request with 401 unless it carries `Authorization: Bearer`
/// with the configured runner token. With no token configured every request
/// is refused.
#[derive(Debug, Clone, Copy)]
pub struct Runner;

impl FromRequestParts<AppState> for Runner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.runner_token.as_deref() else {
            tracing::warn!("Runner request refused: no runner token configured");
            return Err(ApiError::Unauthorized);
        };

        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(ApiError::Unauthorized)?;

        if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(Runner)
        } else {
            tracing::warn!("Runner request refused: bad token");
            Err(ApiError::Unauthorized)
        }
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    header
        .trim()
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

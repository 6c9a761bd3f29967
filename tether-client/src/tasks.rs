//! Task submission and polling endpoints

use reqwest::header::{COOKIE, SET_COOKIE};
use tether_core::dto::task::{PollResponse, SubmitTask, TaskAccepted};
use uuid::Uuid;

use crate::TetherClient;
use crate::error::{ClientError, Result};

/// Who the requests are made for
///
/// `session_id` mirrors the browser's session cookie. It is filled in from
/// the response when the orchestrator mints a new session on submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub caller_id: String,
    pub session_id: Option<String>,
}

impl Identity {
    /// A caller without a session yet
    pub fn new(caller_id: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            session_id: None,
        }
    }

    /// A caller continuing an existing session
    pub fn with_session(caller_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            session_id: Some(session_id.into()),
        }
    }
}

/// A submitted task together with the cursor to present on the next poll
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub job_id: Uuid,
    pub identity: Identity,
    pub cursor: u64,
    pub cursor_sig: String,
}

impl TaskHandle {
    /// Move to the cursor issued by a successful poll
    pub fn advance(&mut self, response: &PollResponse) {
        self.cursor = response.next_cursor;
        self.cursor_sig = response.next_cursor_sig.clone();
    }
}

impl TetherClient {
    // =============================================================================
    // Tasks
    // =============================================================================

    /// Submit a task
    ///
    /// If `identity` has no session, the session minted by the orchestrator
    /// is stored in the returned handle.
    pub async fn submit_task(&self, identity: &Identity, req: SubmitTask) -> Result<TaskHandle> {
        let url = format!("{}/tasks", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header(self.caller_header.as_str(), identity.caller_id.as_str())
            .json(&req);
        if let Some(cookie) = self.cookie_header(identity) {
            request = request.header(COOKIE, cookie);
        }
        let response = request.send().await?;

        let minted = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| session_from_set_cookie(value, &self.session_cookie));

        let accepted: TaskAccepted = self.handle_response(response).await?;

        let mut identity = identity.clone();
        if let Some(session_id) = minted {
            tracing::debug!("Orchestrator started a new session");
            identity.session_id = Some(session_id);
        }

        Ok(TaskHandle {
            job_id: accepted.job_id,
            identity,
            cursor: accepted.cursor,
            cursor_sig: accepted.cursor_sig,
        })
    }

    /// Poll a task once, advancing the handle on success
    ///
    /// On [`ClientError::Rejected`] the handle is left unchanged.
    pub async fn poll(&self, handle: &mut TaskHandle) -> Result<PollResponse> {
        let response = self
            .poll_task(
                &handle.identity,
                handle.job_id,
                handle.cursor,
                &handle.cursor_sig,
            )
            .await?;
        handle.advance(&response);
        Ok(response)
    }

    /// Poll a task with an explicit cursor and token
    pub async fn poll_task(
        &self,
        identity: &Identity,
        job_id: Uuid,
        cursor: u64,
        cursor_sig: &str,
    ) -> Result<PollResponse> {
        let cookie = self.cookie_header(identity).ok_or_else(|| {
            ClientError::InvalidRequest("Polling requires a session id".to_string())
        })?;

        let url = format!("{}/tasks/{}", self.base_url, job_id);
        let response = self
            .client
            .get(&url)
            .query(&[("cursor", cursor.to_string()), ("cursor_sig", cursor_sig.to_string())])
            .header(self.caller_header.as_str(), identity.caller_id.as_str())
            .header(COOKIE, cookie)
            .send()
            .await?;

        self.handle_response(response).await
    }

    fn cookie_header(&self, identity: &Identity) -> Option<String> {
        identity
            .session_id
            .as_ref()
            .map(|session_id| format!("{}={}", self.session_cookie, session_id))
    }
}

/// Session id from a `Set-Cookie` value for the cookie `name`
fn session_from_set_cookie(value: &str, name: &str) -> Option<String> {
    let pair = value.split(';').next()?;
    let (key, session_id) = pair.split_once('=')?;
    (key.trim() == name && !session_id.trim().is_empty()).then(|| session_id.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::domain::job::JobStatus;
    use tether_core::dto::task::IncrementalPayload;

    #[test]
    fn test_session_from_set_cookie() {
        let header = "task_sid=abc123; Path=/; HttpOnly; SameSite=Lax; Max-Age=31536000";
        assert_eq!(
            session_from_set_cookie(header, "task_sid"),
            Some("abc123".to_string())
        );
        assert_eq!(session_from_set_cookie(header, "other"), None);
        assert_eq!(session_from_set_cookie("task_sid=; Path=/", "task_sid"), None);
    }

    #[test]
    fn test_cookie_header() {
        let client = TetherClient::new("http://localhost:8080");
        assert_eq!(client.cookie_header(&Identity::new("user-1")), None);
        assert_eq!(
            client.cookie_header(&Identity::with_session("user-1", "abc")),
            Some("task_sid=abc".to_string())
        );
    }

    #[test]
    fn test_handle_advances_to_issued_cursor() {
        let mut handle = TaskHandle {
            job_id: Uuid::new_v4(),
            identity: Identity::with_session("user-1", "abc"),
            cursor: 0,
            cursor_sig: "t0".to_string(),
        };
        let response = PollResponse {
            status: JobStatus::Running,
            is_completed: false,
            is_failed: false,
            next_cursor: 4,
            next_cursor_sig: "t1".to_string(),
            incremental_payload: IncrementalPayload::default(),
            final_output: None,
            error: None,
        };

        handle.advance(&response);
        assert_eq!(handle.cursor, 4);
        assert_eq!(handle.cursor_sig, "t1");
    }

    #[tokio::test]
    async fn test_poll_without_session_fails_locally() {
        let client = TetherClient::new("http://localhost:8080");
        let result = client
            .poll_task(&Identity::new("user-1"), Uuid::new_v4(), 0, "t0")
            .await;
        assert!(matches!(result, Err(ClientError::InvalidRequest(_))));
    }
}

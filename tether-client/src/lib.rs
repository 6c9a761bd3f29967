//! Tether HTTP Client
//!
//! A type-safe HTTP client for the Tether orchestrator API.
//!
//! Browser-side callers use it to submit tasks and follow their output with
//! signed cursors; runners use it to claim jobs, stream output and report
//! completion.
//!
//! # Example
//!
//! ```no_run
//! use tether_client::{Identity, TetherClient};
//! use tether_core::dto::task::SubmitTask;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = TetherClient::new("http://localhost:8080");
//!     let identity = Identity::new("user-1");
//!
//!     let mut task = client.submit_task(&identity, SubmitTask::default()).await?;
//!     loop {
//!         let update = client.poll(&mut task).await?;
//!         print!("{}", update.incremental_payload.text);
//!         if update.is_completed || update.is_failed {
//!             break;
//!         }
//!         tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;
mod tasks;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use tasks::{Identity, TaskHandle};
pub use tether_core::dto::job::JobExecutionInfo;

use reqwest::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tether_core::dto::task::Rejection;

const DEFAULT_CALLER_HEADER: &str = "x-caller-id";
const DEFAULT_SESSION_COOKIE: &str = "task_sid";

/// HTTP client for the Tether orchestrator API
///
/// This client provides methods for all orchestrator API endpoints, organized
/// into logical groups:
/// - Task submission and signed-cursor polling
/// - Job lifecycle for runners (claim, output, complete)
#[derive(Debug, Clone)]
pub struct TetherClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
    /// Header carrying the caller id
    caller_header: String,
    /// Name of the session cookie
    session_cookie: String,
    /// Bearer token sent on runner endpoints
    runner_token: Option<String>,
}

impl TetherClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the orchestrator API (e.g., "http://localhost:8080")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use tether_client::TetherClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = TetherClient::with_client("http://localhost:8080", http_client);
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            caller_header: DEFAULT_CALLER_HEADER.to_string(),
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            runner_token: None,
        }
    }

    /// Use a different caller header than `x-caller-id`
    pub fn caller_header(mut self, name: impl Into<String>) -> Self {
        self.caller_header = name.into();
        self
    }

    /// Use a different session cookie name than `task_sid`
    pub fn session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie = name.into();
        self
    }

    /// Authenticate runner endpoints with `token`
    pub fn runner_token(mut self, token: impl Into<String>) -> Self {
        self.runner_token = Some(token.into());
        self
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// This method checks the status code and returns an appropriate error if
    /// the request failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = self.check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content
    ///
    /// This method checks the status code and returns an error if the request failed.
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        self.check_status(response).await.map(|_| ())
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(error_from_body(status, error_text))
    }
}

/// Turn a failed response into an error, keeping rejection codes typed
fn error_from_body(status: StatusCode, body: String) -> ClientError {
    if status == StatusCode::FORBIDDEN {
        if let Ok(rejection) = serde_json::from_str::<Rejection>(&body) {
            tracing::debug!("Request rejected: {}", rejection.cause);
            return ClientError::Rejected {
                status: status.as_u16(),
                cause: rejection.cause,
            };
        }
    }

    ClientError::api_error(status.as_u16(), body)
}

//! Error types for the Tether client

use tether_core::domain::task::{RejectClass, RejectReason};
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the Tether client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// A task poll was refused with a stable reason code
    #[error("Poll rejected (status {status}): {cause}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Reason code from the response body
        cause: RejectReason,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// The rejection reason, if this is a refused poll
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    /// The poll lost to a newer cursor state; the held token is spent and
    /// authoritative state has to be refetched
    pub fn requires_resync(&self) -> bool {
        self.reject_reason()
            .is_some_and(|cause| cause.class() == RejectClass::ReplayOrStale)
    }

    /// The browser session is missing or is not the one that submitted the task
    pub fn requires_new_session(&self) -> bool {
        matches!(
            self.reject_reason(),
            Some(RejectReason::MissingTaskSession | RejectReason::TaskSessionMismatch)
        )
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::ApiError { status, .. } | Self::Rejected { status, .. } => {
                (400..500).contains(status)
            }
            _ => false,
        }
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}

//! Failures of the generic API client, with adapters into the sync
//! taxonomy.

use miette::Diagnostic;
use thiserror::Error;

use crate::errors::SyncError;

/// Failure raised by [`ApiClient`](crate::client::ApiClient) requests.
#[derive(Debug, Error, Diagnostic)]
pub enum ApiError {
    /// Connection, TLS, or timeout failure before a response arrived.
    #[error("transport error: {0}")]
    #[diagnostic(code(syncline::client::transport))]
    Transport(#[from] reqwest::Error),

    /// Non-success response that survived the retry policy.
    #[error("API error {status}: {message}")]
    #[diagnostic(code(syncline::client::status))]
    Status { status: u16, message: String },

    /// 401/403 that the auth strategy could not recover from.
    #[error("auth error {status}")]
    #[diagnostic(
        code(syncline::client::auth),
        help("Check credentials; the dynamic auth strategy was already offered one refresh attempt.")
    )]
    Auth { status: u16 },

    /// The local fixed-window request budget is exhausted.
    #[error("rate limit exceeded")]
    #[diagnostic(code(syncline::client::rate_limited))]
    RateLimited,

    /// The request could not even be constructed (bad URL, bad header).
    #[error("invalid request: {0}")]
    #[diagnostic(code(syncline::client::invalid_request))]
    InvalidRequest(String),
}

impl ApiError {
    /// Whether a later identical request may succeed.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Auth { .. } | Self::InvalidRequest(_) => false,
        }
    }

    /// HTTP status carried by the failure, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::Auth { status } => Some(*status),
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            Self::RateLimited | Self::InvalidRequest(_) => None,
        }
    }

    /// Classify this failure as a source error for the sync taxonomy.
    #[must_use]
    pub fn into_source_error(self) -> SyncError {
        if self.is_temporary() {
            SyncError::temporary_source(self.to_string())
        } else {
            SyncError::permanent_source(self.to_string())
        }
    }

    /// Classify this failure as a target error for the sync taxonomy.
    #[must_use]
    pub fn into_target_error(self) -> SyncError {
        if self.is_temporary() {
            SyncError::temporary_target(self.to_string())
        } else {
            SyncError::permanent_target(self.to_string())
        }
    }
}

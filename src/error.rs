//! Error types for transport calls and managed fetches.
//!
//! All error types here are `Clone` so that a single failed network call can
//! be fanned out to every caller attached to it.

use http::StatusCode;
use thiserror::Error;

/// Error produced by a [`Transport`](crate::transport::Transport)
/// implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established or broke mid-request.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request did not complete within the transport's time budget.
    #[error("request timed out")]
    Timeout,

    /// The request was aborted before it settled.
    #[error("request aborted")]
    Aborted,
}

/// Terminal error surfaced by a resource or mutation.
///
/// Circuit-breaker suppression is *not* an error: a suppressed resource
/// reports [`Phase::Disabled`](crate::resource::Phase) instead. Superseded
/// attempts are discarded silently and never produce a `FetchError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The transport failed before a response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a non-success status.
    #[error("server responded with {status}")]
    Status {
        /// The response status code.
        status: StatusCode,
    },
}

impl FetchError {
    /// Returns the response status code, if the server answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status } => Some(*status),
            Self::Transport(_) => None,
        }
    }

    /// Returns `true` if the underlying call was aborted.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Aborted))
    }

    /// Whether another attempt could plausibly produce a different outcome.
    ///
    /// Aborted calls and client errors (except 408 and 429) are terminal
    /// immediately; connection failures, timeouts, and server errors are
    /// worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(TransportError::Aborted) => false,
            Self::Transport(_) => true,
            Self::Status { status } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

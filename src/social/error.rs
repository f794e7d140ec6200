// Failure taxonomy for remote calls.
//
// Every SocialGraphClient method returns ApiError so callers can branch on
// the kind of failure: a deleted post is dropped, a protected account yields
// partial data, and only an ambiguous connection failure triggers the full
// reconnect path.

use thiserror::Error;

/// Errors surfaced by the social network capability surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The post or account no longer exists
    #[error("not found: {0}")]
    NotFound(String),

    /// The account's data is structurally unobtainable (protected / suspended)
    #[error("protected account: {0}")]
    ProtectedAccount(String),

    /// Any other HTTP-status rejection from the remote service
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Transport failure with no HTTP status, the only retried kind
    #[error("connection error: {0}")]
    Connection(String),

    /// The streaming listener failed
    #[error("stream failure: {0}")]
    Stream(String),

    /// Re-authentication failed
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The response body could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Whether this failure should trigger a reconnect and retry.
    pub fn is_connection(&self) -> bool {
        matches!(self, ApiError::Connection(_))
    }

    /// Map an HTTP status code and response body to the matching variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => ApiError::NotFound(message),
            401 | 403 => ApiError::ProtectedAccount(message),
            _ => ApiError::Rejected { status, message },
        }
    }
}

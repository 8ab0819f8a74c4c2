//! Error types for remote publishing.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, PublishError>;

/// Errors that can occur while publishing to a remote document service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The bearer token was rejected (HTTP 401). Not retried here; token
    /// refresh is the credential provider's responsibility.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The token lacks access to the target resource (HTTP 403).
    #[error("access forbidden: {0}")]
    Forbidden(String),

    /// The resource does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The service rejected the request body (HTTP 400).
    #[error("request rejected: {0}")]
    Validation(String),

    /// The HTTP verb is not accepted by this deployment (HTTP 405).
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The request body exceeded the service's size ceiling (HTTP 413).
    #[error("payload too large")]
    PayloadTooLarge,

    /// Rate limited (HTTP 429) and the retry budget is exhausted.
    #[error("rate limited after {attempts} attempts")]
    RateLimited {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Server-side failure (HTTP 5xx) after retrying.
    #[error("server error (status {status})")]
    Server {
        /// The HTTP status code.
        status: u16,
    },

    /// Connection or timeout failure.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Lookup found no page under the target and creation was disabled.
    #[error("page not found under target and creation disabled")]
    TargetMissing,
}

impl PublishError {
    /// Maps a non-success HTTP status to an error.
    ///
    /// 429 and 5xx are handled by the retry loop before this is reached.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => PublishError::Validation(message),
            401 => PublishError::Auth(message),
            403 => PublishError::Forbidden(message),
            404 => PublishError::NotFound(message),
            405 => PublishError::MethodNotAllowed(message),
            413 => PublishError::PayloadTooLarge,
            500..=599 => PublishError::Server { status },
            _ => PublishError::Protocol(format!("unexpected status {status}: {message}")),
        }
    }

    /// Returns true if a fresh attempt of the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PublishError::RateLimited { .. }
                | PublishError::Server { .. }
                | PublishError::Network(_)
        )
    }
}

//! Errors surfaced by the resilient client.

use reqwest::StatusCode;
use thiserror::Error;

use crate::resilience::timeouts::Interrupted;

/// Boxed error used by caller-supplied hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`ResilientClient`](crate::http::ResilientClient).
///
/// `CircuitOpen`, `MaxRetriesExceeded` and `InvalidConfig` are the contractual
/// conditions callers branch on; the rest carry detail about a single attempt.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration rejected at construction time.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    /// The breaker denied the call; no network I/O happened.
    #[error("circuit breaker open for service '{service}'")]
    CircuitOpen { service: String },

    /// Every attempt failed with a retryable error.
    #[error("{service}: {method} {path} failed after {attempts} attempts")]
    MaxRetriesExceeded {
        service: String,
        method: String,
        path: String,
        attempts: u32,
        #[source]
        last: Box<ClientError>,
    },

    /// Connection failure, per-attempt timeout, or body read failure.
    #[error("{service}: transport error")]
    Transport {
        service: String,
        #[source]
        source: reqwest::Error,
    },

    /// Downstream answered with a 5xx status.
    #[error("{service}: server error {status}")]
    ServerStatus { service: String, status: StatusCode },

    /// 4xx response turned into an error by [`Response::error_for_status`](crate::http::Response::error_for_status).
    #[error("client error {status}: {body}")]
    ClientStatus { status: StatusCode, body: String },

    /// The caller's context was cancelled.
    #[error("request cancelled by caller")]
    Cancelled,

    /// The caller's deadline passed.
    #[error("caller deadline exceeded")]
    DeadlineExceeded,

    /// The auth hook could not produce credentials.
    #[error("{service}: auth hook failed")]
    Auth {
        service: String,
        #[source]
        source: BoxError,
    },

    /// The request could not be built (bad path, body encoding).
    #[error("failed to build request: {0}")]
    Request(String),

    /// Response body was not the expected JSON.
    #[error("failed to decode response body")]
    Decode(#[source] serde_json::Error),
}

impl ClientError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ClientError::CircuitOpen { .. })
    }

    pub fn is_max_retries_exceeded(&self) -> bool {
        matches!(self, ClientError::MaxRetriesExceeded { .. })
    }

    /// Transport failures and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport { .. } | ClientError::ServerStatus { .. })
    }

    /// The underlying error of the final attempt, for `MaxRetriesExceeded`.
    pub fn last_attempt_error(&self) -> Option<&ClientError> {
        match self {
            ClientError::MaxRetriesExceeded { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

impl From<Interrupted> for ClientError {
    fn from(reason: Interrupted) -> Self {
        match reason {
            Interrupted::Cancelled => ClientError::Cancelled,
            Interrupted::DeadlineExceeded => ClientError::DeadlineExceeded,
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = ClientError::CircuitOpen {
            service: "inventory".into(),
        };
        assert_eq!(err.to_string(), "circuit breaker open for service 'inventory'");
        assert!(err.is_circuit_open());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_max_retries_wraps_last_error() {
        let err = ClientError::MaxRetriesExceeded {
            service: "inventory".into(),
            method: "GET".into(),
            path: "/items".into(),
            attempts: 3,
            last: Box::new(ClientError::ServerStatus {
                service: "inventory".into(),
                status: StatusCode::BAD_GATEWAY,
            }),
        };

        assert!(err.is_max_retries_exceeded());
        assert_eq!(err.to_string(), "inventory: GET /items failed after 3 attempts");
        assert!(err.source().unwrap().to_string().contains("502"));
        assert!(err.last_attempt_error().unwrap().is_retryable());
    }

    #[test]
    fn test_interrupted_conversion() {
        assert!(matches!(ClientError::from(Interrupted::Cancelled), ClientError::Cancelled));
        assert!(matches!(
            ClientError::from(Interrupted::DeadlineExceeded),
            ClientError::DeadlineExceeded
        ));
    }
}

//! Retry classification.
//!
//! # Responsibilities
//! - Classify each attempt's outcome as success, client error, retryable or fatal
//! - Decide what the circuit breaker is told about that outcome
//!
//! # Design Decisions
//! - Connection errors, timeouts and 5xx are retryable and count against the breaker
//! - 4xx are returned to the caller untouched; by default they do not count as breaker failures
//! - Caller cancellation and deadline expiry are never retried and never blamed on the dependency

use reqwest::StatusCode;

/// Coarse class of an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// `< 400`
    Success,
    /// `400..=499`
    ClientError,
    /// `>= 500`
    ServerError,
}

/// Classify an HTTP status.
pub fn classify_status(status: StatusCode) -> StatusClass {
    match status.as_u16() {
        0..=399 => StatusClass::Success,
        400..=499 => StatusClass::ClientError,
        _ => StatusClass::ServerError,
    }
}

/// What the breaker should hear about an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerVerdict {
    Success,
    Failure,
    /// The attempt says nothing about the dependency's health.
    Neutral,
}

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T, E> {
    /// `< 400` response.
    Success(T),
    /// 4xx response, returned without retry.
    ClientError(T),
    /// Transport failure or 5xx.
    Retryable(E),
    /// Stop immediately without retrying.
    Fatal(E),
}

impl<T, E> AttemptOutcome<T, E> {
    /// Breaker verdict for this outcome.
    pub fn verdict(&self, count_client_errors: bool) -> BreakerVerdict {
        match self {
            AttemptOutcome::Success(_) => BreakerVerdict::Success,
            AttemptOutcome::ClientError(_) if count_client_errors => BreakerVerdict::Failure,
            AttemptOutcome::ClientError(_) => BreakerVerdict::Success,
            AttemptOutcome::Retryable(_) => BreakerVerdict::Failure,
            AttemptOutcome::Fatal(_) => BreakerVerdict::Neutral,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AttemptOutcome::Retryable(_))
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success(_) => "success",
            AttemptOutcome::ClientError(_) => "client_error",
            AttemptOutcome::Retryable(_) => "retryable",
            AttemptOutcome::Fatal(_) => "fatal",
        }
    }
}

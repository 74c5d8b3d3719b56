//! Request identifiers and their propagation.
//!
//! # Responsibilities
//! - Name the propagated headers (`x-request-id`, `x-correlation-id`)
//! - Generate request IDs (UUID v4) when the caller did not send one
//! - Keep the inbound request's identifiers in task-local storage so
//!   outbound calls made while handling it can pick them up
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Correlation ID defaults to the request ID when absent
//! - Tokio task-locals do not follow `tokio::spawn`; fan-out code must
//!   capture a `CallContext` (or re-enter [`RequestIds::scope`]) before spawning

use std::future::Future;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

/// Request ID header name.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Correlation ID header name.
pub const X_CORRELATION_ID: &str = "x-correlation-id";

tokio::task_local! {
    static CURRENT_IDS: RequestIds;
}

/// Identifiers of the inbound request being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIds {
    pub request_id: String,
    pub correlation_id: String,
}

impl RequestIds {
    pub fn new(request_id: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            correlation_id: correlation_id.into(),
        }
    }

    /// Fresh identifiers; the correlation ID equals the new request ID.
    pub fn generate() -> Self {
        let id = Uuid::new_v4().to_string();
        Self::new(id.clone(), id)
    }

    /// Read identifiers from inbound headers, generating what is missing.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let request_id = header_str(headers, X_REQUEST_ID)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let correlation_id = header_str(headers, X_CORRELATION_ID)
            .map(str::to_string)
            .unwrap_or_else(|| request_id.clone());
        Self::new(request_id, correlation_id)
    }

    /// Identifiers of the request in scope, if any.
    pub fn current() -> Option<Self> {
        CURRENT_IDS.try_with(|ids| ids.clone()).ok()
    }

    /// Run `fut` with `ids` in scope.
    pub async fn scope<F>(ids: RequestIds, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_IDS.scope(ids, fut).await
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Write the optional identifiers onto outbound headers.
///
/// Values that are not valid header values are skipped with a warning.
pub fn inject_ids(headers: &mut HeaderMap, request_id: Option<&str>, correlation_id: Option<&str>) {
    let pairs = [
        (HeaderName::from_static(X_REQUEST_ID), request_id),
        (HeaderName::from_static(X_CORRELATION_ID), correlation_id),
    ];
    for (name, value) in pairs {
        let Some(value) = value else { continue };
        match HeaderValue::from_str(value) {
            Ok(v) => {
                headers.insert(name, v);
            }
            Err(e) => {
                tracing::warn!(header = %name, error = %e, "Skipping invalid propagated header");
            }
        }
    }
}

//! Errors surfaced by the request context.

use thiserror::Error;

use crate::http::error::BoxError;
use crate::orchestration::action::RollbackReport;

/// Errors returned by [`RequestContext`](crate::orchestration::RequestContext).
///
/// `AlreadyCommitted` is a programmer error and is never retried.
#[derive(Debug, Error)]
pub enum ContextError {
    /// `add_action` or `commit` after the ledger was committed.
    #[error("request context already committed")]
    AlreadyCommitted,

    /// The fetch for `key` failed; nothing was cached.
    #[error("fetch of '{key}' failed")]
    Fetch {
        key: String,
        #[source]
        source: BoxError,
    },

    /// `key` is cached with a different type than requested.
    #[error("cached value for '{key}' is not of the requested type")]
    TypeMismatch { key: String },

    /// A staged action failed; earlier actions were rolled back.
    #[error("action {index} ({description}) failed; {rollback}")]
    ActionFailed {
        index: usize,
        description: String,
        #[source]
        source: BoxError,
        rollback: RollbackReport,
    },
}

impl ContextError {
    pub fn is_already_committed(&self) -> bool {
        matches!(self, ContextError::AlreadyCommitted)
    }

    /// Rollback outcome, for `ActionFailed`.
    pub fn rollback_report(&self) -> Option<&RollbackReport> {
        match self {
            ContextError::ActionFailed { rollback, .. } => Some(rollback),
            _ => None,
        }
    }
}

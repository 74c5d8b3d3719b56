//! Request-scoped orchestration.
//!
//! # Responsibilities
//! - Memoize fetches for the lifetime of one inbound request
//! - Stage reversible write actions and execute them all-or-compensate
//!
//! # Design Decisions
//! - Cache is a `DashMap`: different keys never block each other
//! - No single-flight: concurrent misses on one key may both fetch, and the
//!   first value stored is the one every caller sees
//! - The ledger lock is never held across an await; commit takes the actions
//!   out and marks the ledger committed in one critical section
//! - Rollback runs under a detached call context and reports, rather than
//!   propagates, compensation failures
//!
//! # Data Flow
//! ```text
//! use case
//!     → context.rs get_or_fetch / load (provider.rs) → ResilientClient
//!     → context.rs add_action (action.rs) ... commit
//!         → execute in order → on failure: rollback in reverse → RollbackReport
//! ```

pub mod action;
pub mod context;
pub mod error;
pub mod provider;

pub use action::{Action, FnAction, RollbackFailure, RollbackReport};
pub use context::RequestContext;
pub use error::ContextError;
pub use provider::{DataProvider, JsonResource};

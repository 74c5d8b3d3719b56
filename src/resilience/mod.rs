//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → timeouts.rs (caller deadline + cancellation, interruptible sleeps)
//!     → circuit_breaker.rs (admit or reject before any I/O)
//!     → [attempt]
//!     → retries.rs (classify outcome, decide breaker verdict)
//!     → backoff.rs (jittered exponential delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Every external call runs under a `CallContext`; interruption is never retried
//! - One breaker per downstream service, shared by all callers
//! - Breaker time comes from an injectable `Clock` so tests need not sleep

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod retries;
pub mod timeouts;

pub use backoff::{calculate_backoff, Backoff, FixedJitter, JitterSource, RetryPolicy, ThreadRngJitter};
pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitPolicy, CircuitState, StateTransition};
pub use clock::{Clock, ManualClock, SystemClock};
pub use retries::{classify_status, AttemptOutcome, BreakerVerdict, StatusClass};
pub use timeouts::{CallContext, Interrupted};

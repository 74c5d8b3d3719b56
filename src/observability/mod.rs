//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! client / breaker / request context produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms via the `metrics` facade)
//! ```
//!
//! # Design Decisions
//! - Structured fields, never formatted strings, for IDs and service names
//! - Metrics go through the facade; the embedding application installs a recorder
//! - Without a recorder every metric call is a no-op

pub mod logging;
pub mod metrics;

pub use logging::init_logging;

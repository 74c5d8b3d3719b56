//! Resilient downstream calls and request-scoped orchestration.
//!
//! # Architecture Overview
//!
//! ```text
//!   inbound request ──▶ PropagationLayer (request/correlation IDs in scope)
//!                              │
//!                              ▼
//!                        use case code
//!                     ┌────────┴─────────┐
//!                     ▼                  ▼
//!              RequestContext      ResilientClient ──▶ downstream service
//!           (memo cache, staged     │   ▲
//!            actions, rollback)     │   │ outcome
//!                     │             ▼   │
//!                     └──────▶ CircuitBreaker (one per service, shared)
//!                                   Backoff (jittered exponential)
//! ```

// Core subsystems
pub mod http;
pub mod orchestration;
pub mod resilience;

// Cross-cutting concerns
pub mod config;
pub mod observability;

pub use config::{ClientConfig, Config};
pub use http::{ClientError, ResilientClient, Response};
pub use orchestration::{Action, ContextError, RequestContext};
pub use resilience::{CallContext, CircuitBreaker, CircuitState};

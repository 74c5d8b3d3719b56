//! Outbound HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! caller (CallContext: deadline, cancel, request/correlation IDs)
//!     → client.rs (breaker allow, attempt loop)
//!     → request.rs (propagate IDs) + auth.rs (credentials per attempt)
//!     → reqwest send (per-attempt timeout)
//!     → resilience::retries (classify, report to breaker)
//!     → resilience::backoff (interruptible sleep, next attempt)
//!     → response.rs (buffered body) / error.rs
//! ```
//!
//! Inbound services wrap their router in [`PropagationLayer`] so outbound
//! calls inherit the identifiers of the request being served.

pub mod auth;
pub mod client;
pub mod error;
pub mod middleware;
pub mod request;
pub mod response;

pub use auth::{Authenticator, BearerToken, NoAuth, StaticHeader, TokenFn};
pub use client::{ClientBuilder, ResilientClient};
pub use error::{BoxError, ClientError, ClientResult};
pub use middleware::PropagationLayer;
pub use request::{RequestIds, X_CORRELATION_ID, X_REQUEST_ID};
pub use response::Response;

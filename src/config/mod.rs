//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → one ClientConfig handed to each ResilientClient
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; retry and circuit policies never change at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Secrets are referenced by environment variable name, not stored inline

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AuthConfig, CircuitConfig, ClientConfig, Config, ObservabilityConfig, RetryConfig};
pub use validation::{validate_client, validate_config, ValidationError};

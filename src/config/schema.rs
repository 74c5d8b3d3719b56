//! Configuration schema definitions.
//!
//! This module defines the configuration consumed by the downstream clients.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration: logging plus one entry per downstream dependency.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Downstream service definitions.
    pub services: Vec<ClientConfig>,
}

impl Config {
    /// Look up a service definition by name.
    pub fn service(&self, name: &str) -> Option<&ClientConfig> {
        self.services.iter().find(|s| s.service_name == name)
    }
}

/// Configuration for one resilient client (one downstream dependency).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service identifier used in logs, metrics and errors.
    pub service_name: String,

    /// Base URL every request path is joined onto.
    pub base_url: String,

    /// Per-attempt request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Retry configuration.
    pub retry: RetryConfig,

    /// Circuit breaker configuration.
    pub circuit: CircuitConfig,

    /// Credentials attached to every attempt.
    pub auth: AuthConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            base_url: String::new(),
            timeout_ms: 5_000,
            retry: RetryConfig::default(),
            circuit: CircuitConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Minimal configuration for a named service at `base_url`.
    pub fn new(service_name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Upper bound on attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_interval_ms: u64,

    /// Cap on the un-jittered delay in milliseconds.
    pub max_interval_ms: u64,

    /// Growth factor applied per attempt.
    pub multiplier: f64,

    /// Symmetric jitter around the delay (0.25 = ±25%). Defaults to 0.25 when unset.
    pub jitter_factor: Option<f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_ms: 100,
            max_interval_ms: 2_000,
            multiplier: 2.0,
            jitter_factor: None,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures in Closed before the circuit opens.
    pub max_failures: u32,

    /// How long the circuit stays open after the last failure, in milliseconds.
    pub timeout_ms: u64,

    /// Concurrent probes admitted in HalfOpen, and successes needed to close.
    pub half_open_limit: u32,

    /// Count 4xx responses as breaker failures.
    pub count_client_errors: bool,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            timeout_ms: 30_000,
            half_open_limit: 1,
            count_client_errors: false,
        }
    }
}

/// Credentials source. Secrets are read from the environment, never stored in the file.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No credentials.
    #[default]
    None,
    /// `Authorization: Bearer <token>` with the token taken from `token_env`.
    Bearer { token_env: String },
    /// Arbitrary header whose value is taken from `value_env`.
    Header { name: String, value_env: String },
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config: Config = toml::from_str(
            r#"
            [[services]]
            service_name = "inventory"
            base_url = "http://localhost:9000"
            "#,
        )
        .unwrap();

        let svc = config.service("inventory").unwrap();
        assert_eq!(svc.timeout_ms, 5_000);
        assert_eq!(svc.retry.max_attempts, 3);
        assert_eq!(svc.retry.jitter_factor, None);
        assert_eq!(svc.circuit.half_open_limit, 1);
        assert_eq!(svc.auth, AuthConfig::None);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_auth_variants_parse() {
        let config: Config = toml::from_str(
            r#"
            [[services]]
            service_name = "payments"
            base_url = "http://localhost:9001"
            [services.auth]
            kind = "header"
            name = "x-api-key"
            value_env = "PAYMENTS_KEY"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.services[0].auth,
            AuthConfig::Header {
                name: "x-api-key".into(),
                value_env: "PAYMENTS_KEY".into()
            }
        );
        assert!(config.service("missing").is_none());
    }
}

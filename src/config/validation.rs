//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, attempts >= 1, jitter within [0, 1])
//! - Check the base URL is an absolute http(s) URL
//! - Detect duplicate service names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, and again when a client is built

use std::collections::HashSet;
use std::fmt;

use url::Url;

use crate::config::schema::{ClientConfig, Config};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a whole configuration file.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (i, service) in config.services.iter().enumerate() {
        let prefix = format!("services[{}]", i);
        collect_client_errors(service, &prefix, &mut errors);

        if !service.service_name.is_empty() && !seen.insert(service.service_name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.service_name", prefix),
                format!("duplicate service name '{}'", service.service_name),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a single client configuration.
pub fn validate_client(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    collect_client_errors(config, "", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn collect_client_errors(config: &ClientConfig, prefix: &str, errors: &mut Vec<ValidationError>) {
    let field = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", prefix, name)
        }
    };

    if config.service_name.trim().is_empty() {
        errors.push(ValidationError::new(field("service_name"), "must not be empty"));
    }

    if config.base_url.trim().is_empty() {
        errors.push(ValidationError::new(field("base_url"), "must not be empty"));
    } else {
        match Url::parse(&config.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::new(
                field("base_url"),
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                field("base_url"),
                format!("invalid URL: {}", e),
            )),
        }
    }

    if config.timeout_ms == 0 {
        errors.push(ValidationError::new(field("timeout_ms"), "must be greater than 0"));
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new(field("retry.max_attempts"), "must be at least 1"));
    }
    if !(retry.multiplier >= 1.0 && retry.multiplier.is_finite()) {
        errors.push(ValidationError::new(
            field("retry.multiplier"),
            "must be a finite number >= 1.0",
        ));
    }
    if retry.initial_interval_ms > retry.max_interval_ms {
        errors.push(ValidationError::new(
            field("retry.initial_interval_ms"),
            "must not exceed retry.max_interval_ms",
        ));
    }
    if let Some(jitter) = retry.jitter_factor {
        if !(0.0..=1.0).contains(&jitter) {
            errors.push(ValidationError::new(
                field("retry.jitter_factor"),
                "must be within [0, 1]",
            ));
        }
    }

    let circuit = &config.circuit;
    if circuit.max_failures == 0 {
        errors.push(ValidationError::new(field("circuit.max_failures"), "must be at least 1"));
    }
    if circuit.half_open_limit == 0 {
        errors.push(ValidationError::new(
            field("circuit.half_open_limit"),
            "must be at least 1",
        ));
    }
    if circuit.timeout_ms == 0 {
        errors.push(ValidationError::new(field("circuit.timeout_ms"), "must be greater than 0"));
    }
}

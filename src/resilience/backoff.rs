//! Exponential backoff with symmetric jitter.
//!
//! ```text
//! base  = min(initial * multiplier^attempt, max)
//! delay = clamp(base * (1 + jitter * r), 0, max * (1 + jitter))   r ∈ [-1, 1]
//! ```

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Jitter applied when the policy does not specify one.
pub const DEFAULT_JITTER_FACTOR: f64 = 0.25;

/// Immutable retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub jitter_factor: Option<f64>,
}

impl RetryPolicy {
    /// Effective jitter factor.
    pub fn jitter(&self) -> f64 {
        self.jitter_factor.unwrap_or(DEFAULT_JITTER_FACTOR)
    }

    /// Delay before jitter for the given zero-based attempt.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let initial = self.initial_interval.as_secs_f64();
        let max = self.max_interval.as_secs_f64();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = (initial * self.multiplier.powi(exponent)).min(max);
        secs_to_duration(base)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
            multiplier: config.multiplier,
            jitter_factor: config.jitter_factor,
        }
    }
}

/// Calculate the backoff delay for `attempt` given a jitter sample `r` in `[-1, 1]`.
pub fn calculate_backoff(attempt: u32, policy: &RetryPolicy, r: f64) -> Duration {
    let jitter = policy.jitter();
    let base = policy.base_delay(attempt).as_secs_f64();
    let ceiling = policy.max_interval.as_secs_f64() * (1.0 + jitter);

    let jittered = base * (1.0 + jitter * r.clamp(-1.0, 1.0));
    let clamped = jittered.clamp(0.0, ceiling);

    secs_to_duration(clamped)
}

// Rounds to the nearest nanosecond; `as` saturates on out-of-range values.
fn secs_to_duration(secs: f64) -> Duration {
    Duration::from_nanos((secs * 1e9).round() as u64)
}

/// Random source for jitter samples.
pub trait JitterSource: Send + Sync + std::fmt::Debug {
    /// Uniform sample in `[-1, 1]`.
    fn sample(&self) -> f64;
}

/// Jitter drawn from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen_range(-1.0..=1.0)
    }
}

/// Constant jitter sample, for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// Policy plus random source.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    jitter: Arc<dyn JitterSource>,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_jitter(policy, Arc::new(ThreadRngJitter))
    }

    pub fn with_jitter(policy: RetryPolicy, jitter: Arc<dyn JitterSource>) -> Self {
        Self { policy, jitter }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delay to wait after the zero-based `attempt` failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, &self.policy, self.jitter.sample())
    }
}

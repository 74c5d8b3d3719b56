//! Metrics collection.
//!
//! # Metrics
//! - `downstream_requests_total` (counter): logical calls by service, method, outcome
//! - `downstream_request_duration_seconds` (histogram): logical call latency, retries included
//! - `downstream_retries_total` (counter): retry attempts by service
//! - `circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half_open
//! - `circuit_breaker_transitions_total` (counter): by service, from, to
//! - `circuit_breaker_rejections_total` (counter): calls denied by the breaker
//! - `request_context_cache_total` (counter): memo cache hits and misses
//! - `request_context_commits_total` (counter): commit outcomes
//! - `request_context_rollback_failures_total` (counter): compensations that failed
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; exposition is the embedding
//!   application's choice of recorder
//! - Labels limited to service, method and small fixed vocabularies

use std::time::Instant;

use crate::resilience::circuit_breaker::CircuitState;

/// Record a finished logical downstream call.
pub fn record_request(service: &str, method: &str, outcome: &'static str, start: Instant) {
    let duration = start.elapsed().as_secs_f64();
    ::metrics::counter!(
        "downstream_requests_total",
        "service" => service.to_string(),
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    ::metrics::histogram!(
        "downstream_request_duration_seconds",
        "service" => service.to_string(),
        "method" => method.to_string()
    )
    .record(duration);
}

pub fn record_retry(service: &str) {
    ::metrics::counter!("downstream_retries_total", "service" => service.to_string()).increment(1);
}

/// Current breaker state as a gauge.
pub fn record_circuit_state(service: &str, state: CircuitState) {
    ::metrics::gauge!("circuit_breaker_state", "service" => service.to_string()).set(state as u8 as f64);
}

pub fn record_circuit_transition(service: &str, from: CircuitState, to: CircuitState) {
    ::metrics::counter!(
        "circuit_breaker_transitions_total",
        "service" => service.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

pub fn record_circuit_rejection(service: &str) {
    ::metrics::counter!("circuit_breaker_rejections_total", "service" => service.to_string()).increment(1);
}

/// Memo cache lookup; `hit` is false when a fetch was needed.
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    ::metrics::counter!("request_context_cache_total", "result" => result).increment(1);
}

/// Commit outcome: `committed`, `rolled_back` or `rejected`.
pub fn record_commit(outcome: &'static str) {
    ::metrics::counter!("request_context_commits_total", "outcome" => outcome).increment(1);
}

pub fn record_rollback_failure() {
    ::metrics::counter!("request_context_rollback_failures_total").increment(1);
}

//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: dependency assumed down, requests fail fast
//! - Half-Open: a bounded number of probes test whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= max_failures
//! Open → Half-Open: first allow() after open_timeout has elapsed since the last failure
//! Half-Open → Closed: consecutive successes >= half_open_limit
//! Half-Open → Open: any probe fails
//! ```
//!
//! # Design Decisions
//! - One breaker per downstream dependency, owned by its client and shared via `Arc`
//! - All mutation happens under a single mutex; `state()` reads an atomic mirror
//! - Transitions are enqueued to observers under the state lock with a
//!   non-blocking `try_send`, so every queue sees them in order; observer
//!   callbacks run elsewhere and may re-enter the breaker
//! - Logging and metrics for a transition happen after the lock is released
//! - The breaker never returns errors; callers turn a denied `allow()` into their own error

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::config::CircuitConfig;
use crate::observability::metrics;
use crate::resilience::clock::{Clock, SystemClock};

/// Queue depth of each observer registered through [`CircuitBreaker::on_state_change`].
pub const OBSERVER_QUEUE_CAPACITY: usize = 64;

/// Circuit state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl From<u8> for CircuitState {
    fn from(val: u8) -> Self {
        match val {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker thresholds. Immutable for the breaker's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitPolicy {
    /// Consecutive failures in Closed that open the circuit.
    pub max_failures: u32,
    /// Minimum time between the last failure and the first probe.
    pub open_timeout: Duration,
    /// Concurrent probes in HalfOpen, and consecutive successes needed to close.
    pub half_open_limit: u32,
}

impl Default for CircuitPolicy {
    fn default() -> Self {
        Self::from(&CircuitConfig::default())
    }
}

impl From<&CircuitConfig> for CircuitPolicy {
    fn from(config: &CircuitConfig) -> Self {
        Self {
            max_failures: config.max_failures,
            open_timeout: Duration::from_millis(config.timeout_ms),
            half_open_limit: config.half_open_limit,
        }
    }
}

/// A state change, delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Point-in-time view of the breaker counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub in_flight_probes: u32,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    in_flight_probes: u32,
    last_failure_at: Option<Instant>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            in_flight_probes: 0,
            last_failure_at: None,
        }
    }
}

/// Three-state circuit breaker guarding one downstream dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    policy: CircuitPolicy,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerState>,
    /// Mirror of `inner.state`, written under the lock.
    state: AtomicU8,
    observers: RwLock<Vec<mpsc::Sender<StateTransition>>>,
    dropped_notifications: AtomicU64,
}

impl CircuitBreaker {
    /// Create a breaker using the system clock.
    pub fn new(name: impl Into<String>, policy: CircuitPolicy) -> Self {
        Self::with_clock(name, policy, Arc::new(SystemClock))
    }

    /// Create a breaker reading time from `clock`.
    pub fn with_clock(name: impl Into<String>, policy: CircuitPolicy, clock: Arc<dyn Clock>) -> Self {
        let name = name.into();
        metrics::record_circuit_state(&name, CircuitState::Closed);
        Self {
            name,
            policy,
            clock,
            inner: Mutex::new(BreakerState::new()),
            state: AtomicU8::new(CircuitState::Closed as u8),
            observers: RwLock::new(Vec::new()),
            dropped_notifications: AtomicU64::new(0),
        }
    }

    /// Name of the guarded dependency.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &CircuitPolicy {
        &self.policy
    }

    /// Current state. Lock-free.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Counters as of now.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let st = self.lock();
        BreakerSnapshot {
            state: st.state,
            consecutive_failures: st.consecutive_failures,
            consecutive_successes: st.consecutive_successes,
            in_flight_probes: st.in_flight_probes,
        }
    }

    /// Notifications discarded because an observer queue was full.
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }

    /// Decide whether a caller may proceed.
    pub fn allow(&self) -> bool {
        let (allowed, transition) = {
            let mut st = self.lock();
            match st.state {
                CircuitState::Closed => (true, None),
                CircuitState::Open => {
                    let now = self.clock.now();
                    let elapsed = st
                        .last_failure_at
                        .map(|at| now.saturating_duration_since(at))
                        .unwrap_or(Duration::MAX);
                    if elapsed >= self.policy.open_timeout {
                        let t = self.transition(&mut st, CircuitState::HalfOpen);
                        st.in_flight_probes = 1;
                        (true, Some(t))
                    } else {
                        (false, None)
                    }
                }
                CircuitState::HalfOpen => {
                    if st.in_flight_probes < self.policy.half_open_limit {
                        st.in_flight_probes += 1;
                        (true, None)
                    } else {
                        (false, None)
                    }
                }
            }
        };

        if !allowed {
            metrics::record_circuit_rejection(&self.name);
        }
        self.publish(transition);
        allowed
    }

    /// Report a successful call.
    pub fn record_success(&self) {
        let transition = {
            let mut st = self.lock();
            match st.state {
                CircuitState::Closed => {
                    st.consecutive_failures = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    st.in_flight_probes = st.in_flight_probes.saturating_sub(1);
                    st.consecutive_successes += 1;
                    if st.consecutive_successes >= self.policy.half_open_limit {
                        Some(self.transition(&mut st, CircuitState::Closed))
                    } else {
                        None
                    }
                }
                CircuitState::Open => None,
            }
        };
        self.publish(transition);
    }

    /// Report a failed call.
    pub fn record_failure(&self) {
        let transition = {
            let mut st = self.lock();
            st.last_failure_at = Some(self.clock.now());
            match st.state {
                CircuitState::Closed => {
                    st.consecutive_failures += 1;
                    if st.consecutive_failures >= self.policy.max_failures {
                        Some(self.transition(&mut st, CircuitState::Open))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    st.in_flight_probes = st.in_flight_probes.saturating_sub(1);
                    Some(self.transition(&mut st, CircuitState::Open))
                }
                CircuitState::Open => None,
            }
        };
        self.publish(transition);
    }

    /// Give back a half-open slot for an admitted call that produced no verdict
    /// on the dependency (e.g. the caller cancelled). No-op outside HalfOpen.
    pub fn release_probe(&self) {
        let mut st = self.lock();
        if st.state == CircuitState::HalfOpen {
            st.in_flight_probes = st.in_flight_probes.saturating_sub(1);
        }
    }

    /// Force the breaker back to Closed and forget the failure history.
    pub fn reset(&self) {
        let transition = {
            let mut st = self.lock();
            st.last_failure_at = None;
            if st.state == CircuitState::Closed {
                st.consecutive_failures = 0;
                None
            } else {
                Some(self.transition(&mut st, CircuitState::Closed))
            }
        };
        self.publish(transition);
    }

    /// Register a callback invoked with every transition.
    ///
    /// The callback runs on its own task (or thread, outside a Tokio runtime)
    /// fed by a bounded queue, in transition order. When the queue is full,
    /// notifications are dropped and counted rather than blocking the breaker.
    pub fn on_state_change<F>(&self, callback: F)
    where
        F: Fn(StateTransition) + Send + 'static,
    {
        let mut rx = self.subscribe(OBSERVER_QUEUE_CAPACITY);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    while let Some(t) = rx.recv().await {
                        callback(t);
                    }
                });
            }
            Err(_) => {
                std::thread::spawn(move || {
                    while let Some(t) = rx.blocking_recv() {
                        callback(t);
                    }
                });
            }
        }
    }

    /// Receive transitions on a bounded channel of the given capacity.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<StateTransition> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, st: &mut BreakerState, to: CircuitState) -> StateTransition {
        let from = st.state;
        st.state = to;
        st.consecutive_failures = 0;
        st.consecutive_successes = 0;
        st.in_flight_probes = 0;
        self.state.store(to as u8, Ordering::Release);
        let t = StateTransition { from, to };
        self.enqueue(t);
        t
    }

    // Called with the state lock held so queues receive transitions in the
    // order they happened. `try_send` never blocks or runs observer code.
    fn enqueue(&self, t: StateTransition) {
        let mut has_closed = false;
        {
            let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
            for tx in observers.iter() {
                match tx.try_send(t) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        self.dropped_notifications.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(service = %self.name, "Observer queue full, dropping transition");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => has_closed = true,
                }
            }
        }
        if has_closed {
            self.observers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|tx| !tx.is_closed());
        }
    }

    // Logging and metrics, with the state lock released.
    fn publish(&self, transition: Option<StateTransition>) {
        let Some(t) = transition else {
            return;
        };

        if t.to == CircuitState::Open {
            tracing::warn!(service = %self.name, from = %t.from, to = %t.to, "Circuit breaker opened");
        } else {
            tracing::info!(service = %self.name, from = %t.from, to = %t.to, "Circuit breaker state changed");
        }
        metrics::record_circuit_transition(&self.name, t.from, t.to);
        metrics::record_circuit_state(&self.name, t.to);
    }
}

//! Deadline and cancellation enforcement.
//!
//! # Responsibilities
//! - Carry the caller's deadline and cancellation signal into every I/O step
//! - Make retry sleeps interruptible
//! - Carry the propagated request/correlation identifiers alongside
//!
//! # Design Decisions
//! - Uses Tokio's timer (`tokio::time::Instant`), so paused-time tests apply
//! - Cancellation is a `watch` channel shared by every clone of a context
//! - Interruption is distinct from dependency failure and is never retried

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::http::request::RequestIds;

/// Why a call stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("cancelled by caller")]
    Cancelled,
    #[error("caller deadline exceeded")]
    DeadlineExceeded,
}

/// Per-call context: deadline, cancellation and propagated identifiers.
///
/// Clones share the cancellation signal.
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Arc<watch::Sender<bool>>,
    request_id: Option<String>,
    correlation_id: Option<String>,
}

impl CallContext {
    /// Context picking up the identifiers of the inbound request in scope, if any.
    pub fn new() -> Self {
        let mut ctx = Self::background();
        if let Some(ids) = RequestIds::current() {
            ctx.request_id = Some(ids.request_id);
            ctx.correlation_id = Some(ids.correlation_id);
        }
        ctx
    }

    /// Context with no deadline and no identifiers.
    pub fn background() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            deadline: None,
            cancel: Arc::new(tx),
            request_id: None,
            correlation_id: None,
        }
    }

    /// Tighten the deadline to `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Tighten the deadline. An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Signal cancellation to every clone of this context.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Non-blocking check for cancellation or an expired deadline.
    pub fn interrupted(&self) -> Option<Interrupted> {
        if self.is_cancelled() {
            Some(Interrupted::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Interrupted::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Interrupted {
        let mut rx = self.cancel.subscribe();
        // The sender lives in `self`, so this only resolves on cancellation.
        let cancelled = async move {
            let _ = rx.wait_for(|cancelled| *cancelled).await;
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = cancelled => Interrupted::Cancelled,
                _ = tokio::time::sleep_until(deadline) => Interrupted::DeadlineExceeded,
            },
            None => {
                cancelled.await;
                Interrupted::Cancelled
            }
        }
    }

    /// Sleep for `duration`, waking early on cancellation or deadline.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.run(tokio::time::sleep(duration)).await
    }

    /// Drive `fut` unless the context is interrupted first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Interrupted>
    where
        F: Future,
    {
        if let Some(reason) = self.interrupted() {
            return Err(reason);
        }
        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            output = fut => Ok(output),
        }
    }

    /// Same identifiers, but no deadline and an independent cancellation signal.
    pub fn detached(&self) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            deadline: None,
            cancel: Arc::new(tx),
            request_id: self.request_id.clone(),
            correlation_id: self.correlation_id.clone(),
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

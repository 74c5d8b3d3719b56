//! Per-request memo cache and staged-write ledger.

use std::any::Any;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use crate::http::error::BoxError;
use crate::observability::metrics;
use crate::orchestration::action::{Action, RollbackFailure, RollbackReport};
use crate::orchestration::error::ContextError;
use crate::orchestration::provider::DataProvider;
use crate::resilience::timeouts::CallContext;

type CachedValue = Arc<dyn Any + Send + Sync>;

struct Ledger {
    actions: Vec<Box<dyn Action>>,
    committed: bool,
}

/// State for one orchestrating use case: fetched values and staged actions.
///
/// Created at the start of the use case and dropped when it returns. Safe to
/// share by reference across fan-out within the request.
pub struct RequestContext {
    call: CallContext,
    cache: DashMap<String, CachedValue>,
    ledger: Mutex<Ledger>,
}

impl RequestContext {
    /// Context bound to a fresh `CallContext` (picking up inbound request IDs).
    pub fn new() -> Self {
        Self::with_call(CallContext::new())
    }

    /// Context whose fetches and actions run under `call`.
    pub fn with_call(call: CallContext) -> Self {
        Self {
            call,
            cache: DashMap::new(),
            ledger: Mutex::new(Ledger {
                actions: Vec::new(),
                committed: false,
            }),
        }
    }

    /// The call context handed to fetches and actions.
    pub fn call(&self) -> &CallContext {
        &self.call
    }

    /// Return the value cached under `key`, or run `fetch` and cache its result.
    ///
    /// Errors are not cached, so a later call retries the fetch. Two
    /// concurrent callers missing the same key may both fetch; the first
    /// value stored wins and both callers receive it. This intentionally
    /// departs from last-writer-wins so every caller observes the same value.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: impl Into<String>,
        fetch: F,
    ) -> Result<Arc<T>, ContextError>
    where
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = key.into();

        let cached = self.cache.get(&key).map(|entry| entry.value().clone());
        if let Some(value) = cached {
            metrics::record_cache_lookup(true);
            return downcast(key, value);
        }
        metrics::record_cache_lookup(false);

        let value = match fetch(self.call.clone()).await {
            Ok(value) => value,
            Err(e) => {
                let source: BoxError = e.into();
                tracing::debug!(key = %key, error = %source, "Fetch failed, not cached");
                return Err(ContextError::Fetch { key, source });
            }
        };

        let fresh: CachedValue = Arc::new(value);
        let stored = self.cache.entry(key.clone()).or_insert(fresh).value().clone();
        downcast(key, stored)
    }

    /// [`get_or_fetch`](Self::get_or_fetch) keyed and fetched by `provider`.
    pub async fn load<P>(&self, provider: &P) -> Result<Arc<P::Output>, ContextError>
    where
        P: DataProvider + ?Sized,
    {
        self.get_or_fetch(provider.key(), |ctx| async move { provider.fetch(&ctx).await })
            .await
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    /// Stage `action` for the next commit.
    pub fn add_action(&self, action: impl Action + 'static) -> Result<(), ContextError> {
        let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        if ledger.committed {
            return Err(ContextError::AlreadyCommitted);
        }
        ledger.actions.push(Box::new(action));
        Ok(())
    }

    pub fn pending_actions(&self) -> usize {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .actions
            .len()
    }

    pub fn is_committed(&self) -> bool {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner).committed
    }

    /// Execute staged actions under this context's call context.
    pub async fn commit(&self) -> Result<(), ContextError> {
        self.commit_with(&self.call).await
    }

    /// Execute staged actions in order under `ctx`.
    ///
    /// The ledger is marked committed whether or not this succeeds. On the
    /// first failure, previously executed actions are rolled back in reverse
    /// order under a detached context, so a cancelled caller still gets its
    /// compensations. Rollback failures are collected, not propagated.
    pub async fn commit_with(&self, ctx: &CallContext) -> Result<(), ContextError> {
        let actions = {
            let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
            if ledger.committed {
                metrics::record_commit("rejected");
                return Err(ContextError::AlreadyCommitted);
            }
            ledger.committed = true;
            std::mem::take(&mut ledger.actions)
        };

        for (index, action) in actions.iter().enumerate() {
            if let Err(source) = action.execute(ctx).await {
                tracing::warn!(
                    index = index,
                    action = action.description(),
                    error = %source,
                    request_id = ctx.request_id().unwrap_or("-"),
                    "Staged action failed, rolling back"
                );
                let rollback = roll_back(&actions[..index], &ctx.detached()).await;
                metrics::record_commit("rolled_back");
                return Err(ContextError::ActionFailed {
                    index,
                    description: action.description().to_string(),
                    source,
                    rollback,
                });
            }
        }

        tracing::debug!(actions = actions.len(), "Request context committed");
        metrics::record_commit("committed");
        Ok(())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("cached_keys", &self.cache.len())
            .field("pending_actions", &self.pending_actions())
            .field("committed", &self.is_committed())
            .finish()
    }
}

async fn roll_back(executed: &[Box<dyn Action>], ctx: &CallContext) -> RollbackReport {
    let mut report = RollbackReport::default();
    for (index, action) in executed.iter().enumerate().rev() {
        match action.rollback(ctx).await {
            Ok(()) => report.rolled_back.push(action.description().to_string()),
            Err(error) => {
                tracing::error!(
                    index = index,
                    action = action.description(),
                    error = %error,
                    "Rollback failed, continuing"
                );
                metrics::record_rollback_failure();
                report.failures.push(RollbackFailure {
                    index,
                    description: action.description().to_string(),
                    error,
                });
            }
        }
    }
    report
}

fn downcast<T: Send + Sync + 'static>(key: String, value: CachedValue) -> Result<Arc<T>, ContextError> {
    value
        .downcast::<T>()
        .map_err(|_| ContextError::TypeMismatch { key })
}

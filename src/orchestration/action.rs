//! Staged actions and rollback reporting.
//!
//! An action is a reversible unit of work ("reserve inventory", "charge
//! payment"). Actions are staged on a [`RequestContext`] and executed on
//! commit; when one fails, the ones already executed are compensated in
//! reverse order.
//!
//! [`RequestContext`]: crate::orchestration::RequestContext

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::http::error::BoxError;
use crate::resilience::timeouts::CallContext;

/// Caller-supplied unit of staged work.
#[async_trait]
pub trait Action: Send + Sync {
    async fn execute(&self, ctx: &CallContext) -> Result<(), BoxError>;

    /// Undo a successful `execute`. Only called for actions that completed.
    async fn rollback(&self, ctx: &CallContext) -> Result<(), BoxError>;

    fn description(&self) -> &str;
}

/// Action built from a pair of closures.
///
/// Each closure receives an owned clone of the call context.
pub struct FnAction<E, R> {
    description: String,
    execute: E,
    rollback: R,
}

impl<E, R> FnAction<E, R> {
    pub fn new<EFut, RFut>(description: impl Into<String>, execute: E, rollback: R) -> Self
    where
        E: Fn(CallContext) -> EFut,
        EFut: Future<Output = Result<(), BoxError>>,
        R: Fn(CallContext) -> RFut,
        RFut: Future<Output = Result<(), BoxError>>,
    {
        Self {
            description: description.into(),
            execute,
            rollback,
        }
    }
}

#[async_trait]
impl<E, EFut, R, RFut> Action for FnAction<E, R>
where
    E: Fn(CallContext) -> EFut + Send + Sync,
    EFut: Future<Output = Result<(), BoxError>> + Send,
    R: Fn(CallContext) -> RFut + Send + Sync,
    RFut: Future<Output = Result<(), BoxError>> + Send,
{
    async fn execute(&self, ctx: &CallContext) -> Result<(), BoxError> {
        (self.execute)(ctx.clone()).await
    }

    async fn rollback(&self, ctx: &CallContext) -> Result<(), BoxError> {
        (self.rollback)(ctx.clone()).await
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl<E, R> fmt::Debug for FnAction<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A compensation that failed during rollback.
#[derive(Debug)]
pub struct RollbackFailure {
    /// Position of the action in the ledger.
    pub index: usize,
    pub description: String,
    pub error: BoxError,
}

/// What happened while compensating after a failed commit.
///
/// `rolled_back` lists descriptions in the order compensation ran (reverse
/// execution order).
#[derive(Debug, Default)]
pub struct RollbackReport {
    pub rolled_back: Vec<String>,
    pub failures: Vec<RollbackFailure>,
}

impl RollbackReport {
    /// Every compensation succeeded (or there was nothing to undo).
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for RollbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rolled back {} action(s), {} rollback failure(s)",
            self.rolled_back.len(),
            self.failures.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_action_invokes_closures() {
        let executed = Arc::new(AtomicU32::new(0));
        let undone = Arc::new(AtomicU32::new(0));
        let (e, u) = (executed.clone(), undone.clone());

        let action = FnAction::new(
            "reserve inventory",
            move |_ctx| {
                let e = e.clone();
                async move {
                    e.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), BoxError>(())
                }
            },
            move |_ctx| {
                let u = u.clone();
                async move {
                    u.fetch_add(1, Ordering::SeqCst);
                    Err::<(), BoxError>("already released".into())
                }
            },
        );

        let ctx = CallContext::background();
        assert_eq!(action.description(), "reserve inventory");
        action.execute(&ctx).await.unwrap();
        assert!(action.rollback(&ctx).await.is_err());
        assert_eq!(executed.load(Ordering::SeqCst), 1);
        assert_eq!(undone.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_report_display() {
        let report = RollbackReport {
            rolled_back: vec!["b".into(), "a".into()],
            failures: vec![RollbackFailure {
                index: 2,
                description: "c".into(),
                error: "boom".into(),
            }],
        };
        assert!(!report.is_clean());
        assert_eq!(report.to_string(), "rolled back 2 action(s), 1 rollback failure(s)");
        assert!(RollbackReport::default().is_clean());
    }
}

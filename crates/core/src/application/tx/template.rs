// Transaction Template - propagation, rollback-only and guaranteed cleanup

use super::{TransactionHooks, TransactionStatus};
use crate::application::scope::{ExecutionScope, SuspendedResources};
use crate::domain::{Propagation, TransactionDefinition, TransactionState};
use crate::error::{AppError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Drives a [`TransactionHooks`] implementation through begin, commit or
/// rollback, and cleanup.
///
/// # Example
/// ```text
/// let value = template
///     .execute(&mut scope, TransactionDefinition::default(), |scope| {
///         Box::pin(async move {
///             let context = scope.current().expect("bound by begin");
///             context.insert(&artist)?;
///             Ok(artist.id)
///         })
///     })
///     .await?;
/// ```
#[derive(Clone)]
pub struct TransactionTemplate {
    hooks: Arc<dyn TransactionHooks>,
}

impl TransactionTemplate {
    pub fn new(hooks: Arc<dyn TransactionHooks>) -> Self {
        Self { hooks }
    }

    /// Start a unit-of-work, joining or suspending a running one per propagation
    pub async fn begin(
        &self,
        scope: &mut ExecutionScope,
        definition: TransactionDefinition,
    ) -> Result<TransactionStatus> {
        let mut status = self.hooks.get_transaction(scope, definition);

        if !self.hooks.is_existing_transaction(scope) {
            self.start(scope, &mut status, None).await?;
            return Ok(status);
        }

        match status.definition.propagation {
            Propagation::Normal => {
                debug!("Participating in existing transaction");
                status.context = scope.holder().map(|h| h.context().clone());
                status.transition(TransactionState::Active)?;
            }
            Propagation::RequiresNew => {
                debug!("Suspending current transaction, creating new transaction");
                let suspended = self.hooks.suspend(scope);
                self.start(scope, &mut status, Some(suspended)).await?;
            }
        }
        Ok(status)
    }

    async fn start(
        &self,
        scope: &mut ExecutionScope,
        status: &mut TransactionStatus,
        suspended: Option<SuspendedResources>,
    ) -> Result<()> {
        status.new_transaction = true;
        status.suspended = suspended;

        if let Err(e) = self.hooks.begin(scope, status).await {
            if let Some(suspended) = status.suspended.take() {
                self.hooks.resume(scope, suspended);
            }
            return Err(e);
        }
        status.transition(TransactionState::Active)
    }

    /// Commit, unless the handle or the running transaction is rollback-only
    ///
    /// A global rollback-only mark set by a participant rolls the transaction
    /// back and fails with [`AppError::UnexpectedRollback`].
    pub async fn commit(
        &self,
        scope: &mut ExecutionScope,
        status: &mut TransactionStatus,
    ) -> Result<()> {
        ensure_active(status)?;

        if status.rollback_only {
            debug!("Transactional code has requested rollback");
            return self.process_rollback(scope, status, false).await;
        }
        if status.new_transaction && self.hooks.is_global_rollback_only(scope) {
            debug!("Global transaction is marked as rollback-only but transactional code requested commit");
            return self.process_rollback(scope, status, true).await;
        }

        let result = if status.new_transaction {
            self.hooks.commit(scope, status).await
        } else {
            Ok(())
        };

        // a failed commit leaves the connection rolled back by the driver
        let next = if result.is_ok() {
            TransactionState::Committed
        } else {
            TransactionState::RolledBack
        };
        let transitioned = status.transition(next);
        self.cleanup_after_completion(scope, status).await;
        result.and(transitioned)
    }

    pub async fn rollback(
        &self,
        scope: &mut ExecutionScope,
        status: &mut TransactionStatus,
    ) -> Result<()> {
        ensure_active(status)?;
        self.process_rollback(scope, status, false).await
    }

    /// Mark this handle so that `commit` rolls back instead
    pub fn set_rollback_only(&self, status: &mut TransactionStatus) {
        status.rollback_only = true;
    }

    async fn process_rollback(
        &self,
        scope: &mut ExecutionScope,
        status: &mut TransactionStatus,
        unexpected: bool,
    ) -> Result<()> {
        let result = if status.new_transaction {
            self.hooks.rollback(scope, status).await
        } else {
            debug!("Participating transaction failed - marking existing transaction as rollback-only");
            self.hooks.set_rollback_only(scope, status);
            Ok(())
        };

        let transitioned = status.transition(TransactionState::RolledBack);
        self.cleanup_after_completion(scope, status).await;
        result.and(transitioned)?;

        if unexpected {
            return Err(AppError::UnexpectedRollback);
        }
        Ok(())
    }

    async fn cleanup_after_completion(
        &self,
        scope: &mut ExecutionScope,
        status: &mut TransactionStatus,
    ) {
        if status.new_transaction {
            self.hooks.cleanup_after_completion(scope, status).await;
        }
        if let Err(e) = status.transition(TransactionState::CleanedUp) {
            warn!(error = %e, "Transaction cleaned up from unexpected state");
        }
        if let Some(suspended) = status.suspended.take() {
            debug!("Resuming suspended transaction after completion of inner transaction");
            self.hooks.resume(scope, suspended);
        }
    }

    /// Run `work` in a unit-of-work
    ///
    /// Commits when `work` returns `Ok`; rolls back when it returns `Err` or
    /// panics, re-raising the panic afterwards. Cleanup runs on every path.
    pub async fn execute<T, F>(
        &self,
        scope: &mut ExecutionScope,
        definition: TransactionDefinition,
        work: F,
    ) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut ExecutionScope) -> BoxFuture<'s, Result<T>>,
    {
        let mut status = self.begin(scope, definition).await?;

        let outcome = AssertUnwindSafe(work(scope)).catch_unwind().await;
        match outcome {
            Ok(Ok(value)) => {
                self.commit(scope, &mut status).await?;
                Ok(value)
            }
            Ok(Err(e)) => {
                if let Err(rollback_error) = self.rollback(scope, &mut status).await {
                    error!(error = %e, "Application error overridden by rollback error");
                    return Err(rollback_error);
                }
                Err(e)
            }
            Err(panic) => {
                if let Err(rollback_error) = self.rollback(scope, &mut status).await {
                    error!(error = %rollback_error, "Rollback after panic failed");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

fn ensure_active(status: &TransactionStatus) -> Result<()> {
    if status.state != TransactionState::Active {
        return Err(AppError::IllegalTransactionState(format!(
            "transaction is {}; do not call commit or rollback more than once per transaction",
            status.state
        )));
    }
    Ok(())
}

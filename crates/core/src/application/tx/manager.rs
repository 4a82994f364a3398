// Context Transaction Manager
//
// Binds a pooled connection and a persistence context together for the
// lifetime of a transaction and exposes the context as the scope's ambient
// context.

use super::{TransactionHooks, TransactionStatus};
use crate::application::scope::{ConnectionHolder, ExecutionScope, SuspendedResources};
use crate::domain::{IsolationLevel, Propagation, TransactionDefinition};
use crate::error::{AppError, Result};
use crate::port::{
    Connection, ConnectionSource, ContextAccessor, PersistenceContext, PersistenceRuntime,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ContextTransactionManager {
    runtime: Arc<dyn PersistenceRuntime>,
    source: Arc<dyn ConnectionSource>,
}

impl ContextTransactionManager {
    pub fn new(runtime: Arc<dyn PersistenceRuntime>, source: Arc<dyn ConnectionSource>) -> Self {
        Self { runtime, source }
    }

    pub fn runtime(&self) -> &Arc<dyn PersistenceRuntime> {
        &self.runtime
    }

    pub fn source(&self) -> &Arc<dyn ConnectionSource> {
        &self.source
    }

    /// Context for a new connection holder
    ///
    /// `RequiresNew` always gets a fresh context on the parent's channel (or the
    /// runtime default); otherwise the ambient context is reused.
    fn resolve_context(
        &self,
        scope: &ExecutionScope,
        definition: &TransactionDefinition,
    ) -> Result<Arc<dyn PersistenceContext>> {
        let parent = scope.current();
        match definition.propagation {
            Propagation::RequiresNew => {
                let channel = parent.map(|p| p.channel());
                self.runtime.new_context(channel)
            }
            Propagation::Normal => match parent {
                Some(context) => Ok(context),
                None => self.runtime.new_context(None),
            },
        }
    }

    async fn prepare(
        &self,
        holder: &mut ConnectionHolder,
        status: &mut TransactionStatus,
    ) -> Result<()> {
        holder.set_synchronized_with_transaction(true);
        let connection = holder.connection_mut();

        if status.definition.read_only {
            connection.set_read_only(true).await?;
            status.must_restore_read_only = true;
        }

        if let Some(level) = status.definition.isolation {
            let current = connection.isolation_level().await?;
            if current != level {
                debug!(connection = connection.id(), from = %current, to = %level, "Changing isolation level");
                connection.set_isolation_level(level).await?;
                status.previous_isolation = Some(current);
            }
        }

        if connection.auto_commit() {
            debug!(connection = connection.id(), "Switching connection to manual commit");
            status.must_restore_auto_commit = true;
            connection.set_auto_commit(false).await?;
        }

        if let Some(timeout) = status.definition.timeout() {
            holder.set_timeout(timeout)?;
        }
        holder.set_transaction_active(true);
        Ok(())
    }

    async fn reset_connection(&self, connection: &mut dyn Connection, reset: ConnectionReset) {
        if reset.auto_commit {
            if let Err(e) = connection.set_auto_commit(true).await {
                warn!(connection = connection.id(), error = %e, "Could not restore auto-commit after transaction");
            }
        }
        if let Some(level) = reset.isolation {
            if let Err(e) = connection.set_isolation_level(level).await {
                warn!(connection = connection.id(), error = %e, "Could not restore isolation level after transaction");
            }
        }
        if reset.read_only {
            if let Err(e) = connection.set_read_only(false).await {
                warn!(connection = connection.id(), error = %e, "Could not reset read-only flag after transaction");
            }
        }
    }
}

/// Connection settings changed by `begin` that cleanup must undo
#[derive(Clone, Copy)]
struct ConnectionReset {
    auto_commit: bool,
    isolation: Option<IsolationLevel>,
    read_only: bool,
}

fn creation_error(e: AppError) -> AppError {
    AppError::TransactionCreation(format!("could not open connection for transaction: {e}"))
}

#[async_trait]
impl TransactionHooks for ContextTransactionManager {
    fn get_transaction(
        &self,
        _scope: &ExecutionScope,
        definition: TransactionDefinition,
    ) -> TransactionStatus {
        TransactionStatus::new(definition)
    }

    fn is_existing_transaction(&self, scope: &ExecutionScope) -> bool {
        scope.holder().is_some_and(|h| h.is_transaction_active())
    }

    fn is_global_rollback_only(&self, scope: &ExecutionScope) -> bool {
        scope.holder().is_some_and(|h| h.is_rollback_only())
    }

    async fn begin(
        &self,
        scope: &mut ExecutionScope,
        status: &mut TransactionStatus,
    ) -> Result<()> {
        debug!(
            name = status.definition.name.as_deref(),
            propagation = ?status.definition.propagation,
            "Beginning transaction"
        );

        let reuse = scope
            .holder()
            .is_some_and(|h| !h.is_synchronized_with_transaction());
        if !reuse && scope.holder().is_some() {
            return Err(AppError::TransactionCreation(
                "a synchronized connection is already bound to this scope".to_string(),
            ));
        }

        status.previous_context = scope.current();

        let mut acquired = None;
        if !reuse {
            let connection = self.source.acquire().await.map_err(creation_error)?;
            debug!(connection = connection.id(), "Acquired connection for transaction");
            let context = match self.resolve_context(scope, &status.definition) {
                Ok(context) => context,
                Err(e) => {
                    self.source.release(connection).await;
                    return Err(creation_error(e));
                }
            };
            acquired = Some(ConnectionHolder::new(connection, context));
            status.new_holder = true;
        }

        let context = match acquired.as_ref().or(scope.holder()) {
            Some(holder) => holder.context().clone(),
            None => {
                return Err(AppError::TransactionCreation(
                    "no connection holder available".to_string(),
                ))
            }
        };
        scope.bind(Some(context.clone()));
        status.context = Some(context);

        let prepared = match acquired.as_mut() {
            Some(holder) => self.prepare(holder, status).await,
            None => match scope.holder_mut() {
                Some(holder) => self.prepare(holder, status).await,
                None => Ok(()),
            },
        };

        if let Err(e) = prepared {
            let reset = ConnectionReset {
                auto_commit: status.must_restore_auto_commit,
                isolation: status.previous_isolation.take(),
                read_only: status.must_restore_read_only,
            };
            status.must_restore_auto_commit = false;
            status.must_restore_read_only = false;
            if let Some(mut holder) = acquired {
                self.reset_connection(holder.connection_mut(), reset).await;
                self.source.release(holder.into_connection()).await;
            } else if let Some(holder) = scope.holder_mut() {
                self.reset_connection(holder.connection_mut(), reset).await;
                holder.clear();
            }
            scope.bind(status.previous_context.take());
            status.context = None;
            status.new_holder = false;
            return Err(creation_error(e));
        }

        if let Some(holder) = acquired {
            scope.bind_holder(holder).map_err(creation_error)?;
        }
        Ok(())
    }

    async fn commit(
        &self,
        scope: &mut ExecutionScope,
        _status: &mut TransactionStatus,
    ) -> Result<()> {
        let holder = scope.holder_mut().ok_or_else(|| {
            AppError::IllegalTransactionState("no connection bound for commit".to_string())
        })?;
        let context = holder.context().clone();
        let connection = holder.connection_mut();
        debug!(connection = connection.id(), context = context.id(), "Committing transaction");

        context
            .commit_changes(connection)
            .await
            .map_err(|e| AppError::TransactionCommit(e.to_string()))?;
        connection
            .commit()
            .await
            .map_err(|e| AppError::TransactionCommit(e.to_string()))
    }

    async fn rollback(
        &self,
        scope: &mut ExecutionScope,
        _status: &mut TransactionStatus,
    ) -> Result<()> {
        let holder = scope.holder_mut().ok_or_else(|| {
            AppError::IllegalTransactionState("no connection bound for rollback".to_string())
        })?;
        let context = holder.context().clone();
        let connection = holder.connection_mut();
        debug!(connection = connection.id(), context = context.id(), "Rolling back transaction");

        let discarded = context.rollback_changes();
        let rolled_back = connection.rollback().await;
        discarded
            .and(rolled_back)
            .map_err(|e| AppError::TransactionRollback(e.to_string()))
    }

    fn set_rollback_only(&self, scope: &mut ExecutionScope, _status: &TransactionStatus) {
        if let Some(holder) = scope.holder_mut() {
            debug!(connection = holder.connection().id(), "Marking transaction rollback-only");
            holder.set_rollback_only();
        }
    }

    fn suspend(&self, scope: &mut ExecutionScope) -> SuspendedResources {
        debug!("Suspending transaction");
        scope.suspend()
    }

    fn resume(&self, scope: &mut ExecutionScope, suspended: SuspendedResources) {
        debug!("Resuming transaction");
        scope.resume(suspended);
    }

    async fn cleanup_after_completion(
        &self,
        scope: &mut ExecutionScope,
        status: &mut TransactionStatus,
    ) {
        let mut owned = if status.new_holder {
            scope.unbind_holder()
        } else {
            None
        };

        let reset = ConnectionReset {
            auto_commit: status.must_restore_auto_commit,
            isolation: status.previous_isolation,
            read_only: status.must_restore_read_only,
        };
        let holder = match owned.as_mut() {
            Some(holder) => Some(holder),
            None => scope.holder_mut(),
        };
        if let Some(holder) = holder {
            self.reset_connection(holder.connection_mut(), reset).await;
            holder.clear();
        }

        if let Some(holder) = owned {
            let connection = holder.into_connection();
            debug!(connection = connection.id(), "Releasing connection after transaction");
            self.source.release(connection).await;
            scope.bind(status.previous_context.take());
        }
    }
}

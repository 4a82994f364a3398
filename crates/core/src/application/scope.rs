// Execution Scope - explicit per-request ambient binding
//
// Each inbound request (or spawned unit of work) owns one ExecutionScope and
// passes it by `&mut` to everything that needs the ambient context. Nothing is
// stored in globals or thread-locals.

use crate::error::{AppError, Result};
use crate::port::{Connection, ContextAccessor, PersistenceContext, PersistenceRuntime};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A connection paired with the persistence context bound to it
pub struct ConnectionHolder {
    connection: Box<dyn Connection>,
    context: Arc<dyn PersistenceContext>,
    synchronized_with_transaction: bool,
    transaction_active: bool,
    rollback_only: bool,
    deadline: Option<Instant>,
}

impl ConnectionHolder {
    pub fn new(connection: Box<dyn Connection>, context: Arc<dyn PersistenceContext>) -> Self {
        Self {
            connection,
            context,
            synchronized_with_transaction: false,
            transaction_active: false,
            rollback_only: false,
            deadline: None,
        }
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    pub fn connection_mut(&mut self) -> &mut dyn Connection {
        self.connection.as_mut()
    }

    pub fn context(&self) -> &Arc<dyn PersistenceContext> {
        &self.context
    }

    pub fn is_synchronized_with_transaction(&self) -> bool {
        self.synchronized_with_transaction
    }

    pub fn set_synchronized_with_transaction(&mut self, synchronized: bool) {
        self.synchronized_with_transaction = synchronized;
    }

    pub fn is_transaction_active(&self) -> bool {
        self.transaction_active
    }

    pub fn set_transaction_active(&mut self, active: bool) {
        self.transaction_active = active;
    }

    /// Set by participants that failed; forces the owning transaction to roll back
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails when the deadline is not representable
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now().checked_add(timeout).ok_or_else(|| {
            AppError::Validation(format!(
                "transaction timeout of {}s is out of range",
                timeout.as_secs()
            ))
        })?;
        self.deadline = Some(deadline);
        self.connection.set_deadline(Some(deadline));
        Ok(())
    }

    /// Reset all transactional state after completion
    pub fn clear(&mut self) {
        self.synchronized_with_transaction = false;
        self.transaction_active = false;
        self.rollback_only = false;
        self.deadline = None;
        self.connection.set_deadline(None);
    }

    pub fn into_connection(self) -> Box<dyn Connection> {
        self.connection
    }
}

/// Resources of an enclosing transaction, parked while an inner one runs
pub struct SuspendedResources {
    holder: Option<ConnectionHolder>,
    context: Option<Arc<dyn PersistenceContext>>,
}

impl SuspendedResources {
    pub fn has_holder(&self) -> bool {
        self.holder.is_some()
    }
}

/// Ambient binding for one request or task
#[derive(Default)]
pub struct ExecutionScope {
    context: Option<Arc<dyn PersistenceContext>>,
    holder: Option<ConnectionHolder>,
}

impl ExecutionScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self) -> Option<&ConnectionHolder> {
        self.holder.as_ref()
    }

    pub fn holder_mut(&mut self) -> Option<&mut ConnectionHolder> {
        self.holder.as_mut()
    }

    /// Connection of the bound holder, if any
    pub fn connection_mut(&mut self) -> Option<&mut dyn Connection> {
        self.holder.as_mut().map(|h| h.connection_mut())
    }

    /// Bind a connection holder; at most one can be bound at a time
    pub fn bind_holder(&mut self, holder: ConnectionHolder) -> Result<()> {
        if self.holder.is_some() {
            return Err(AppError::IllegalTransactionState(
                "a connection holder is already bound to this scope".to_string(),
            ));
        }
        self.holder = Some(holder);
        Ok(())
    }

    pub fn unbind_holder(&mut self) -> Option<ConnectionHolder> {
        self.holder.take()
    }

    /// True when nothing is bound
    pub fn is_empty(&self) -> bool {
        self.context.is_none() && self.holder.is_none()
    }

    /// Park the bound holder; the ambient context stays visible until rebound
    pub fn suspend(&mut self) -> SuspendedResources {
        SuspendedResources {
            holder: self.holder.take(),
            context: self.context.clone(),
        }
    }

    pub fn resume(&mut self, suspended: SuspendedResources) {
        self.holder = suspended.holder;
        self.context = suspended.context;
    }
}

impl ContextAccessor for ExecutionScope {
    fn current(&self) -> Option<Arc<dyn PersistenceContext>> {
        self.context.clone()
    }

    fn bind(&mut self, context: Option<Arc<dyn PersistenceContext>>) {
        self.context = context;
    }
}

/// Hands out the ambient context, creating and binding one on first use
#[derive(Clone)]
pub struct ContextProvider {
    runtime: Arc<dyn PersistenceRuntime>,
}

impl ContextProvider {
    pub fn new(runtime: Arc<dyn PersistenceRuntime>) -> Self {
        Self { runtime }
    }

    pub fn context(&self, scope: &mut dyn ContextAccessor) -> Result<Arc<dyn PersistenceContext>> {
        if let Some(context) = scope.current() {
            return Ok(context);
        }
        let context = self.runtime.new_context(None)?;
        debug!(context = context.id(), "Bound new request context");
        scope.bind(Some(context.clone()));
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{MockConnection, MockRuntime};

    #[test]
    fn test_bind_and_clear_context() {
        let runtime = MockRuntime::new();
        let mut scope = ExecutionScope::new();
        assert!(scope.current().is_none());

        let ctx = runtime.new_context(None).unwrap();
        scope.bind(Some(ctx.clone()));
        assert!(Arc::ptr_eq(&scope.current().unwrap(), &ctx));

        scope.bind(None);
        assert!(scope.is_empty());
    }

    #[test]
    fn test_only_one_holder_bound() {
        let runtime = MockRuntime::new();
        let mut scope = ExecutionScope::new();
        let ctx = runtime.new_context(None).unwrap();

        tokio_test::assert_ok!(
            scope.bind_holder(ConnectionHolder::new(MockConnection::boxed(1), ctx.clone()))
        );
        let err = tokio_test::assert_err!(
            scope.bind_holder(ConnectionHolder::new(MockConnection::boxed(2), ctx))
        );
        assert!(matches!(err, AppError::IllegalTransactionState(_)));
        assert_eq!(scope.connection_mut().unwrap().id(), 1);
    }

    #[test]
    fn test_suspend_keeps_context_visible() {
        let runtime = MockRuntime::new();
        let mut scope = ExecutionScope::new();
        let ctx = runtime.new_context(None).unwrap();
        scope.bind(Some(ctx.clone()));
        scope
            .bind_holder(ConnectionHolder::new(MockConnection::boxed(1), ctx.clone()))
            .unwrap();

        let suspended = scope.suspend();
        assert!(suspended.has_holder());
        assert!(scope.holder().is_none());
        assert!(scope.current().is_some());

        scope.bind(None);
        scope.resume(suspended);
        assert!(Arc::ptr_eq(&scope.current().unwrap(), &ctx));
        assert!(scope.holder().is_some());
    }

    #[test]
    fn test_provider_reuses_bound_context() {
        let runtime = Arc::new(MockRuntime::new());
        let provider = ContextProvider::new(runtime.clone());
        let mut scope = ExecutionScope::new();

        let first = provider.context(&mut scope).unwrap();
        let second = provider.context(&mut scope).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(runtime.created(), 1);
    }
}

// Request Lifecycle - per-request scope setup and teardown

use crate::application::scope::ExecutionScope;
use crate::error::Result;
use crate::port::{ConnectionSource, ContextAccessor, PersistenceContext};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Hooks run around every inbound request
///
/// Teardown flushes whatever the request left in its ambient context outside
/// of an explicit transaction, then clears the binding so nothing leaks into
/// the next request served from the same scope.
#[derive(Clone)]
pub struct RequestLifecycle {
    source: Arc<dyn ConnectionSource>,
}

impl RequestLifecycle {
    pub fn new(source: Arc<dyn ConnectionSource>) -> Self {
        Self { source }
    }

    pub fn request_initialized(&self) -> ExecutionScope {
        ExecutionScope::new()
    }

    pub async fn request_destroyed(&self, scope: &mut ExecutionScope) {
        if let Some(holder) = scope.unbind_holder() {
            // an abandoned transaction's changes are never flushed
            if let Err(e) = holder.context().rollback_changes() {
                warn!(context = holder.context().id(), error = %e, "Could not discard abandoned changes");
            }
            let connection = holder.into_connection();
            warn!(
                connection = connection.id(),
                "Request ended inside an unfinished transaction, releasing connection"
            );
            self.source.release(connection).await;
        }

        if let Some(context) = scope.current() {
            if context.has_changes() {
                if let Err(e) = self.flush(context.as_ref()).await {
                    error!(context = context.id(), error = %e, "Failed to flush request context");
                }
            }
            scope.bind(None);
        }
    }

    async fn flush(&self, context: &dyn PersistenceContext) -> Result<()> {
        debug!(context = context.id(), "Flushing leftover request changes");
        let mut connection = self.source.acquire().await?;

        let flushed = async {
            connection.set_auto_commit(false).await?;
            context.commit_changes(connection.as_mut()).await?;
            connection.commit().await
        }
        .await;

        if flushed.is_err() {
            if let Err(e) = connection.rollback().await {
                warn!(connection = connection.id(), error = %e, "Rollback of failed flush failed");
            }
        }
        if let Err(e) = connection.set_auto_commit(true).await {
            warn!(connection = connection.id(), error = %e, "Could not restore auto-commit");
        }
        self.source.release(connection).await;
        flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::scope::ConnectionHolder;
    use crate::application::testing::{record, MockChannel, MockRuntime, MockSource};
    use crate::application::ObjectContext;
    use crate::domain::Change;
    use crate::port::PersistenceRuntime;

    #[tokio::test]
    async fn test_destroyed_flushes_and_clears() {
        let source = Arc::new(MockSource::new());
        let runtime = MockRuntime::new();
        let lifecycle = RequestLifecycle::new(source.clone());
        let mut scope = lifecycle.request_initialized();

        let context = runtime.new_context(None).unwrap();
        context.register(Change::Insert(record("Artist", 1, "Monet")));
        scope.bind(Some(context.clone()));

        lifecycle.request_destroyed(&mut scope).await;

        assert!(scope.is_empty());
        assert!(!context.has_changes());
        assert_eq!(runtime.mock_channel().flushed().len(), 1);
        assert_eq!(source.state(1).lock().commits, 2);
        assert_eq!(source.released(), vec![1]);
    }

    #[tokio::test]
    async fn test_clean_context_needs_no_connection() {
        let source = Arc::new(MockSource::new());
        let runtime = MockRuntime::new();
        let lifecycle = RequestLifecycle::new(source.clone());
        let mut scope = lifecycle.request_initialized();
        scope.bind(Some(runtime.new_context(None).unwrap()));

        lifecycle.request_destroyed(&mut scope).await;

        assert!(scope.is_empty());
        assert_eq!(source.acquired(), 0);
    }

    #[tokio::test]
    async fn test_flush_failure_is_swallowed() {
        let source = Arc::new(MockSource::new());
        let lifecycle = RequestLifecycle::new(source.clone());
        let mut scope = lifecycle.request_initialized();

        let context: Arc<dyn PersistenceContext> =
            Arc::new(ObjectContext::new(Arc::new(MockChannel::failing())));
        context.register(Change::Insert(record("Artist", 1, "Monet")));
        scope.bind(Some(context.clone()));

        lifecycle.request_destroyed(&mut scope).await;

        assert!(scope.is_empty());
        assert!(context.has_changes());
        assert_eq!(source.state(1).lock().rollbacks, 1);
        assert_eq!(source.released(), vec![1]);
    }

    #[tokio::test]
    async fn test_leaked_holder_is_released() {
        let source = Arc::new(MockSource::new());
        let runtime = MockRuntime::new();
        let lifecycle = RequestLifecycle::new(source.clone());
        let mut scope = lifecycle.request_initialized();

        let connection = source.acquire().await.unwrap();
        let context = runtime.new_context(None).unwrap();
        context.register(Change::Insert(record("Artist", 1, "Monet")));
        scope.bind(Some(context.clone()));
        scope
            .bind_holder(ConnectionHolder::new(connection, context.clone()))
            .unwrap();

        lifecycle.request_destroyed(&mut scope).await;
        assert!(scope.is_empty());
        assert!(!context.has_changes());
        // no second connection was taken for a flush
        assert_eq!(source.acquired(), 1);
        assert_eq!(source.released(), vec![1]);
    }
}

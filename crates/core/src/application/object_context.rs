// Object Context - in-memory unit of pending changes over a data channel

use crate::domain::{Change, ChangeSet, Record};
use crate::error::Result;
use crate::port::{Connection, DataChannel, PersistenceContext, PersistenceRuntime};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Persistence context tracking inserts, updates and deletes until commit
///
/// Contexts sharing a channel never see each other's pending changes; they
/// only meet in storage once committed.
pub struct ObjectContext {
    id: u64,
    channel: Arc<dyn DataChannel>,
    changes: Mutex<ChangeSet>,
}

impl ObjectContext {
    pub fn new(channel: Arc<dyn DataChannel>) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            channel,
            changes: Mutex::new(ChangeSet::new()),
        }
    }

    /// Snapshot of the pending changes
    pub fn pending(&self) -> ChangeSet {
        self.changes.lock().clone()
    }
}

#[async_trait]
impl PersistenceContext for ObjectContext {
    fn id(&self) -> u64 {
        self.id
    }

    fn channel(&self) -> Arc<dyn DataChannel> {
        self.channel.clone()
    }

    fn has_changes(&self) -> bool {
        !self.changes.lock().is_empty()
    }

    fn register(&self, change: Change) {
        self.changes.lock().push(change);
    }

    async fn commit_changes(&self, connection: &mut dyn Connection) -> Result<()> {
        let changes = std::mem::take(&mut *self.changes.lock());
        if changes.is_empty() {
            return Ok(());
        }

        debug!(
            context = self.id,
            channel = self.channel.name(),
            changes = changes.len(),
            "Committing context changes"
        );

        if let Err(e) = self.channel.commit(connection, &changes).await {
            // put the flushed changes back in front of anything registered meanwhile
            let mut pending = self.changes.lock();
            let newer = std::mem::take(&mut *pending);
            *pending = changes.into_iter().chain(newer).collect();
            return Err(e);
        }
        Ok(())
    }

    fn rollback_changes(&self) -> Result<()> {
        let mut pending = self.changes.lock();
        if !pending.is_empty() {
            debug!(context = self.id, changes = pending.len(), "Discarding context changes");
        }
        pending.clear();
        Ok(())
    }

    async fn fetch(
        &self,
        connection: &mut dyn Connection,
        entity: &str,
        id: i64,
    ) -> Result<Option<Record>> {
        let pending = self.changes.lock().get(entity, id).cloned();
        match pending {
            Some(Change::Insert(record) | Change::Update(record)) => Ok(Some(record)),
            Some(Change::Delete { .. }) => Ok(None),
            None => self.channel.fetch(connection, entity, id).await,
        }
    }
}

/// Runtime creating [`ObjectContext`]s on a default channel
pub struct ObjectRuntime {
    channel: Arc<dyn DataChannel>,
}

impl ObjectRuntime {
    pub fn new(channel: Arc<dyn DataChannel>) -> Self {
        Self { channel }
    }
}

impl PersistenceRuntime for ObjectRuntime {
    fn channel(&self) -> Arc<dyn DataChannel> {
        self.channel.clone()
    }

    fn new_context(
        &self,
        channel: Option<Arc<dyn DataChannel>>,
    ) -> Result<Arc<dyn PersistenceContext>> {
        let channel = channel.unwrap_or_else(|| self.channel.clone());
        Ok(Arc::new(ObjectContext::new(channel)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{record, MockChannel, MockConnection};

    #[tokio::test]
    async fn test_commit_flushes_and_clears() {
        let channel = Arc::new(MockChannel::new());
        let ctx = ObjectContext::new(channel.clone());
        let mut conn = MockConnection::boxed(1);

        ctx.register(Change::Insert(record("Artist", 1, "Monet")));
        assert!(ctx.has_changes());

        ctx.commit_changes(conn.as_mut()).await.unwrap();
        assert!(!ctx.has_changes());
        assert_eq!(channel.flushed().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_without_changes_is_noop() {
        let channel = Arc::new(MockChannel::new());
        let ctx = ObjectContext::new(channel.clone());
        let (mut conn, state) = MockConnection::tracked(1);

        ctx.commit_changes(conn.as_mut()).await.unwrap();
        assert!(channel.flushed().is_empty());
        assert!(state.lock().executed.is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_changes() {
        let channel = Arc::new(MockChannel::failing());
        let ctx = ObjectContext::new(channel);
        let mut conn = MockConnection::boxed(1);

        ctx.register(Change::Insert(record("Artist", 1, "Monet")));
        assert!(ctx.commit_changes(conn.as_mut()).await.is_err());
        assert_eq!(ctx.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_sees_own_pending_changes() {
        let channel = Arc::new(MockChannel::new());
        let ctx = ObjectContext::new(channel);
        let mut conn = MockConnection::boxed(1);

        ctx.register(Change::Insert(record("Artist", 5, "Degas")));
        let found = ctx.fetch(conn.as_mut(), "Artist", 5).await.unwrap();
        assert_eq!(found.unwrap().body["name"], "Degas");

        ctx.register(Change::Delete {
            entity: "Artist".into(),
            id: 5,
        });
        assert!(ctx.fetch(conn.as_mut(), "Artist", 5).await.unwrap().is_none());
    }

    #[test]
    fn test_sibling_contexts_do_not_share_changes() {
        let runtime = ObjectRuntime::new(Arc::new(MockChannel::new()));
        let a = runtime.new_context(None).unwrap();
        let b = runtime.new_context(Some(a.channel())).unwrap();

        a.register(Change::Insert(record("Artist", 1, "Monet")));
        assert!(a.has_changes());
        assert!(!b.has_changes());
        assert!(Arc::ptr_eq(&a.channel(), &b.channel()));
        assert_ne!(a.id(), b.id());
    }
}

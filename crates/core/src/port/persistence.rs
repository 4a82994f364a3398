// Persistence Runtime Port
//
// The object-persistence runtime is external: this crate only needs to create
// contexts, find their channel and drive commit/rollback of pending changes.

use crate::domain::{Change, ChangeSet, Persistent, Record};
use crate::error::{AppError, Result};
use crate::port::Connection;
use async_trait::async_trait;
use std::sync::Arc;

/// Shared path from contexts to storage
#[async_trait]
pub trait DataChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Write a change set using the given connection (inside its transaction, if any)
    async fn commit(&self, connection: &mut dyn Connection, changes: &ChangeSet) -> Result<()>;

    async fn fetch(
        &self,
        connection: &mut dyn Connection,
        entity: &str,
        id: i64,
    ) -> Result<Option<Record>>;
}

/// Unit of pending object-graph changes
#[async_trait]
pub trait PersistenceContext: Send + Sync {
    /// Identifier for log output
    fn id(&self) -> u64;

    fn channel(&self) -> Arc<dyn DataChannel>;

    fn has_changes(&self) -> bool;

    /// Register a pending change
    fn register(&self, change: Change);

    /// Flush pending changes through the channel; a clean context is a no-op
    async fn commit_changes(&self, connection: &mut dyn Connection) -> Result<()>;

    /// Discard all pending changes
    fn rollback_changes(&self) -> Result<()>;

    /// Look up a record, seeing this context's own pending changes first
    async fn fetch(
        &self,
        connection: &mut dyn Connection,
        entity: &str,
        id: i64,
    ) -> Result<Option<Record>>;
}

impl dyn PersistenceContext {
    pub fn insert<T: Persistent>(&self, object: &T) -> Result<()> {
        self.register(Change::Insert(object.to_record()?));
        Ok(())
    }

    pub fn update<T: Persistent>(&self, object: &T) -> Result<()> {
        self.register(Change::Update(object.to_record()?));
        Ok(())
    }

    pub fn delete<T: Persistent>(&self, object: &T) {
        self.register(Change::Delete {
            entity: T::ENTITY.to_string(),
            id: object.id(),
        });
    }

    pub async fn find<T: Persistent>(
        &self,
        connection: &mut dyn Connection,
        id: i64,
    ) -> Result<Option<T>> {
        match self.fetch(connection, T::ENTITY, id).await? {
            Some(record) => T::from_record(record).map(Some).map_err(AppError::from),
            None => Ok(None),
        }
    }
}

/// Factory for persistence contexts
pub trait PersistenceRuntime: Send + Sync {
    /// Default channel shared by contexts created without an explicit one
    fn channel(&self) -> Arc<dyn DataChannel>;

    /// Create a fresh context on `channel`, or on the default channel when `None`
    fn new_context(
        &self,
        channel: Option<Arc<dyn DataChannel>>,
    ) -> Result<Arc<dyn PersistenceContext>>;
}

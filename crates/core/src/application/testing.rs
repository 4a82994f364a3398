// Hand-written port doubles shared by the application tests

use crate::application::ObjectRuntime;
use crate::domain::{ChangeSet, IsolationLevel, Record};
use crate::error::{AppError, Result};
use crate::port::{
    Connection, ConnectionSource, DataChannel, PersistenceContext, PersistenceRuntime, Statement,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub fn record(entity: &str, id: i64, name: &str) -> Record {
    let Value::Object(body) = json!({ "id": id, "name": name }) else {
        unreachable!()
    };
    Record::new(entity, id, body)
}

/// Observable state of a [`MockConnection`]
#[derive(Debug)]
pub struct ConnState {
    pub auto_commit: bool,
    pub isolation: IsolationLevel,
    pub read_only: bool,
    pub deadline: Option<Instant>,
    pub executed: Vec<String>,
    pub commits: usize,
    pub rollbacks: usize,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    pub fail_restore_auto_commit: bool,
}

impl Default for ConnState {
    fn default() -> Self {
        Self {
            auto_commit: true,
            isolation: IsolationLevel::ReadCommitted,
            read_only: false,
            deadline: None,
            executed: Vec::new(),
            commits: 0,
            rollbacks: 0,
            fail_commit: false,
            fail_rollback: false,
            fail_restore_auto_commit: false,
        }
    }
}

pub type SharedConnState = Arc<Mutex<ConnState>>;

pub struct MockConnection {
    id: u64,
    state: SharedConnState,
}

impl MockConnection {
    pub fn boxed(id: u64) -> Box<dyn Connection> {
        Self::tracked(id).0
    }

    pub fn tracked(id: u64) -> (Box<dyn Connection>, SharedConnState) {
        let state = SharedConnState::default();
        let conn = MockConnection {
            id,
            state: state.clone(),
        };
        (Box::new(conn), state)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn auto_commit(&self) -> bool {
        self.state.lock().auto_commit
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        let mut state = self.state.lock();
        if auto_commit && state.fail_restore_auto_commit {
            return Err(AppError::Database("auto-commit restore failed".into()));
        }
        if auto_commit && !state.auto_commit {
            state.commits += 1;
        }
        state.auto_commit = auto_commit;
        Ok(())
    }

    async fn isolation_level(&mut self) -> Result<IsolationLevel> {
        Ok(self.state.lock().isolation)
    }

    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        self.state.lock().isolation = level;
        Ok(())
    }

    async fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        self.state.lock().read_only = read_only;
        Ok(())
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.state.lock().deadline = deadline;
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        self.state.lock().executed.push(statement.sql.clone());
        Ok(1)
    }

    async fn fetch_documents(&mut self, _statement: &Statement) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_commit {
            return Err(AppError::Database("commit failed".into()));
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_rollback {
            return Err(AppError::Database("rollback failed".into()));
        }
        state.rollbacks += 1;
        Ok(())
    }
}

/// Connection source handing out [`MockConnection`]s with ids 1, 2, ...
#[derive(Default)]
pub struct MockSource {
    next_id: AtomicU64,
    fail_acquire: AtomicBool,
    acquired: Mutex<Vec<(u64, SharedConnState)>>,
    released: Mutex<Vec<u64>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> usize {
        self.acquired.lock().len()
    }

    pub fn released(&self) -> Vec<u64> {
        self.released.lock().clone()
    }

    /// State of the n-th acquired connection (1-based, same as its id)
    pub fn state(&self, id: u64) -> SharedConnState {
        self.acquired
            .lock()
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| panic!("connection {id} was never acquired"))
    }
}

#[async_trait]
impl ConnectionSource for MockSource {
    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(AppError::Database("pool exhausted".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (conn, state) = MockConnection::tracked(id);
        self.acquired.lock().push((id, state));
        Ok(conn)
    }

    async fn release(&self, connection: Box<dyn Connection>) {
        self.released.lock().push(connection.id());
    }
}

/// Channel remembering every change set it was asked to store
pub struct MockChannel {
    failures_left: AtomicUsize,
    flushed: Mutex<Vec<ChangeSet>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::failing_times(0)
    }

    pub fn failing() -> Self {
        Self::failing_times(usize::MAX)
    }

    /// Fails the first `times` commits, then stores normally
    pub fn failing_times(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
            flushed: Mutex::new(Vec::new()),
        }
    }

    pub fn flushed(&self) -> Vec<ChangeSet> {
        self.flushed.lock().clone()
    }
}

#[async_trait]
impl DataChannel for MockChannel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn commit(&self, connection: &mut dyn Connection, changes: &ChangeSet) -> Result<()> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::Database("database is locked".into()));
        }
        connection.execute(&Statement::new("STORE")).await?;
        self.flushed.lock().push(changes.clone());
        Ok(())
    }

    async fn fetch(
        &self,
        _connection: &mut dyn Connection,
        _entity: &str,
        _id: i64,
    ) -> Result<Option<Record>> {
        Ok(None)
    }
}

/// Object runtime over a [`MockChannel`] counting created contexts
pub struct MockRuntime {
    channel: Arc<MockChannel>,
    inner: ObjectRuntime,
    created: AtomicUsize,
    fail: AtomicBool,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::with_channel(Arc::new(MockChannel::new()))
    }

    pub fn with_channel(channel: Arc<MockChannel>) -> Self {
        Self {
            inner: ObjectRuntime::new(channel.clone()),
            channel,
            created: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn mock_channel(&self) -> Arc<MockChannel> {
        self.channel.clone()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn fail_new_context(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl PersistenceRuntime for MockRuntime {
    fn channel(&self) -> Arc<dyn DataChannel> {
        self.inner.channel()
    }

    fn new_context(
        &self,
        channel: Option<Arc<dyn DataChannel>>,
    ) -> Result<Arc<dyn PersistenceContext>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Internal("runtime unavailable".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        self.inner.new_context(channel)
    }
}

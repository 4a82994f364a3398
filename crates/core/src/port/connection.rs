// Connection Source Port (pooled data source)

use crate::domain::IsolationLevel;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;

/// Parameterized statement
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, param: impl Into<Value>) -> Self {
        self.params.push(param.into());
        self
    }
}

/// A single database connection checked out of a [`ConnectionSource`]
///
/// Follows driver semantics: with auto-commit enabled every statement commits
/// on its own; with it disabled a transaction is open until `commit` or
/// `rollback`, and switching auto-commit back on commits the open transaction.
#[async_trait]
pub trait Connection: Send {
    /// Identifier for log output
    fn id(&self) -> u64;

    fn auto_commit(&self) -> bool;

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

    async fn isolation_level(&mut self) -> Result<IsolationLevel>;

    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()>;

    async fn set_read_only(&mut self, read_only: bool) -> Result<()>;

    /// Statements issued after the deadline fail with `TransactionTimedOut`
    fn set_deadline(&mut self, deadline: Option<Instant>);

    /// Execute a statement, returning the number of affected rows
    async fn execute(&mut self, statement: &Statement) -> Result<u64>;

    /// Run a query whose first column holds a JSON document per row
    async fn fetch_documents(&mut self, statement: &Statement) -> Result<Vec<Value>>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// Pooled connection source
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn Connection>>;

    /// Return a connection; any transaction still open on it is rolled back
    async fn release(&self, connection: Box<dyn Connection>);
}

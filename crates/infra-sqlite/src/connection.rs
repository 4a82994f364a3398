// SQLite Connection Pool & Connection Source

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{Row, Sqlite};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use txbridge_core::domain::IsolationLevel;
use txbridge_core::error::{AppError, Result};
use txbridge_core::port::{Connection, ConnectionSource, Statement};

/// Create SQLite connection pool with WAL mode and foreign keys enabled
///
/// sqlx opens `sqlite::memory:` as a named shared-cache database, so every
/// pooled connection sees the same data. The database lives only as long as
/// its last connection, so memory pools never close idle connections. A
/// private memory URI (`mode=memory` without `cache=shared`) gets a single
/// connection.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(map_sqlx_error)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true)
        .create_if_missing(true);

    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
    let private_memory = database_url.contains("mode=memory") && !database_url.contains("cache=shared");
    let max_connections = if private_memory {
        if max_connections > 1 {
            info!(url = database_url, "Private in-memory database, using a single pooled connection");
        }
        1
    } else {
        max_connections.max(1)
    };

    let pool_options = SqlitePoolOptions::new().max_connections(max_connections);
    let pool_options = if in_memory {
        pool_options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options
    };

    pool_options
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)
}

/// [`ConnectionSource`] over a sqlx pool
pub struct SqliteConnectionSource {
    pool: SqlitePool,
    next_id: AtomicU64,
}

impl SqliteConnectionSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionSource for SqliteConnectionSource {
    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        let conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(connection = id, "Acquired pooled connection");
        Ok(Box::new(SqliteConnection::new(id, conn)))
    }

    async fn release(&self, mut connection: Box<dyn Connection>) {
        if !connection.auto_commit() {
            if let Err(e) = connection.rollback().await {
                warn!(connection = connection.id(), error = %e, "Rollback on release failed");
            }
            if let Err(e) = connection.set_auto_commit(true).await {
                warn!(connection = connection.id(), error = %e, "Could not restore auto-commit on release");
            }
        }
        debug!(connection = connection.id(), "Returning connection to pool");
    }
}

/// Pooled SQLite connection with driver-style auto-commit
///
/// SQLite has no auto-commit switch, so with auto-commit off a `BEGIN` is
/// issued lazily before the first statement and closed by `commit` or
/// `rollback`.
pub struct SqliteConnection {
    id: u64,
    conn: PoolConnection<Sqlite>,
    auto_commit: bool,
    in_transaction: bool,
    /// A statement failed inside the open transaction, which was rolled back
    aborted: bool,
    deadline: Option<Instant>,
}

impl SqliteConnection {
    fn new(id: u64, conn: PoolConnection<Sqlite>) -> Self {
        Self {
            id,
            conn,
            auto_commit: true,
            in_transaction: false,
            aborted: false,
            deadline: None,
        }
    }

    fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now > deadline {
                    return Err(AppError::TransactionTimedOut(now - deadline));
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn raw(&mut self, sql: &str) -> Result<()> {
        sqlx::query(sql)
            .execute(&mut *self.conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Roll back the open transaction after a failure, so nothing sent so far
    /// can be committed by a later auto-commit switch
    async fn abort(&mut self, cause: AppError) -> AppError {
        if self.in_transaction {
            debug!(connection = self.id, error = %cause, "Aborting transaction");
            self.in_transaction = false;
            self.aborted = true;
            if let Err(e) = self.raw("ROLLBACK").await {
                warn!(connection = self.id, error = %e, "Rollback of aborted transaction failed");
            }
        }
        cause
    }

    async fn begin_statement(&mut self) -> Result<()> {
        if self.aborted {
            return Err(AppError::Database(
                "current transaction is aborted, roll back before issuing statements".to_string(),
            ));
        }
        if let Err(e) = self.check_deadline() {
            return Err(self.abort(e).await);
        }
        self.ensure_transaction().await
    }

    async fn ensure_transaction(&mut self) -> Result<()> {
        if !self.auto_commit && !self.in_transaction {
            debug!(connection = self.id, "BEGIN");
            self.raw("BEGIN").await?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[Value],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(v) => query.bind(v),
                None => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

#[async_trait]
impl Connection for SqliteConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        if auto_commit {
            self.aborted = false;
            if self.in_transaction {
                self.raw("COMMIT").await?;
                self.in_transaction = false;
            }
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    async fn isolation_level(&mut self) -> Result<IsolationLevel> {
        let read_uncommitted: i64 = sqlx::query_scalar("PRAGMA read_uncommitted")
            .fetch_one(&mut *self.conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(if read_uncommitted != 0 {
            IsolationLevel::ReadUncommitted
        } else {
            IsolationLevel::Serializable
        })
    }

    /// SQLite only distinguishes read-uncommitted (shared cache) from serializable
    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        let sql = match level {
            IsolationLevel::ReadUncommitted => "PRAGMA read_uncommitted = 1",
            _ => "PRAGMA read_uncommitted = 0",
        };
        self.raw(sql).await
    }

    async fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        let sql = if read_only {
            "PRAGMA query_only = ON"
        } else {
            "PRAGMA query_only = OFF"
        };
        self.raw(sql).await
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        self.begin_statement().await?;
        let result = bind_params(sqlx::query(&statement.sql), &statement.params)
            .execute(&mut *self.conn)
            .await;
        match result {
            Ok(done) => Ok(done.rows_affected()),
            Err(e) => Err(self.abort(map_sqlx_error(e)).await),
        }
    }

    async fn fetch_documents(&mut self, statement: &Statement) -> Result<Vec<Value>> {
        self.begin_statement().await?;
        let rows = match bind_params(sqlx::query(&statement.sql), &statement.params)
            .fetch_all(&mut *self.conn)
            .await
        {
            Ok(rows) => rows,
            Err(e) => return Err(self.abort(map_sqlx_error(e)).await),
        };

        rows.iter()
            .map(|row| {
                let text: String = row.try_get(0).map_err(map_sqlx_error)?;
                Ok(serde_json::from_str(&text)?)
            })
            .collect()
    }

    async fn commit(&mut self) -> Result<()> {
        if self.aborted {
            return Err(AppError::Database(
                "cannot commit, the transaction was aborted".to_string(),
            ));
        }
        if let Err(e) = self.check_deadline() {
            return Err(self.abort(e).await);
        }
        if self.in_transaction {
            debug!(connection = self.id, "COMMIT");
            if let Err(e) = self.raw("COMMIT").await {
                return Err(self.abort(e).await);
            }
            self.in_transaction = false;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.aborted = false;
        if self.in_transaction {
            debug!(connection = self.id, "ROLLBACK");
            self.in_transaction = false;
            self.raw("ROLLBACK").await?;
        }
        Ok(())
    }
}

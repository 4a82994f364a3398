//! Shared fixture: a SQLite runtime wired like the daemon wires it.
#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use txbridge_core::application::{
    ContextProvider, ContextTransactionManager, RequestLifecycle, TransactionTemplate,
};
use txbridge_core::domain::Persistent;
use txbridge_infra_sqlite::{create_pool, SqliteRuntime};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: i64,
    pub name: String,
}

impl Persistent for Artist {
    const ENTITY: &'static str = "Artist";

    fn id(&self) -> i64 {
        self.id
    }
}

pub fn artist(id: i64, name: &str) -> Artist {
    Artist {
        id,
        name: name.to_string(),
    }
}

pub struct Harness {
    _dir: TempDir,
    pub runtime: SqliteRuntime,
    pub template: TransactionTemplate,
    pub provider: ContextProvider,
    pub lifecycle: RequestLifecycle,
}

impl Harness {
    /// File database in a temporary directory
    pub async fn new() -> Self {
        Self::build(|dir| format!("sqlite://{}", dir.join("bridge.db").display()), 4).await
    }

    /// In-memory database with the daemon's default datasource settings
    pub async fn in_memory() -> Self {
        Self::build(|_| "sqlite::memory:".to_string(), 10).await
    }

    async fn build(url: impl FnOnce(&Path) -> String, max_connections: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("schema.sql");
        let mut schema = std::fs::File::create(&schema_path).unwrap();
        writeln!(schema, "CREATE TABLE IF NOT EXISTS gallery (id INTEGER PRIMARY KEY);").unwrap();

        let pool = create_pool(&url(dir.path()), max_connections).await.unwrap();
        let runtime = SqliteRuntime::builder()
            .pool(pool)
            .add_config(schema_path)
            .build()
            .await
            .unwrap();

        let manager = ContextTransactionManager::new(runtime.runtime(), runtime.source());
        Self {
            template: TransactionTemplate::new(Arc::new(manager)),
            provider: ContextProvider::new(runtime.runtime()),
            lifecycle: RequestLifecycle::new(runtime.source()),
            runtime,
            _dir: dir,
        }
    }

    /// Read an artist straight from the table, bypassing any context
    pub async fn stored(&self, id: i64) -> Option<Artist> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM entities WHERE entity = 'Artist' AND id = ?")
                .bind(id)
                .fetch_optional(self.runtime.pool())
                .await
                .unwrap();
        body.map(|b| serde_json::from_str(&b).unwrap())
    }

    pub async fn count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM entities")
            .fetch_one(self.runtime.pool())
            .await
            .unwrap()
    }
}

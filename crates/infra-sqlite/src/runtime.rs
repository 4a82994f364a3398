// Persistence Runtime Builder
//
// Assembles a SQLite-backed persistence runtime: pool, document tables,
// configuration scripts and properties contributed by customizers.

use crate::channel::DocumentChannel;
use crate::connection::SqliteConnectionSource;
use crate::migration::{apply_script, run_migrations};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use txbridge_core::application::ObjectRuntime;
use txbridge_core::error::{AppError, Result};

/// Hook for adjusting the runtime before it is built
pub trait RuntimeCustomizer: Send + Sync {
    fn customize(&self, builder: &mut SqliteRuntimeBuilder);
}

#[derive(Default)]
pub struct SqliteRuntimeBuilder {
    pool: Option<SqlitePool>,
    configs: Vec<PathBuf>,
    properties: BTreeMap<String, String>,
    channel_name: Option<String>,
}

impl SqliteRuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(mut self, pool: SqlitePool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// SQL script applied once the document tables exist
    pub fn add_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.configs.push(path.into());
        self
    }

    pub fn channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = Some(name.into());
        self
    }

    pub fn customize(mut self, customizer: &dyn RuntimeCustomizer) -> Self {
        customizer.customize(&mut self);
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub async fn build(self) -> Result<SqliteRuntime> {
        let pool = self
            .pool
            .ok_or_else(|| AppError::Config("a datasource is required".to_string()))?;

        run_migrations(&pool).await?;
        for path in &self.configs {
            info!(config = %path.display(), "Applying runtime configuration");
            let script = tokio::fs::read_to_string(path).await.map_err(|e| {
                AppError::Config(format!("cannot read configuration {}: {e}", path.display()))
            })?;
            apply_script(&pool, &script).await?;
        }

        let channel_name = self.channel_name.unwrap_or_else(|| "default".to_string());
        info!(
            channel = %channel_name,
            properties = self.properties.len(),
            "Created persistence runtime"
        );
        Ok(SqliteRuntime {
            source: Arc::new(SqliteConnectionSource::new(pool.clone())),
            runtime: Arc::new(ObjectRuntime::new(Arc::new(DocumentChannel::new(
                channel_name,
            )))),
            properties: self.properties,
            pool,
        })
    }
}

/// Built runtime: a connection source and an object runtime sharing one pool
pub struct SqliteRuntime {
    pool: SqlitePool,
    source: Arc<SqliteConnectionSource>,
    runtime: Arc<ObjectRuntime>,
    properties: BTreeMap<String, String>,
}

impl SqliteRuntime {
    pub fn builder() -> SqliteRuntimeBuilder {
        SqliteRuntimeBuilder::new()
    }

    pub fn source(&self) -> Arc<SqliteConnectionSource> {
        self.source.clone()
    }

    pub fn runtime(&self) -> Arc<ObjectRuntime> {
        self.runtime.clone()
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

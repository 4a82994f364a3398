//! Bridge configuration
//!
//! Loaded from `txbridge.toml` (or the file named by `TXBRIDGE_CONFIG_FILE`)
//! and overridden by `TXBRIDGE__*` environment variables.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use txbridge_client::ClientProperties;
use txbridge_core::application::remote::DEFAULT_SESSION_TIMEOUT;
use txbridge_core::error::{AppError, Result};

const CONFIG_FILE_ENV: &str = "TXBRIDGE_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "txbridge";
const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeProperties {
    /// Persistence runtime resource; absent means the bridge is not activated
    #[serde(default)]
    pub config: Option<String>,
    #[serde(default)]
    pub datasource: DataSourceProperties,
    #[serde(default)]
    pub rop: RopProperties,
    /// Remote endpoint this process talks to; off unless `client.url` is set
    #[serde(default)]
    pub client: ClientProperties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceProperties {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

impl Default for DataSourceProperties {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RopProperties {
    /// Remote endpoint path; the endpoint is only served when set
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub props: BTreeMap<String, String>,
    /// Idle time after which a remote session is dropped
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
}

fn default_session_timeout_secs() -> u64 {
    DEFAULT_SESSION_TIMEOUT.as_secs()
}

impl Default for RopProperties {
    fn default() -> Self {
        Self {
            endpoint: None,
            props: BTreeMap::new(),
            session_timeout_secs: default_session_timeout_secs(),
        }
    }
}

impl RopProperties {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

fn config_error(err: config::ConfigError) -> AppError {
    AppError::Config(err.to_string())
}

impl BridgeProperties {
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix("TXBRIDGE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(config_error)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(config_error)
    }

    /// The runtime resource, `None` when the bridge is switched off
    pub fn runtime_config(&self) -> Result<Option<&str>> {
        match self.config.as_deref().map(str::trim) {
            None => Ok(None),
            Some("") => Err(AppError::Config(
                "'config' is set but names no persistence runtime resource".to_string(),
            )),
            Some(resource) => Ok(Some(resource)),
        }
    }
}

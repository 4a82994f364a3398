//! `[client]` configuration group

use crate::error::{ClientError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const TIMEOUT_PROP: &str = "timeout";

/// Where and how to reach a remote persistence endpoint
///
/// `url` is the full service URL, e.g. `http://127.0.0.1:9527/cayenne-service`;
/// its path names the endpoint. The client is only created when `url` is set.
#[derive(Clone, Default, Deserialize)]
pub struct ClientProperties {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Extra settings; `timeout` is the per-request timeout in seconds
    #[serde(default)]
    pub props: BTreeMap<String, String>,
}

impl ClientProperties {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        match self.props.get(TIMEOUT_PROP) {
            None => Ok(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            Some(secs) => secs
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| ClientError::Config(format!("invalid client timeout '{secs}'"))),
        }
    }
}

impl fmt::Debug for ClientProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProperties")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("props", &self.props)
            .finish()
    }
}

// Remote Object Persistence Port

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Session handed to a remote client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub session_id: String,
    /// Set for sessions shared by name between clients
    pub name: Option<String>,
}

impl RemoteSession {
    pub fn is_shared(&self) -> bool {
        self.name.is_some()
    }
}

/// Server side of the remote-object-persistence protocol
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn establish_session(&self) -> Result<RemoteSession>;

    /// Sessions established with the same name are the same session
    async fn establish_shared_session(&self, name: &str) -> Result<RemoteSession>;

    /// Process one serialized client message, returning the serialized response
    async fn process_message(
        &self,
        session_id: &str,
        message: serde_json::Value,
    ) -> Result<serde_json::Value>;
}

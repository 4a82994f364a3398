//! RPC Request/Response Types

use serde::Deserialize;

pub const ESTABLISH_SESSION: &str = "establish-session";
pub const ESTABLISH_SHARED_SESSION: &str = "establish-shared-session";

/// Parameters of the endpoint method; `operation` absent means "process message"
#[derive(Debug, Default, Deserialize)]
pub struct RopRequest {
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<serde_json::Value>,
}

//! Wire shape of the endpoint method's parameters

use serde::Serialize;

pub const ESTABLISH_SESSION: &str = "establish-session";
pub const ESTABLISH_SHARED_SESSION: &str = "establish-shared-session";

#[derive(Debug, Default, Serialize)]
pub(crate) struct RopRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<serde_json::Value>,
}

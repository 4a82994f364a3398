//! Client Error Types

use thiserror::Error;

/// Client Result type
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client Error
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("RPC error ({code}): {message}")]
    Rpc { code: i32, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ClientError {
    /// JSON-RPC error code, when the endpoint rejected the call
    pub fn code(&self) -> Option<i32> {
        match self {
            ClientError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<jsonrpsee::core::ClientError> for ClientError {
    fn from(e: jsonrpsee::core::ClientError) -> Self {
        match e {
            jsonrpsee::core::ClientError::Call(call_err) => ClientError::Rpc {
                code: call_err.code(),
                message: call_err.message().to_string(),
            },
            jsonrpsee::core::ClientError::Transport(e) => ClientError::Transport(e.to_string()),
            jsonrpsee::core::ClientError::RestartNeeded(_) => {
                ClientError::Connection("Connection restart needed".to_string())
            }
            jsonrpsee::core::ClientError::ParseError(e) => ClientError::Serialization(e),
            _ => ClientError::Other(e.to_string()),
        }
    }
}

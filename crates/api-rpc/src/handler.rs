//! RPC Method Handler
//!
//! Dispatches endpoint calls to the remote object persistence service.

use crate::error::to_rpc_error;
use crate::types::{RopRequest, ESTABLISH_SESSION, ESTABLISH_SHARED_SESSION};
use jsonrpsee::types::ErrorObjectOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use txbridge_core::error::AppError;
use txbridge_core::port::RemoteService;

/// RPC Handler with injected service
pub struct RopHandler {
    service: Arc<dyn RemoteService>,
}

impl RopHandler {
    pub fn new(service: Arc<dyn RemoteService>) -> Self {
        Self { service }
    }

    pub async fn handle(&self, request: RopRequest) -> Result<Value, ErrorObjectOwned> {
        debug!(operation = ?request.operation, "Handling remote call");
        self.dispatch(request).await.map_err(to_rpc_error)
    }

    async fn dispatch(&self, request: RopRequest) -> txbridge_core::Result<Value> {
        match request.operation.as_deref() {
            Some(ESTABLISH_SESSION) => {
                let session = self.service.establish_session().await?;
                Ok(serde_json::to_value(session)?)
            }
            Some(ESTABLISH_SHARED_SESSION) => {
                let name = request.session_name.ok_or_else(|| {
                    AppError::Validation("session_name is required for a shared session".into())
                })?;
                let session = self.service.establish_shared_session(&name).await?;
                Ok(serde_json::to_value(session)?)
            }
            Some(other) => Err(AppError::UnsupportedOperation(other.to_string())),
            None => {
                let session_id = request
                    .session_id
                    .ok_or_else(|| AppError::Validation("session_id is required".into()))?;
                let message = request
                    .message
                    .ok_or_else(|| AppError::Validation("message is required".into()))?;
                self.service.process_message(&session_id, message).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;
    use async_trait::async_trait;
    use serde_json::json;
    use txbridge_core::port::RemoteSession;

    struct EchoService;

    #[async_trait]
    impl RemoteService for EchoService {
        async fn establish_session(&self) -> txbridge_core::Result<RemoteSession> {
            Ok(RemoteSession {
                session_id: "s-1".into(),
                name: None,
            })
        }

        async fn establish_shared_session(
            &self,
            name: &str,
        ) -> txbridge_core::Result<RemoteSession> {
            Ok(RemoteSession {
                session_id: "s-shared".into(),
                name: Some(name.to_string()),
            })
        }

        async fn process_message(
            &self,
            session_id: &str,
            message: Value,
        ) -> txbridge_core::Result<Value> {
            Ok(json!({ "session": session_id, "echo": message }))
        }
    }

    fn handler() -> RopHandler {
        RopHandler::new(Arc::new(EchoService))
    }

    #[tokio::test]
    async fn test_dispatch_by_operation() {
        let handler = handler();

        let session = handler
            .handle(RopRequest {
                operation: Some(ESTABLISH_SESSION.into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(session["session_id"], "s-1");

        let shared = handler
            .handle(RopRequest {
                operation: Some(ESTABLISH_SHARED_SESSION.into()),
                session_name: Some("board".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(shared["name"], "board");

        let reply = handler
            .handle(RopRequest {
                session_id: Some("s-1".into()),
                message: Some(json!({ "type": "fetch" })),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(reply["echo"]["type"], "fetch");
    }

    #[tokio::test]
    async fn test_unknown_operation_is_rejected() {
        let err = handler()
            .handle(RopRequest {
                operation: Some("drop-everything".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::UNSUPPORTED);
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let handler = handler();
        let err = handler
            .handle(RopRequest {
                operation: Some(ESTABLISH_SHARED_SESSION.into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::VALIDATION_ERROR);

        let err = handler
            .handle(RopRequest {
                session_id: Some("s-1".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::VALIDATION_ERROR);
    }
}

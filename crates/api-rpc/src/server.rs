//! JSON-RPC Server
//!
//! Serves the remote object persistence endpoint over HTTP on one method.

use crate::handler::RopHandler;
use crate::types::RopRequest;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::info;
use txbridge_core::port::RemoteService;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9527;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RopServerConfig {
    /// Endpoint path, e.g. `/cayenne-service`; the leading slash is dropped for the method name
    pub endpoint: String,
    pub host: String,
    pub port: u16,
}

impl RopServerConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }

    pub fn method_name(&self) -> &str {
        self.endpoint.trim_start_matches('/')
    }
}

/// RPC Server
pub struct RopServer {
    config: RopServerConfig,
    handler: Arc<RopHandler>,
}

impl RopServer {
    pub fn new(config: RopServerConfig, service: Arc<dyn RemoteService>) -> Self {
        Self {
            config,
            handler: Arc::new(RopHandler::new(service)),
        }
    }

    /// Start the JSON-RPC server, returning its handle and bound address
    pub async fn start(self) -> Result<(ServerHandle, SocketAddr), String> {
        let method = self.config.method_name();
        if method.is_empty() {
            return Err("remote endpoint name must not be empty".to_string());
        }
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server.local_addr().map_err(|e| e.to_string())?;

        let mut module = RpcModule::new(());

        let method = intern(method);
        let handler = self.handler.clone();
        module
            .register_async_method(method, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: RopRequest = params.one()?;
                    handler.handle(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!(
            method,
            address = %local_addr,
            "Remote object persistence endpoint started"
        );

        let handle = server.start(module);
        Ok((handle, local_addr))
    }
}

/// RPC method names must be `'static`; each distinct name is leaked once
fn intern(name: &str) -> &'static str {
    static NAMES: OnceLock<Mutex<HashSet<&'static str>>> = OnceLock::new();
    let mut names = NAMES
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = names.get(name) {
        return *existing;
    }
    let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
    names.insert(leaked);
    leaked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_name() {
        let config = RopServerConfig::new("/cayenne-service");
        assert_eq!(config.method_name(), "cayenne-service");
        assert_eq!(config.port, 9527);
    }

    #[test]
    fn test_method_names_interned_once() {
        let first = intern("gallery-service");
        let second = intern(&String::from("gallery-service"));
        assert!(std::ptr::eq(first, second));
        assert_ne!(intern("other-service"), first);
    }

    #[tokio::test]
    async fn test_empty_endpoint_rejected() {
        struct Never;
        #[async_trait::async_trait]
        impl RemoteService for Never {
            async fn establish_session(
                &self,
            ) -> txbridge_core::Result<txbridge_core::port::RemoteSession> {
                unreachable!()
            }
            async fn establish_shared_session(
                &self,
                _: &str,
            ) -> txbridge_core::Result<txbridge_core::port::RemoteSession> {
                unreachable!()
            }
            async fn process_message(
                &self,
                _: &str,
                _: serde_json::Value,
            ) -> txbridge_core::Result<serde_json::Value> {
                unreachable!()
            }
        }

        let server = RopServer::new(RopServerConfig::new("/"), Arc::new(Never));
        assert!(server.start().await.is_err());
    }
}

//! Conditional wiring of the persistence runtime, transaction binding,
//! remote endpoint and remote client from `BridgeProperties`.

use crate::config::BridgeProperties;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use txbridge_api_rpc::RopServerConfig;
use txbridge_client::RopClient;
use txbridge_core::application::{
    ContextRemoteService, ContextTransactionManager, RequestLifecycle, TransactionTemplate,
};
use txbridge_core::error::{AppError, Result};
use txbridge_core::port::id_provider::UuidProvider;
use txbridge_infra_sqlite::{create_pool, RuntimeCustomizer, SqliteRuntime, SqliteRuntimeBuilder};

const ROP_PREFIX: &str = "rop.";

/// Hands `rop.props` to the runtime as `rop.<key>` properties
pub struct RopPropsCustomizer {
    props: BTreeMap<String, String>,
}

impl RopPropsCustomizer {
    pub fn new(props: BTreeMap<String, String>) -> Self {
        Self { props }
    }
}

impl RuntimeCustomizer for RopPropsCustomizer {
    fn customize(&self, builder: &mut SqliteRuntimeBuilder) {
        for (key, value) in &self.props {
            builder.set_property(format!("{ROP_PREFIX}{key}"), value.clone());
        }
    }
}

/// Everything the daemon serves
pub struct Bridge {
    pub runtime: SqliteRuntime,
    /// Present when `rop.endpoint` is configured
    pub remote: Option<(Arc<ContextRemoteService>, RopServerConfig)>,
}

/// Build the bridge, or `None` when no persistence runtime is configured
pub async fn assemble(props: &BridgeProperties) -> Result<Option<Bridge>> {
    let Some(resource) = props.runtime_config()? else {
        info!("No persistence runtime configured; bridge not activated");
        return Ok(None);
    };

    info!(
        url = %props.datasource.url,
        max_connections = props.datasource.max_connections,
        "Initializing datasource"
    );
    let pool = create_pool(&props.datasource.url, props.datasource.max_connections).await?;

    let mut builder = SqliteRuntime::builder().pool(pool).add_config(resource);
    if props.rop.endpoint.is_some() {
        builder = builder.customize(&RopPropsCustomizer::new(props.rop.props.clone()));
    }
    let runtime = builder.build().await?;

    let manager = ContextTransactionManager::new(runtime.runtime(), runtime.source());
    let template = TransactionTemplate::new(Arc::new(manager));
    let lifecycle = RequestLifecycle::new(runtime.source());

    let remote = match props.rop.endpoint.as_deref() {
        Some(endpoint) => {
            let config = server_config(endpoint, &runtime)?;
            let service = ContextRemoteService::new(template, lifecycle, Arc::new(UuidProvider))
                .with_session_timeout(props.rop.session_timeout());
            info!(endpoint, "Remote object persistence endpoint enabled");
            Some((Arc::new(service), config))
        }
        None => None,
    };

    Ok(Some(Bridge { runtime, remote }))
}

/// The remote persistence client, or `None` when `client.url` is not set
pub fn connect_client(props: &BridgeProperties) -> Result<Option<RopClient>> {
    if !props.client.is_enabled() {
        return Ok(None);
    }
    info!(client = ?props.client, "Creating remote persistence client");
    RopClient::connect(&props.client)
        .map(Some)
        .map_err(|e| AppError::Config(e.to_string()))
}

fn server_config(endpoint: &str, runtime: &SqliteRuntime) -> Result<RopServerConfig> {
    let mut config = RopServerConfig::new(endpoint);
    if let Some(host) = runtime.property("rop.host") {
        config.host = host.to_string();
    }
    if let Some(port) = runtime.property("rop.port") {
        config.port = port
            .parse()
            .map_err(|_| AppError::Config(format!("invalid rop port '{port}'")))?;
    }
    Ok(config)
}

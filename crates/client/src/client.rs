//! Remote Persistence Client Implementation

use crate::config::ClientProperties;
use crate::error::{ClientError, Result};
use crate::types::{RopRequest, ESTABLISH_SESSION, ESTABLISH_SHARED_SESSION};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use txbridge_core::application::{ClientMessage, ServerResponse};
use txbridge_core::domain::{Change, Record};
use txbridge_core::port::RemoteSession;
use url::Url;

/// Client of a remote object persistence endpoint
///
/// # Example
///
/// ```no_run
/// use txbridge_client::{ClientProperties, RopClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RopClient::connect(&ClientProperties::new(
///     "http://127.0.0.1:9527/cayenne-service",
/// ))?;
/// let session = client.establish_session().await?;
/// let artist = client.fetch(&session, "Artist", 1).await?;
/// # Ok(())
/// # }
/// ```
pub struct RopClient {
    client: HttpClient,
    method: String,
}

impl RopClient {
    /// Build a client from the `[client]` configuration group
    ///
    /// No request is sent until the first call.
    pub fn connect(props: &ClientProperties) -> Result<Self> {
        let url = props
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ClientError::Config("client url must not be empty".to_string()))?;
        let (base_url, method) = split_service_url(url)?;

        let mut builder = HttpClientBuilder::default().request_timeout(props.request_timeout()?);
        if let Some(user) = props.user.as_deref() {
            builder = builder.set_headers(basic_auth(user, props.password.as_deref())?);
        }
        let client = builder
            .build(&base_url)
            .map_err(|e| ClientError::Connection(format!("Failed to create client: {}", e)))?;

        info!(url = %base_url, method = %method, "Created remote persistence client");
        Ok(Self { client, method })
    }

    /// Name of the endpoint method calls are sent to
    pub fn method(&self) -> &str {
        &self.method
    }

    pub async fn establish_session(&self) -> Result<RemoteSession> {
        self.call(RopRequest {
            operation: Some(ESTABLISH_SESSION),
            ..Default::default()
        })
        .await
    }

    /// Join the session shared under `name`, creating it on first use
    pub async fn establish_shared_session(&self, name: &str) -> Result<RemoteSession> {
        self.call(RopRequest {
            operation: Some(ESTABLISH_SHARED_SESSION),
            session_name: Some(name),
            ..Default::default()
        })
        .await
    }

    pub async fn send(
        &self,
        session: &RemoteSession,
        message: &ClientMessage,
    ) -> Result<ServerResponse> {
        debug!(session_id = %session.session_id, ?message, "Sending remote message");
        self.call(RopRequest {
            session_id: Some(&session.session_id),
            message: Some(serde_json::to_value(message)?),
            ..Default::default()
        })
        .await
    }

    pub async fn fetch(
        &self,
        session: &RemoteSession,
        entity: &str,
        id: i64,
    ) -> Result<Option<Record>> {
        let message = ClientMessage::Fetch {
            entity: entity.to_string(),
            id,
        };
        match self.send(session, &message).await? {
            ServerResponse::Record { record } => Ok(record),
            other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// Commit changes in one server-side transaction, returning how many were applied
    pub async fn commit(&self, session: &RemoteSession, changes: Vec<Change>) -> Result<usize> {
        let message = ClientMessage::Commit { changes };
        match self.send(session, &message).await? {
            ServerResponse::Committed { changes } => Ok(changes),
            other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    async fn call<T: DeserializeOwned>(&self, request: RopRequest<'_>) -> Result<T> {
        let params = rpc_params![request];
        let response: T = self.client.request(&self.method, params).await?;

        Ok(response)
    }
}

/// Split a service URL into the server address and the endpoint method name
fn split_service_url(raw: &str) -> Result<(String, String)> {
    let mut url = Url::parse(raw)
        .map_err(|e| ClientError::Config(format!("invalid client url '{raw}': {e}")))?;
    let method = url.path().trim_matches('/').to_string();
    if method.is_empty() {
        return Err(ClientError::Config(format!(
            "client url '{raw}' names no endpoint"
        )));
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok((url.to_string(), method))
}

fn basic_auth(user: &str, password: Option<&str>) -> Result<HeaderMap> {
    let credentials = BASE64.encode(format!("{}:{}", user, password.unwrap_or_default()));
    let mut value = HeaderValue::from_str(&format!("Basic {credentials}"))
        .map_err(|e| ClientError::Config(format!("invalid client credentials: {e}")))?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert("authorization", value);
    Ok(headers)
}

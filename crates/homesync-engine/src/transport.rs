//! Outbound HTTP calls against the household server.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client as HttpClient, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{ConfigError, TransportError};
use crate::gate::OfflineGate;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "GROCY-API-KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One outbound call: raw payload or a classified error.
///
/// No retries at this layer; callers own retry policy.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Bytes, TransportError>;
}

/// Settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL of the API, e.g. `https://home.example.com/api`.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Bound on every request, connect to last body byte.
    pub timeout: Duration,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `reqwest`-backed transport.
///
/// Every outcome feeds the offline gate: connectivity failures mark it
/// offline, successes mark it online.
pub struct HttpTransport {
    http_client: HttpClient,
    base_url: String,
    api_key: Option<String>,
    gate: OfflineGate,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(config: &TransportConfig, gate: OfflineGate) -> Result<Self, ConfigError> {
        let url = Url::parse(&config.base_url).map_err(|e| ConfigError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: config.base_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        let http_client = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            gate,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn gate(&self) -> &OfflineGate {
        &self.gate
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Bytes, TransportError> {
        let url = self.url(path);

        let mut request = self.http_client.request(method.into(), &url);
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!("{} {} rejected with status {}", method, url, status);
            return Err(TransportError::AuthFailure(status.as_u16()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!("{} {} failed with status {}: {}", method, url, status, text);
            return Err(TransportError::ServerError(status.as_u16()));
        }

        let payload = response.bytes().await.map_err(classify)?;
        debug!("{} {} ({} bytes)", method, url, payload.len());
        Ok(payload)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, body), level = "debug")]
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Bytes, TransportError> {
        let result = self.send(method, path, body).await;
        match &result {
            Ok(_) => self.gate.mark_online(),
            Err(e) if e.is_transient() => self.gate.mark_offline(&e.to_string()),
            Err(_) => {}
        }
        result
    }
}

/// Map a client-level failure onto the transport taxonomy.
fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::ParseError(err.to_string())
    } else {
        TransportError::NoConnection(err.to_string())
    }
}

/// GET `path` and decode the JSON response.
pub async fn get_json<T: DeserializeOwned>(
    transport: &dyn Transport,
    path: &str,
) -> Result<T, TransportError> {
    let payload = transport.call(Method::Get, path, None).await?;
    serde_json::from_slice(&payload)
        .map_err(|e| TransportError::ParseError(format!("{}: {}", path, e)))
}

/// Server build information (`system/info`).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    grocy_version: Option<ServerVersion>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerVersion {
    #[serde(rename = "Version")]
    version: String,
}

impl ServerInfo {
    pub fn version(&self) -> Option<&str> {
        self.grocy_version.as_ref().map(|v| v.version.as_str())
    }
}

pub async fn fetch_server_info(transport: &dyn Transport) -> Result<ServerInfo, TransportError> {
    get_json(transport, "system/info").await
}

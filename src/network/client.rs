//! Reqwest-backed network client

use crate::error::{Error, Result};
use crate::http::{FetchRequest, FetchResponse, Headers};
use crate::network::NetworkClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Headers that describe a single connection and are never forwarded
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Whether a header is connection-scoped
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name)
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the HTTP network client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Overall request timeout in milliseconds (None = wait indefinitely)
    pub request_timeout_ms: Option<u64>,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            request_timeout_ms: None,
            user_agent: format!("{}/{}", crate::NAME, crate::VERSION),
        }
    }
}

// =============================================================================
// HTTP Network Client
// =============================================================================

/// Network client using a pooled reqwest client
pub struct HttpNetworkClient {
    client: reqwest::Client,
    request_timeout_ms: Option<u64>,
}

impl HttpNetworkClient {
    pub fn new() -> Result<Self> {
        Self::with_config(NetworkConfig::default())
    }

    pub fn with_config(config: NetworkConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(config.user_agent);
        if let Some(ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        Ok(Self {
            client: builder.build()?,
            request_timeout_ms: config.request_timeout_ms,
        })
    }

    fn transport_error(&self, request: &FetchRequest, e: reqwest::Error) -> Error {
        match self.request_timeout_ms {
            Some(timeout_ms) if e.is_timeout() => Error::Timeout {
                url: request.url.to_string(),
                timeout_ms,
            },
            _ => Error::network(request.url.as_str(), e),
        }
    }
}

#[async_trait]
impl NetworkClient for HttpNetworkClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) && name != "host" {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.transport_error(request, e))?;

        let status = response.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(request, e))?;

        debug!(url = %request.url, status = status, bytes = body.len(), "Network fetch complete");
        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop() {
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(is_hop_by_hop("connection"));
        assert!(!is_hop_by_hop("content-type"));
    }

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert!(config.request_timeout_ms.is_none());
        assert!(config.user_agent.starts_with("offline-cache-worker/"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let client = HttpNetworkClient::with_config(NetworkConfig {
            connect_timeout_ms: 200,
            ..Default::default()
        })
        .unwrap();
        let request = FetchRequest::get("http://127.0.0.1:9/unreachable").unwrap();

        let err = client.fetch(&request).await.unwrap_err();
        assert!(err.is_offline());
    }

    #[tokio::test]
    async fn test_silent_origin_is_timeout_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = HttpNetworkClient::with_config(NetworkConfig {
            request_timeout_ms: Some(100),
            ..Default::default()
        })
        .unwrap();
        let request = FetchRequest::get(&format!("http://{}/api/cycle", addr)).unwrap();

        let err = client.fetch(&request).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { timeout_ms: 100, .. }));
        assert!(err.is_offline());
    }
}

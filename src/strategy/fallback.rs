//! Synthetic offline responses

use crate::cache::{CacheEvent, NamespaceKey, NamespaceName};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::http::{FetchResponse, RequestKey};
use crate::strategy::StrategyContext;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which offline response a route falls back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackKind {
    /// 503 JSON `{"message": ..., "offline": true}`
    OfflineJson,
    /// The pre-cached offline HTML document
    OfflinePage,
    /// 503 plain text
    OfflineAsset,
}

impl fmt::Display for FallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackKind::OfflineJson => write!(f, "offline-json"),
            FallbackKind::OfflinePage => write!(f, "offline-page"),
            FallbackKind::OfflineAsset => write!(f, "offline-asset"),
        }
    }
}

/// JSON body of the offline API response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineBody {
    pub message: String,
    pub offline: bool,
}

/// Builds the offline responses for one worker version
#[derive(Debug, Clone)]
pub struct OfflineFallbacks {
    pub(crate) static_namespace: NamespaceKey,
    offline_page: RequestKey,
    api_message: String,
    asset_message: String,
}

impl OfflineFallbacks {
    pub fn new(
        static_namespace: NamespaceKey,
        offline_page: RequestKey,
        api_message: impl Into<String>,
        asset_message: impl Into<String>,
    ) -> Self {
        Self {
            static_namespace,
            offline_page,
            api_message: api_message.into(),
            asset_message: asset_message.into(),
        }
    }

    /// 503 JSON response for API requests
    pub fn offline_json(&self) -> FetchResponse {
        let body = OfflineBody {
            message: self.api_message.clone(),
            offline: true,
        };
        let json = serde_json::to_vec(&body).unwrap_or_default();
        FetchResponse::new(503, json).with_header("content-type", "application/json")
    }

    /// 503 plain-text response for static assets
    pub fn offline_asset(&self) -> FetchResponse {
        FetchResponse::new(503, self.asset_message.clone())
            .with_header("content-type", "text/plain; charset=utf-8")
    }

    /// Response used when a strategy itself fails
    pub fn for_error(&self, kind: FallbackKind) -> FetchResponse {
        match kind {
            FallbackKind::OfflineJson => self.offline_json(),
            FallbackKind::OfflinePage | FallbackKind::OfflineAsset => self.offline_asset(),
        }
    }

    /// Fallbacks for the configured version, origin and messages
    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        let offline_page = config.resolve(&config.shell.offline_page)?;
        Ok(Self::new(
            NamespaceKey::new(config.version_tag.clone(), NamespaceName::Static),
            RequestKey::get(&offline_page),
            config.shell.offline_api_message.clone(),
            config.shell.offline_asset_message.clone(),
        ))
    }

    pub fn offline_page_key(&self) -> &RequestKey {
        &self.offline_page
    }

    /// Produce the fallback for `key`
    ///
    /// The offline page is served verbatim from the static namespace; if it
    /// was never cached there is no content to serve. Only a served fallback
    /// is counted.
    pub async fn produce(
        &self,
        kind: FallbackKind,
        ctx: &StrategyContext,
        key: &RequestKey,
    ) -> Result<FetchResponse> {
        let response = match kind {
            FallbackKind::OfflineJson => self.offline_json(),
            FallbackKind::OfflineAsset => self.offline_asset(),
            FallbackKind::OfflinePage => ctx
                .lookup(&self.static_namespace, &self.offline_page)
                .await
                .map(|entry| entry.to_response())
                .ok_or_else(|| Error::NoContent {
                    key: self.offline_page.to_string(),
                })?,
        };
        ctx.metrics.record_offline_fallback();
        ctx.emit(CacheEvent::fallback(key, kind));
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::MockNetwork;
    use crate::strategy::test_support::*;

    #[test]
    fn test_offline_json_shape() {
        let (ctx, _store) = context(MockNetwork::new());
        let response = ctx.fallbacks.offline_json();
        assert_eq!(response.status, 503);
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(
            response.text(),
            r#"{"message":"You are offline. Please reconnect to see live data.","offline":true}"#
        );
    }

    #[test]
    fn test_offline_asset_shape() {
        let (ctx, _store) = context(MockNetwork::new());
        let response = ctx.fallbacks.offline_asset();
        assert_eq!(response.status, 503);
        assert_eq!(response.text(), "Asset unavailable offline.");
    }

    #[test]
    fn test_from_config_resolves_offline_page() {
        let config = WorkerConfig {
            version_tag: "hercare-v3".into(),
            origin: "https://hercare.example".into(),
            ..Default::default()
        };
        let fallbacks = OfflineFallbacks::from_config(&config).unwrap();
        assert_eq!(
            fallbacks.offline_page_key().as_str(),
            "GET https://hercare.example/offline.html"
        );
        assert_eq!(fallbacks.static_namespace.composite(), "hercare-v3-static");
    }

    #[tokio::test]
    async fn test_offline_page_served_verbatim() {
        let (ctx, store) = context(MockNetwork::new());
        seed(&store, NamespaceName::Static, "https://app.test/offline.html", "<h1>offline</h1>").await;

        let response = ctx
            .fallbacks
            .produce(FallbackKind::OfflinePage, &ctx, &key("https://app.test/dashboard"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "<h1>offline</h1>");
        assert_eq!(ctx.metrics.snapshot().offline_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_missing_offline_page_is_no_content() {
        let (ctx, _store) = context(MockNetwork::new());
        let err = ctx
            .fallbacks
            .produce(FallbackKind::OfflinePage, &ctx, &key("https://app.test/dashboard"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoContent { .. }));
        assert_eq!(ctx.metrics.snapshot().offline_fallbacks, 0);
    }
}

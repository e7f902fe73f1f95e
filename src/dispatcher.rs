//! Strategy Dispatcher
//!
//! Classifies every outbound request and serves it through one strategy.
//!
//! # Route priority
//!
//! ```text
//!   GET? ──no──► Passthrough
//!    │
//!    ├─ path starts with /api/        ► NetworkFirstWithTimeout  (api, 5s, JSON fallback)
//!    ├─ host is an image provider     ► StaleWhileRevalidate     (images)
//!    ├─ navigation                    ► NetworkFirstWithTimeout  (no cache, offline page)
//!    ├─ static extension / font host  ► CacheFirst               (static)
//!    └─ anything else                 ► Passthrough (NetworkOnly)
//! ```
//!
//! First match wins. A failing strategy never fails the pipeline: its error
//! becomes a 503 offline response. Pass-through requests go to the network
//! untouched and their errors are returned unchanged.

use crate::cache::{CacheEvent, CacheStatsSnapshot, NamespaceName};
use crate::config::RouteConfig;
use crate::error::{Error, Result};
use crate::http::{FetchRequest, FetchResponse};
use crate::strategy::{
    cache_first, network_first, network_only, stale_while_revalidate, FallbackKind, StrategyContext,
    StrategyKind,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

// =============================================================================
// Route Matching
// =============================================================================

/// Custom predicate over a request
pub type MatchFn = Arc<dyn Fn(&FetchRequest) -> bool + Send + Sync>;

/// Predicate deciding whether a route applies to a request
#[derive(Clone)]
pub enum RouteMatcher {
    /// URL path starts with the prefix
    PathPrefix(String),
    /// Host contains any of the substrings
    HostContains(Vec<String>),
    /// Request is a top-level navigation
    Navigation,
    /// Path ends in one of the extensions, or host contains one of the hosts
    StaticAsset {
        extensions: Vec<String>,
        hosts: Vec<String>,
    },
    Custom(MatchFn),
}

impl RouteMatcher {
    pub fn matches(&self, request: &FetchRequest) -> bool {
        match self {
            RouteMatcher::PathPrefix(prefix) => request.path().starts_with(prefix.as_str()),
            RouteMatcher::HostContains(hosts) => host_contains(request.host(), hosts),
            RouteMatcher::Navigation => request.is_navigation(),
            RouteMatcher::StaticAsset { extensions, hosts } => {
                path_extension(request.path())
                    .map(|ext| extensions.iter().any(|e| e == ext))
                    .unwrap_or(false)
                    || host_contains(request.host(), hosts)
            }
            RouteMatcher::Custom(f) => f(request),
        }
    }
}

impl fmt::Debug for RouteMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMatcher::PathPrefix(p) => f.debug_tuple("PathPrefix").field(p).finish(),
            RouteMatcher::HostContains(h) => f.debug_tuple("HostContains").field(h).finish(),
            RouteMatcher::Navigation => write!(f, "Navigation"),
            RouteMatcher::StaticAsset { extensions, hosts } => f
                .debug_struct("StaticAsset")
                .field("extensions", extensions)
                .field("hosts", hosts)
                .finish(),
            RouteMatcher::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

fn host_contains(host: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| host.contains(n.as_str()))
}

/// Extension of the last path segment, if it has one
fn path_extension(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next()?;
    segment.rsplit_once('.').map(|(_, ext)| ext)
}

// =============================================================================
// Strategy Route
// =============================================================================

/// One entry of the routing table
#[derive(Debug, Clone)]
pub struct StrategyRoute {
    pub name: String,
    pub matcher: RouteMatcher,
    pub kind: StrategyKind,
    /// Namespace read from and written to (None = no cache involvement)
    pub namespace: Option<NamespaceName>,
    /// Network timeout (only used by NetworkFirstWithTimeout)
    pub timeout: Option<Duration>,
    pub fallback: FallbackKind,
}

impl StrategyRoute {
    pub fn new(name: impl Into<String>, matcher: RouteMatcher, kind: StrategyKind) -> Self {
        Self {
            name: name.into(),
            matcher,
            kind,
            namespace: None,
            timeout: None,
            fallback: FallbackKind::OfflineAsset,
        }
    }

    pub fn with_namespace(mut self, namespace: NamespaceName) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackKind) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Routing table in priority order
pub fn default_routes(config: &RouteConfig) -> Vec<StrategyRoute> {
    vec![
        StrategyRoute::new(
            "api",
            RouteMatcher::PathPrefix(config.api_prefix.clone()),
            StrategyKind::NetworkFirstWithTimeout,
        )
        .with_namespace(NamespaceName::Api)
        .with_timeout(Duration::from_millis(config.api_timeout_ms))
        .with_fallback(FallbackKind::OfflineJson),
        StrategyRoute::new(
            "images",
            RouteMatcher::HostContains(config.image_hosts.clone()),
            StrategyKind::StaleWhileRevalidate,
        )
        .with_namespace(NamespaceName::Images),
        StrategyRoute::new(
            "navigation",
            RouteMatcher::Navigation,
            StrategyKind::NetworkFirstWithTimeout,
        )
        .with_fallback(FallbackKind::OfflinePage),
        StrategyRoute::new(
            "static",
            RouteMatcher::StaticAsset {
                extensions: config.static_extensions.clone(),
                hosts: config.font_hosts.clone(),
            },
            StrategyKind::CacheFirst,
        )
        .with_namespace(NamespaceName::Static),
    ]
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Result of intercepting a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// The dispatcher produced the response
    Respond(FetchResponse),
    /// Not intercepted; the caller sends the request to the network itself
    Passthrough,
}

/// Routes requests to strategies
pub struct Dispatcher {
    ctx: StrategyContext,
    routes: Vec<StrategyRoute>,
}

impl Dispatcher {
    pub fn new(ctx: StrategyContext, routes: Vec<StrategyRoute>) -> Self {
        Self { ctx, routes }
    }

    pub fn routes(&self) -> &[StrategyRoute] {
        &self.routes
    }

    pub fn context(&self) -> &StrategyContext {
        &self.ctx
    }

    /// Subscribe to cache events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.ctx.events.subscribe()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// First route matching a GET request; None means pass-through
    pub fn route(&self, request: &FetchRequest) -> Option<&StrategyRoute> {
        if !request.is_get() {
            return None;
        }
        self.routes.iter().find(|r| r.matcher.matches(request))
    }

    /// Strategy a request will be served with
    pub fn classify(&self, request: &FetchRequest) -> StrategyKind {
        self.route(request)
            .map(|r| r.kind)
            .unwrap_or(StrategyKind::NetworkOnly)
    }

    /// Intercept a request
    pub async fn handle(&self, request: &FetchRequest) -> Interception {
        let Some(route) = self.route(request) else {
            return Interception::Passthrough;
        };
        if route.kind == StrategyKind::NetworkOnly {
            return Interception::Passthrough;
        }

        debug!(url = %request.url, route = %route.name, strategy = %route.kind, "Intercepted request");
        match self.run(route, request).await {
            Ok(response) => Interception::Respond(response),
            Err(e) => {
                warn!(url = %request.url, route = %route.name, error = %e, "Strategy failed, serving offline response");
                self.ctx.metrics.record_offline_fallback();
                Interception::Respond(self.ctx.fallbacks.for_error(route.fallback))
            }
        }
    }

    /// Serve a request end to end, forwarding pass-through requests
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        match self.handle(request).await {
            Interception::Respond(response) => Ok(response),
            Interception::Passthrough => network_only(&self.ctx, request).await,
        }
    }

    async fn run(&self, route: &StrategyRoute, request: &FetchRequest) -> Result<FetchResponse> {
        let namespace = route.namespace.map(|n| self.ctx.namespace(n));
        match route.kind {
            StrategyKind::CacheFirst => {
                let namespace = namespace.ok_or_else(|| missing_namespace(route))?;
                cache_first(&self.ctx, &namespace, request).await
            }
            StrategyKind::NetworkFirstWithTimeout => {
                network_first(
                    &self.ctx,
                    namespace.as_ref(),
                    request,
                    route.timeout,
                    route.fallback,
                )
                .await
            }
            StrategyKind::StaleWhileRevalidate => {
                let namespace = namespace.ok_or_else(|| missing_namespace(route))?;
                stale_while_revalidate(&self.ctx, &namespace, request).await
            }
            StrategyKind::NetworkOnly => network_only(&self.ctx, request).await,
        }
    }
}

fn missing_namespace(route: &StrategyRoute) -> Error {
    Error::Configuration(format!(
        "route {} uses {} but has no namespace",
        route.name, route.kind
    ))
}

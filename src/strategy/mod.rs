//! Caching Strategies
//!
//! Each strategy serves one cacheable request:
//!
//! | Strategy | Cache hit | Cache miss | Network failure |
//! |----------|-----------|------------|-----------------|
//! | CacheFirst | return, no network | fetch + write-through | 503 asset fallback |
//! | NetworkFirstWithTimeout | used only on failure/timeout | fetch + write-through | cached entry, else fallback |
//! | StaleWhileRevalidate | return, refresh in background | wait for fetch | no content |
//! | NetworkOnly | never read | never written | error returned unchanged |
//!
//! Shared plumbing lives in [`StrategyContext`]: cache read failures are
//! treated as misses and write-through failures are swallowed, so neither
//! ever fails the request that triggered them.

pub mod cache_first;
pub mod fallback;
pub mod network_first;
pub mod network_only;
pub mod stale_while_revalidate;

pub use cache_first::cache_first;
pub use fallback::{FallbackKind, OfflineFallbacks};
pub use network_first::network_first;
pub use network_only::network_only;
pub use stale_while_revalidate::stale_while_revalidate;

use crate::cache::{CacheEntry, CacheEvent, CacheMetrics, CacheStoreRef, NamespaceKey, NamespaceName};
use crate::http::{FetchResponse, RequestKey};
use crate::network::NetworkClientRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

// =============================================================================
// Strategy Kind
// =============================================================================

/// The four ways a request can be served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    CacheFirst,
    NetworkFirstWithTimeout,
    StaleWhileRevalidate,
    NetworkOnly,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::CacheFirst => write!(f, "cache-first"),
            StrategyKind::NetworkFirstWithTimeout => write!(f, "network-first"),
            StrategyKind::StaleWhileRevalidate => write!(f, "stale-while-revalidate"),
            StrategyKind::NetworkOnly => write!(f, "network-only"),
        }
    }
}

// =============================================================================
// Strategy Context
// =============================================================================

/// Everything a strategy needs; cheap to clone into detached tasks
#[derive(Clone)]
pub struct StrategyContext {
    pub store: CacheStoreRef,
    pub network: NetworkClientRef,
    pub metrics: Arc<CacheMetrics>,
    pub events: broadcast::Sender<CacheEvent>,
    pub fallbacks: Arc<OfflineFallbacks>,
}

impl StrategyContext {
    pub fn new(
        store: CacheStoreRef,
        network: NetworkClientRef,
        fallbacks: OfflineFallbacks,
        events: broadcast::Sender<CacheEvent>,
    ) -> Self {
        Self {
            store,
            network,
            metrics: Arc::new(CacheMetrics::new()),
            events,
            fallbacks: Arc::new(fallbacks),
        }
    }

    pub(crate) fn emit(&self, event: CacheEvent) {
        let _ = self.events.send(event);
    }

    /// Look up an entry; a failed read counts as a miss
    pub async fn lookup(&self, namespace: &NamespaceKey, key: &RequestKey) -> Option<CacheEntry> {
        let metrics = self.metrics.namespace(namespace.name);
        match self.store.get(namespace, key).await {
            Ok(Some(entry)) => {
                metrics.record_hit();
                self.emit(CacheEvent::hit(namespace, key));
                Some(entry)
            }
            Ok(None) => {
                metrics.record_miss();
                self.emit(CacheEvent::miss(namespace, key));
                None
            }
            Err(e) => {
                warn!(namespace = %namespace, key = %key, error = %e, "Cache read failed, treating as miss");
                metrics.record_miss();
                self.emit(CacheEvent::miss(namespace, key));
                None
            }
        }
    }

    /// Write a live response into a namespace if it is 2xx
    ///
    /// Returns true if the entry was stored. Failures are logged and
    /// swallowed.
    pub async fn write_through(
        &self,
        namespace: &NamespaceKey,
        key: &RequestKey,
        response: &FetchResponse,
    ) -> bool {
        let metrics = self.metrics.namespace(namespace.name);
        let Some(entry) = CacheEntry::from_response(key.clone(), response) else {
            debug!(namespace = %namespace, key = %key, status = response.status, "Not caching non-2xx response");
            metrics.record_skipped_write();
            self.emit(CacheEvent::write_skipped(namespace, key, response.status));
            return false;
        };

        let size = entry.size_bytes();
        match self.store.put(namespace, entry).await {
            Ok(()) => {
                metrics.record_write();
                self.emit(CacheEvent::put(namespace, key, size));
                debug!(namespace = %namespace, key = %key, size = size, "Wrote response through to cache");
                true
            }
            Err(e) => {
                warn!(namespace = %namespace, key = %key, error = %e, "Cache write failed");
                metrics.record_write_failure();
                self.emit(CacheEvent::write_failed(namespace, key, &e));
                false
            }
        }
    }

    /// Key of the static namespace the offline page lives in
    pub fn static_namespace(&self) -> &NamespaceKey {
        &self.fallbacks.static_namespace
    }

    /// Version-tagged key for a namespace name
    pub fn namespace(&self, name: NamespaceName) -> NamespaceKey {
        NamespaceKey::new(self.fallbacks.static_namespace.version_tag.clone(), name)
    }
}

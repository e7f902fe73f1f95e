//! Cache Metrics
//!
//! Cache-line aligned per-namespace counters for concurrent access from
//! request tasks.

use crate::cache::entry::NamespaceName;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache line size for alignment (64 bytes on most modern CPUs)
pub const CACHE_LINE_SIZE: usize = 64;

// =============================================================================
// Per-Namespace Metrics (Cache-Line Aligned)
// =============================================================================

/// Metrics for a single namespace, aligned to prevent false sharing
#[repr(C, align(64))]
#[derive(Debug)]
pub struct NamespaceMetrics {
    /// Lookups that found an entry
    pub hits: AtomicU64,
    /// Lookups that found nothing (including read failures)
    pub misses: AtomicU64,
    /// Successful write-throughs
    pub writes: AtomicU64,
    /// Responses not written because they were not 2xx
    pub skipped_writes: AtomicU64,
    /// Write-throughs that failed and were swallowed
    pub write_failures: AtomicU64,
    /// Requests served from a cached entry after a network failure or timeout
    pub stale_served: AtomicU64,
    /// Last update timestamp (Unix millis)
    pub last_update_ms: AtomicU64,
    _padding: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<NamespaceMetrics>() <= CACHE_LINE_SIZE);

impl Default for NamespaceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceMetrics {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            skipped_writes: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            stale_served: AtomicU64::new(0),
            last_update_ms: AtomicU64::new(0),
            _padding: [0; 8],
        }
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_skipped_write(&self) {
        self.skipped_writes.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_stale_served(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    fn touch(&self) {
        self.last_update_ms
            .store(Utc::now().timestamp_millis() as u64, Ordering::Release);
    }

    pub fn snapshot(&self) -> NamespaceMetricsSnapshot {
        NamespaceMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            skipped_writes: self.skipped_writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of namespace metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub skipped_writes: u64,
    pub write_failures: u64,
    pub stale_served: u64,
}

impl NamespaceMetricsSnapshot {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// =============================================================================
// Cache Metrics
// =============================================================================

/// Metrics for every namespace plus request-level counters
#[derive(Debug, Default)]
pub struct CacheMetrics {
    static_ns: NamespaceMetrics,
    api_ns: NamespaceMetrics,
    images_ns: NamespaceMetrics,
    /// Synthetic offline responses produced
    pub offline_fallbacks: AtomicU64,
    /// Requests passed straight to the network
    pub passthrough: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(&self, name: NamespaceName) -> &NamespaceMetrics {
        match name {
            NamespaceName::Static => &self.static_ns,
            NamespaceName::Api => &self.api_ns,
            NamespaceName::Images => &self.images_ns,
        }
    }

    #[inline]
    pub fn record_offline_fallback(&self) {
        self.offline_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_passthrough(&self) {
        self.passthrough.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            static_ns: self.static_ns.snapshot(),
            api_ns: self.api_ns.snapshot(),
            images_ns: self.images_ns.snapshot(),
            offline_fallbacks: self.offline_fallbacks.load(Ordering::Relaxed),
            passthrough: self.passthrough.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of all cache metrics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStatsSnapshot {
    pub static_ns: NamespaceMetricsSnapshot,
    pub api_ns: NamespaceMetricsSnapshot,
    pub images_ns: NamespaceMetricsSnapshot,
    pub offline_fallbacks: u64,
    pub passthrough: u64,
}

impl CacheStatsSnapshot {
    pub fn namespace(&self, name: NamespaceName) -> &NamespaceMetricsSnapshot {
        match name {
            NamespaceName::Static => &self.static_ns,
            NamespaceName::Api => &self.api_ns,
            NamespaceName::Images => &self.images_ns,
        }
    }

    /// Hit ratio across all namespaces
    pub fn hit_ratio(&self) -> f64 {
        let hits: u64 = NamespaceName::ALL.iter().map(|n| self.namespace(*n).hits).sum();
        let misses: u64 = NamespaceName::ALL.iter().map(|n| self.namespace(*n).misses).sum();
        if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_metrics_alignment() {
        assert_eq!(std::mem::align_of::<NamespaceMetrics>(), CACHE_LINE_SIZE);
    }

    #[test]
    fn test_record_and_snapshot() {
        let metrics = CacheMetrics::new();
        metrics.namespace(NamespaceName::Static).record_hit();
        metrics.namespace(NamespaceName::Static).record_hit();
        metrics.namespace(NamespaceName::Static).record_miss();
        metrics.namespace(NamespaceName::Api).record_skipped_write();
        metrics.record_offline_fallback();

        let snap = metrics.snapshot();
        assert_eq!(snap.static_ns.hits, 2);
        assert_eq!(snap.static_ns.misses, 1);
        assert_eq!(snap.api_ns.skipped_writes, 1);
        assert_eq!(snap.offline_fallbacks, 1);
        assert!((snap.static_ns.hit_ratio() - 2.0 / 3.0).abs() < 1e-9);
        assert!((snap.hit_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_hit_ratio() {
        assert_eq!(CacheStatsSnapshot::default().hit_ratio(), 0.0);
    }
}

//! Versioned Namespace Cache
//!
//! A namespaced key→response store with generational collection:
//! - **static**: app shell and static assets (cache-first)
//! - **api**: API responses (network-first with timeout)
//! - **images**: external images (stale-while-revalidate)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Namespace Lifecycle Controller                       │
//! │          install: open {version}-static, write shell resources           │
//! │          activate: delete every namespace not tagged {version}-          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────────┐   │
//! │  │ {version}-static │  │  {version}-api   │  │  {version}-images    │   │
//! │  └──────────────────┘  └──────────────────┘  └──────────────────────┘   │
//! │                                │                                         │
//! │                   ┌────────────┴────────────┐                            │
//! │                   │   CacheStore (trait)    │                            │
//! │                   │  Memory | Disk backends │                            │
//! │                   └─────────────────────────┘                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use offline_cache_worker::cache::{MemoryCacheStore, NamespaceController, NamespaceName};
//!
//! let store = Arc::new(MemoryCacheStore::new());
//! let (events, _) = tokio::sync::broadcast::channel(64);
//! let controller = NamespaceController::new(store, "hercare-v2", events);
//!
//! controller.install(shell_entries).await?;
//! let report = controller.activate().await?;
//! println!("collected {:?}", report.deleted);
//! ```

pub mod entry;
pub mod events;
pub mod metrics;
pub mod namespace;
pub mod storage;

// Re-export main types
pub use entry::{CacheEntry, NamespaceKey, NamespaceName};
pub use events::CacheEvent;
pub use metrics::{CacheMetrics, CacheStatsSnapshot, NamespaceMetrics, NamespaceMetricsSnapshot};
pub use namespace::{ActivationReport, NamespaceController};
pub use storage::{CacheStore, CacheStoreRef, DiskCacheStore, DiskStoreConfig, MemoryCacheStore};

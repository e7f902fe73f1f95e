//! Offline Cache Worker
//!
//! An offline request-interception cache manager. Every outbound request
//! enters a dispatcher that classifies it and serves it through one of four
//! caching strategies over a namespaced, version-tagged cache store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              Offline Worker                                  │
//! │        install (pre-cache shell) ─► activate (collect old versions)          │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐   ┌──────────────────────────────────────────────────┐  │
//! │  │  Event Router   │──►│               Strategy Dispatcher                │  │
//! │  │ fetch/sync/push │   │  api ► NetworkFirst   images ► StaleWhileReval.  │  │
//! │  └────────┬────────┘   │  nav ► NetworkFirst   static ► CacheFirst        │  │
//! │           │            └────────────┬─────────────────────┬───────────────┘  │
//! │  ┌────────┴────────┐                │                     │                  │
//! │  │ Background Sync │     ┌──────────┴──────────┐  ┌───────┴────────┐         │
//! │  │ Push / Notify   │     │ Versioned Namespaces│  │ Network Client │         │
//! │  └─────────────────┘     │  {tag}-static/api/  │  │   (reqwest)    │         │
//! │                          │      images         │  └────────────────┘         │
//! │                          └──────────┬──────────┘                             │
//! │                           ┌─────────┴─────────┐                              │
//! │                           │ Memory │   Disk   │                              │
//! │                           └───────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: Namespaced cache store, lifecycle controller, events and metrics
//! - [`strategy`]: The four caching strategies and offline fallbacks
//! - [`dispatcher`]: Request classification and routing
//! - [`network`]: Outbound fetch port and reqwest client
//! - [`background`]: Background sync queue and push notifications
//! - [`worker`]: Worker lifecycle and event routing
//! - [`server`]: HTTP caching proxy
//! - [`config`]: Worker configuration
//! - [`error`]: Error types and handling

pub mod background;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod network;
pub mod server;
pub mod strategy;
pub mod worker;

// Re-export commonly used types
pub use background::{
    ClickOutcome, LoggingNotificationSurface, Notification, NotificationSurface,
    NotificationSurfaceRef, PendingSyncTask, PushHandler, SyncQueue, SyncReport, SyncTag,
};

pub use cache::{
    ActivationReport, CacheEntry, CacheEvent, CacheMetrics, CacheStatsSnapshot, CacheStore,
    CacheStoreRef, DiskCacheStore, DiskStoreConfig, MemoryCacheStore, NamespaceController,
    NamespaceKey, NamespaceName,
};

pub use config::{StorageBackend, WorkerConfig};

pub use dispatcher::{Dispatcher, Interception, RouteMatcher, StrategyRoute};

pub use error::{Error, Result};

pub use http::{FetchRequest, FetchResponse, Method, RequestKey, RequestMode};

pub use network::{HttpNetworkClient, NetworkClient, NetworkClientRef, NetworkConfig};

pub use server::{ProxyServer, ProxyServerConfig};

pub use strategy::{FallbackKind, OfflineFallbacks, StrategyContext, StrategyKind};

pub use worker::{
    EventHandler, EventOutcome, EventRouter, OfflineWorker, WorkerEvent, WorkerMessage, WorkerState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

//! Cache Storage Backends
//!
//! Namespaced key→response stores behind a single trait.

mod disk;
mod memory;

pub use disk::{DiskCacheStore, DiskStoreConfig};
pub use memory::MemoryCacheStore;

use crate::cache::entry::{CacheEntry, NamespaceKey};
use crate::error::Result;
use crate::http::RequestKey;
use async_trait::async_trait;
use std::sync::Arc;

// =============================================================================
// CacheStore Trait
// =============================================================================

/// A persistent set of independent key→response tables
///
/// Implementations must tolerate concurrent reads and writes to different
/// keys; concurrent writes to the same key race and the last one wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the namespace if it does not exist yet
    async fn open(&self, namespace: &NamespaceKey) -> Result<()>;

    /// Look up an entry
    async fn get(&self, namespace: &NamespaceKey, key: &RequestKey) -> Result<Option<CacheEntry>>;

    /// Store an entry, creating the namespace lazily
    async fn put(&self, namespace: &NamespaceKey, entry: CacheEntry) -> Result<()>;

    /// Delete a single entry
    ///
    /// Returns true if the entry existed.
    async fn delete(&self, namespace: &NamespaceKey, key: &RequestKey) -> Result<bool>;

    /// List the composite keys of every existing namespace
    ///
    /// Includes namespaces written by other deploy versions, whose keys may
    /// not parse as a [`NamespaceKey`].
    async fn namespaces(&self) -> Result<Vec<String>>;

    /// Delete a namespace and all of its entries
    ///
    /// Returns true if the namespace existed.
    async fn delete_namespace(&self, composite: &str) -> Result<bool>;

    /// Number of entries in a namespace
    async fn entry_count(&self, namespace: &NamespaceKey) -> Result<u64>;

    /// Check if the store is available
    async fn health_check(&self) -> Result<bool>;
}

/// Type alias for a shared cache store
pub type CacheStoreRef = Arc<dyn CacheStore>;

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::http::FetchResponse;
    use reqwest::Url;

    /// Build a cached entry for a GET of `url`
    pub fn entry(url: &str, body: &'static str) -> CacheEntry {
        let key = RequestKey::get(&Url::parse(url).unwrap());
        CacheEntry::from_response(key, &FetchResponse::ok(body)).unwrap()
    }
}

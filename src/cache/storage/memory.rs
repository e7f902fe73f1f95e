//! In-Memory Cache Store
//!
//! Concurrent namespaced store using DashMap for both the namespace table
//! and each namespace's entries.

use crate::cache::entry::{CacheEntry, NamespaceKey};
use crate::cache::storage::CacheStore;
use crate::error::Result;
use crate::http::RequestKey;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Entries of a single namespace
#[derive(Default)]
struct NamespaceTable {
    entries: DashMap<RequestKey, CacheEntry>,
    size_bytes: AtomicU64,
}

impl NamespaceTable {
    fn insert(&self, entry: CacheEntry) {
        let new_size = entry.size_bytes();
        match self.entries.insert(entry.request_key.clone(), entry) {
            Some(old) => {
                let old_size = old.size_bytes();
                if new_size > old_size {
                    self.size_bytes.fetch_add(new_size - old_size, Ordering::Relaxed);
                } else {
                    self.size_bytes.fetch_sub(old_size - new_size, Ordering::Relaxed);
                }
            }
            None => {
                self.size_bytes.fetch_add(new_size, Ordering::Relaxed);
            }
        }
    }

    fn remove(&self, key: &RequestKey) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                self.size_bytes.fetch_sub(entry.size_bytes(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }
}

/// In-memory cache store
///
/// Namespaces are reference counted so a reader holding a table keeps it
/// alive while the namespace is deleted from the index.
#[derive(Default)]
pub struct MemoryCacheStore {
    namespaces: DashMap<String, Arc<NamespaceTable>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, namespace: &NamespaceKey) -> Option<Arc<NamespaceTable>> {
        self.namespaces
            .get(&namespace.composite())
            .map(|t| Arc::clone(t.value()))
    }

    fn table_or_create(&self, namespace: &NamespaceKey) -> Arc<NamespaceTable> {
        Arc::clone(
            self.namespaces
                .entry(namespace.composite())
                .or_default()
                .value(),
        )
    }

    /// Total bytes held by a namespace
    pub fn size_bytes(&self, namespace: &NamespaceKey) -> u64 {
        self.table(namespace)
            .map(|t| t.size_bytes.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, namespace: &NamespaceKey) -> Result<()> {
        self.table_or_create(namespace);
        Ok(())
    }

    async fn get(&self, namespace: &NamespaceKey, key: &RequestKey) -> Result<Option<CacheEntry>> {
        Ok(self
            .table(namespace)
            .and_then(|t| t.entries.get(key).map(|e| e.value().clone())))
    }

    async fn put(&self, namespace: &NamespaceKey, entry: CacheEntry) -> Result<()> {
        self.table_or_create(namespace).insert(entry);
        Ok(())
    }

    async fn delete(&self, namespace: &NamespaceKey, key: &RequestKey) -> Result<bool> {
        Ok(self.table(namespace).map(|t| t.remove(key)).unwrap_or(false))
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.namespaces.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_namespace(&self, composite: &str) -> Result<bool> {
        Ok(self.namespaces.remove(composite).is_some())
    }

    async fn entry_count(&self, namespace: &NamespaceKey) -> Result<u64> {
        Ok(self
            .table(namespace)
            .map(|t| t.entries.len() as u64)
            .unwrap_or(0))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::NamespaceName;
    use crate::cache::storage::test_support::entry;

    fn ns(version: &str, name: NamespaceName) -> NamespaceKey {
        NamespaceKey::new(version, name)
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let store = MemoryCacheStore::new();
        let static_ns = ns("v1", NamespaceName::Static);
        let e = entry("https://app.test/app.js", "console.log(1)");

        store.put(&static_ns, e.clone()).await.unwrap();
        assert_eq!(store.entry_count(&static_ns).await.unwrap(), 1);
        assert_eq!(store.size_bytes(&static_ns), 14);

        let got = store.get(&static_ns, &e.request_key).await.unwrap().unwrap();
        assert_eq!(got.body, e.body);

        assert!(store.delete(&static_ns, &e.request_key).await.unwrap());
        assert!(!store.delete(&static_ns, &e.request_key).await.unwrap());
        assert!(store.get(&static_ns, &e.request_key).await.unwrap().is_none());
        assert_eq!(store.size_bytes(&static_ns), 0);
    }

    #[tokio::test]
    async fn test_namespaces_are_independent() {
        let store = MemoryCacheStore::new();
        let e = entry("https://app.test/api/cycle", "{}");

        store.put(&ns("v1", NamespaceName::Api), e.clone()).await.unwrap();

        assert!(store
            .get(&ns("v1", NamespaceName::Static), &e.request_key)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get(&ns("v2", NamespaceName::Api), &e.request_key)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_lazy_creation_and_listing() {
        let store = MemoryCacheStore::new();
        assert!(store.namespaces().await.unwrap().is_empty());

        store.open(&ns("v1", NamespaceName::Static)).await.unwrap();
        store
            .put(&ns("v1", NamespaceName::Images), entry("https://images.unsplash.com/a.jpg", "jpg"))
            .await
            .unwrap();

        assert_eq!(
            store.namespaces().await.unwrap(),
            vec!["v1-images".to_string(), "v1-static".to_string()]
        );
    }

    #[tokio::test]
    async fn test_replacement_is_last_write_wins() {
        let store = MemoryCacheStore::new();
        let api = ns("v1", NamespaceName::Api);

        store.put(&api, entry("https://app.test/api/cycle", "old body")).await.unwrap();
        store.put(&api, entry("https://app.test/api/cycle", "new")).await.unwrap();

        let key = entry("https://app.test/api/cycle", "").request_key;
        let got = store.get(&api, &key).await.unwrap().unwrap();
        assert_eq!(got.body.as_ref(), b"new");
        assert_eq!(store.entry_count(&api).await.unwrap(), 1);
        assert_eq!(store.size_bytes(&api), 3);
    }

    #[tokio::test]
    async fn test_delete_namespace() {
        let store = MemoryCacheStore::new();
        let old = ns("v1", NamespaceName::Static);
        store.put(&old, entry("https://app.test/", "<html>")).await.unwrap();

        assert!(store.delete_namespace("v1-static").await.unwrap());
        assert!(!store.delete_namespace("v1-static").await.unwrap());
        assert_eq!(store.entry_count(&old).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let store = Arc::new(MemoryCacheStore::new());
        let api = ns("v1", NamespaceName::Api);

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            let api = api.clone();
            handles.push(tokio::spawn(async move {
                let url = format!("https://app.test/api/item/{}", i);
                let key = RequestKey::get(&reqwest::Url::parse(&url).unwrap());
                let response = crate::http::FetchResponse::ok(format!("item {}", i));
                let e = CacheEntry::from_response(key, &response).unwrap();
                store.put(&api, e).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.entry_count(&api).await.unwrap(), 32);
    }
}

//! Disk Cache Store
//!
//! File-based persistent store. Each namespace is a directory under the
//! root; each entry is a body file plus a `.meta` JSON file.

use crate::cache::entry::{CacheEntry, NamespaceKey};
use crate::cache::storage::CacheStore;
use crate::error::{Error, Result};
use crate::http::{Headers, RequestKey};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the disk store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskStoreConfig {
    /// Root directory holding one subdirectory per namespace
    pub root_path: PathBuf,
    /// Whether to fsync body files before publishing them
    pub sync_writes: bool,
}

impl Default for DiskStoreConfig {
    fn default() -> Self {
        Self {
            root_path: std::env::temp_dir().join("offline-cache-worker"),
            sync_writes: false,
        }
    }
}

// =============================================================================
// Stored Metadata
// =============================================================================

/// Metadata stored alongside each body file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMetadata {
    request_key: String,
    status: u16,
    headers: Headers,
    body_len: u64,
    stored_at_ms: i64,
}

impl StoredMetadata {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            request_key: entry.request_key.as_str().to_string(),
            status: entry.status,
            headers: entry.headers.clone(),
            body_len: entry.size_bytes(),
            stored_at_ms: entry.stored_at.timestamp_millis(),
        }
    }

    fn into_entry(self, body: Bytes) -> CacheEntry {
        CacheEntry {
            request_key: RequestKey::from_raw(self.request_key),
            status: self.status,
            headers: self.headers,
            body,
            stored_at: DateTime::from_timestamp_millis(self.stored_at_ms).unwrap_or_else(Utc::now),
        }
    }
}

type NamespaceIndex = HashMap<RequestKey, PathBuf>;

// =============================================================================
// Disk Cache Store
// =============================================================================

/// Persistent namespaced cache store
pub struct DiskCacheStore {
    root_path: PathBuf,
    sync_writes: bool,
    /// composite namespace key -> (request key -> body path)
    index: RwLock<HashMap<String, NamespaceIndex>>,
}

impl DiskCacheStore {
    /// Open a store rooted at `root_path`
    pub async fn with_path(root_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(DiskStoreConfig {
            root_path: root_path.into(),
            ..Default::default()
        })
        .await
    }

    /// Open a store and rebuild its index from disk
    pub async fn with_config(config: DiskStoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.root_path).await?;

        let store = Self {
            root_path: config.root_path,
            sync_writes: config.sync_writes,
            index: RwLock::new(HashMap::new()),
        };
        store.rebuild_index().await?;
        Ok(store)
    }

    /// Scan namespace directories for `.meta` files
    async fn rebuild_index(&self) -> Result<()> {
        let mut rebuilt: HashMap<String, NamespaceIndex> = HashMap::new();

        let mut namespaces = fs::read_dir(&self.root_path).await?;
        while let Some(ns_entry) = namespaces.next_entry().await? {
            let ns_path = ns_entry.path();
            if !ns_path.is_dir() {
                continue;
            }
            let composite = ns_entry.file_name().to_string_lossy().into_owned();
            let table = rebuilt.entry(composite).or_default();

            let mut files = match fs::read_dir(&ns_path).await {
                Ok(files) => files,
                Err(_) => continue,
            };
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if path.extension().map(|e| e != "meta").unwrap_or(true) {
                    continue;
                }
                let Ok(json) = fs::read_to_string(&path).await else {
                    continue;
                };
                let Ok(meta) = serde_json::from_str::<StoredMetadata>(&json) else {
                    continue;
                };
                let body_path = path.with_extension("body");
                if body_path.exists() {
                    table.insert(RequestKey::from_raw(meta.request_key), body_path);
                }
            }
        }

        let entries: usize = rebuilt.values().map(HashMap::len).sum();
        debug!(
            namespaces = rebuilt.len(),
            entries = entries,
            "Rebuilt disk cache index"
        );
        *self.index.write() = rebuilt;
        Ok(())
    }

    fn namespace_dir(&self, composite: &str) -> PathBuf {
        self.root_path.join(composite)
    }

    /// Body file path for a key
    ///
    /// Named by a name-based UUID of the key, which is stable across builds
    /// and safe as a file name.
    fn body_path(&self, namespace: &NamespaceKey, key: &RequestKey) -> PathBuf {
        let name = Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_str().as_bytes());
        self.namespace_dir(&namespace.composite())
            .join(format!("{}.body", name.simple()))
    }

    fn lookup_path(&self, namespace: &NamespaceKey, key: &RequestKey) -> Option<PathBuf> {
        self.index
            .read()
            .get(&namespace.composite())
            .and_then(|t| t.get(key).cloned())
    }

    fn read_error(namespace: &NamespaceKey, reason: impl std::fmt::Display) -> Error {
        Error::CacheRead {
            namespace: namespace.composite(),
            reason: reason.to_string(),
        }
    }

    fn write_error(namespace: &NamespaceKey, reason: impl std::fmt::Display) -> Error {
        Error::CacheWrite {
            namespace: namespace.composite(),
            reason: reason.to_string(),
        }
    }

    /// Write `data` to a temporary sibling and rename it into place
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.flush().await?;
        if self.sync_writes {
            file.sync_all().await?;
        }
        drop(file);
        fs::rename(&tmp, path).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn open(&self, namespace: &NamespaceKey) -> Result<()> {
        let composite = namespace.composite();
        fs::create_dir_all(self.namespace_dir(&composite))
            .await
            .map_err(|e| Self::write_error(namespace, e))?;
        self.index.write().entry(composite).or_default();
        Ok(())
    }

    async fn get(&self, namespace: &NamespaceKey, key: &RequestKey) -> Result<Option<CacheEntry>> {
        let Some(body_path) = self.lookup_path(namespace, key) else {
            return Ok(None);
        };
        let meta_path = body_path.with_extension("meta");

        let json = fs::read_to_string(&meta_path)
            .await
            .map_err(|e| Self::read_error(namespace, e))?;
        let meta: StoredMetadata =
            serde_json::from_str(&json).map_err(|e| Self::read_error(namespace, e))?;
        if meta.request_key != key.as_str() {
            warn!(
                namespace = %namespace,
                key = %key,
                stored = %meta.request_key,
                "Entry file belongs to another key, treating as miss"
            );
            return Ok(None);
        }
        let body = fs::read(&body_path)
            .await
            .map_err(|e| Self::read_error(namespace, e))?;

        // A concurrent writer may have replaced one file but not yet the other
        if body.len() as u64 != meta.body_len {
            return Err(Self::read_error(
                namespace,
                format!("body length {} does not match metadata {}", body.len(), meta.body_len),
            ));
        }

        Ok(Some(meta.into_entry(Bytes::from(body))))
    }

    async fn put(&self, namespace: &NamespaceKey, entry: CacheEntry) -> Result<()> {
        self.open(namespace).await?;

        let body_path = self.body_path(namespace, &entry.request_key);
        let meta_path = body_path.with_extension("meta");
        let meta_json = serde_json::to_vec(&StoredMetadata::from_entry(&entry))?;

        self.write_atomic(&body_path, &entry.body)
            .await
            .map_err(|e| Self::write_error(namespace, e))?;
        self.write_atomic(&meta_path, &meta_json)
            .await
            .map_err(|e| Self::write_error(namespace, e))?;

        self.index
            .write()
            .entry(namespace.composite())
            .or_default()
            .insert(entry.request_key, body_path);
        Ok(())
    }

    async fn delete(&self, namespace: &NamespaceKey, key: &RequestKey) -> Result<bool> {
        let removed = self
            .index
            .write()
            .get_mut(&namespace.composite())
            .and_then(|t| t.remove(key));

        let Some(body_path) = removed else {
            return Ok(false);
        };
        let _ = fs::remove_file(body_path.with_extension("meta")).await;
        let _ = fs::remove_file(&body_path).await;
        Ok(true)
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.index.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_namespace(&self, composite: &str) -> Result<bool> {
        let existed = self.index.write().remove(composite).is_some();
        let dir = self.namespace_dir(composite);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(existed),
            Err(e) => {
                warn!(namespace = %composite, error = %e, "Failed to remove namespace directory");
                Err(Error::Io(e))
            }
        }
    }

    async fn entry_count(&self, namespace: &NamespaceKey) -> Result<u64> {
        Ok(self
            .index
            .read()
            .get(&namespace.composite())
            .map(|t| t.len() as u64)
            .unwrap_or(0))
    }

    async fn health_check(&self) -> Result<bool> {
        let probe = self.root_path.join(".health_check");
        match fs::write(&probe, b"ok").await {
            Ok(_) => {
                let _ = fs::remove_file(&probe).await;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }
}

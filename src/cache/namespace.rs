//! Namespace Lifecycle Controller
//!
//! Opens version-tagged namespaces and performs generational collection:
//! on activation every namespace not tagged with the current version is
//! deleted. There is no per-entry expiry.

use crate::cache::entry::{CacheEntry, NamespaceKey, NamespaceName};
use crate::cache::events::CacheEvent;
use crate::cache::storage::CacheStoreRef;
use crate::error::Result;
use futures::future::try_join_all;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Outcome of an activation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Namespaces deleted because their version tag was stale
    pub deleted: Vec<String>,
    /// Namespaces kept because they belong to the current version
    pub retained: Vec<String>,
}

/// Manages namespaces for one deploy version
pub struct NamespaceController {
    store: CacheStoreRef,
    version_tag: String,
    events: broadcast::Sender<CacheEvent>,
}

impl NamespaceController {
    pub fn new(
        store: CacheStoreRef,
        version_tag: impl Into<String>,
        events: broadcast::Sender<CacheEvent>,
    ) -> Self {
        Self {
            store,
            version_tag: version_tag.into(),
            events,
        }
    }

    pub fn version_tag(&self) -> &str {
        &self.version_tag
    }

    /// Key of a namespace under the current version
    pub fn namespace(&self, name: NamespaceName) -> NamespaceKey {
        NamespaceKey::new(self.version_tag.clone(), name)
    }

    /// Whether a composite key belongs to the current version
    pub fn is_current(&self, composite: &str) -> bool {
        NamespaceKey::belongs_to(composite, &self.version_tag)
    }

    /// Open the static namespace and write every shell resource into it
    ///
    /// Any failed write fails the whole install.
    pub async fn install(&self, shell: Vec<CacheEntry>) -> Result<()> {
        let static_ns = self.namespace(NamespaceName::Static);
        self.store.open(&static_ns).await?;
        let _ = self.events.send(CacheEvent::NamespaceOpened {
            namespace: static_ns.composite(),
        });

        let count = shell.len();
        for entry in shell {
            let size = entry.size_bytes();
            let key = entry.request_key.clone();
            self.store.put(&static_ns, entry).await?;
            let _ = self.events.send(CacheEvent::put(&static_ns, &key, size));
            debug!(namespace = %static_ns, key = %key, "Pre-cached shell resource");
        }

        info!(namespace = %static_ns, resources = count, "Shell pre-cached");
        Ok(())
    }

    /// Delete every namespace whose version tag is not the current one
    pub async fn activate(&self) -> Result<ActivationReport> {
        let (retained, stale): (Vec<String>, Vec<String>) = self
            .store
            .namespaces()
            .await?
            .into_iter()
            .partition(|key| self.is_current(key));

        try_join_all(stale.iter().map(|key| async move {
            info!(namespace = %key, "Deleting stale cache namespace");
            self.store.delete_namespace(key).await
        }))
        .await?;

        for key in &stale {
            let _ = self.events.send(CacheEvent::NamespaceDeleted {
                namespace: key.clone(),
            });
        }

        Ok(ActivationReport {
            deleted: stale,
            retained,
        })
    }
}

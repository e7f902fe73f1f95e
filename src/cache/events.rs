//! Cache Events
//!
//! Events emitted by strategies and the namespace controller for
//! monitoring and tests.

use crate::cache::entry::NamespaceKey;
use crate::http::RequestKey;
use serde::{Deserialize, Serialize};

/// Events emitted by the cache system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheEvent {
    /// A response was written through to a namespace
    Put {
        namespace: String,
        key: String,
        size_bytes: u64,
    },

    /// Lookup found an entry
    Hit { namespace: String, key: String },

    /// Lookup found nothing
    Miss { namespace: String, key: String },

    /// A live response was not written because its status was not 2xx
    WriteSkipped {
        namespace: String,
        key: String,
        status: u16,
    },

    /// A write-through failed and was swallowed
    WriteFailed {
        namespace: String,
        key: String,
        error: String,
    },

    /// A synthetic offline response was produced
    Fallback { key: String, kind: String },

    /// A namespace was opened during install
    NamespaceOpened { namespace: String },

    /// A stale namespace was deleted during activation
    NamespaceDeleted { namespace: String },
}

impl CacheEvent {
    pub fn put(namespace: &NamespaceKey, key: &RequestKey, size_bytes: u64) -> Self {
        CacheEvent::Put {
            namespace: namespace.composite(),
            key: key.to_string(),
            size_bytes,
        }
    }

    pub fn hit(namespace: &NamespaceKey, key: &RequestKey) -> Self {
        CacheEvent::Hit {
            namespace: namespace.composite(),
            key: key.to_string(),
        }
    }

    pub fn miss(namespace: &NamespaceKey, key: &RequestKey) -> Self {
        CacheEvent::Miss {
            namespace: namespace.composite(),
            key: key.to_string(),
        }
    }

    pub fn write_skipped(namespace: &NamespaceKey, key: &RequestKey, status: u16) -> Self {
        CacheEvent::WriteSkipped {
            namespace: namespace.composite(),
            key: key.to_string(),
            status,
        }
    }

    pub fn write_failed(namespace: &NamespaceKey, key: &RequestKey, error: impl ToString) -> Self {
        CacheEvent::WriteFailed {
            namespace: namespace.composite(),
            key: key.to_string(),
            error: error.to_string(),
        }
    }

    pub fn fallback(key: &RequestKey, kind: impl ToString) -> Self {
        CacheEvent::Fallback {
            key: key.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Get the request key associated with this event (if any)
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Put { key, .. }
            | CacheEvent::Hit { key, .. }
            | CacheEvent::Miss { key, .. }
            | CacheEvent::WriteSkipped { key, .. }
            | CacheEvent::WriteFailed { key, .. }
            | CacheEvent::Fallback { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Get the namespace associated with this event (if any)
    pub fn namespace(&self) -> Option<&str> {
        match self {
            CacheEvent::Put { namespace, .. }
            | CacheEvent::Hit { namespace, .. }
            | CacheEvent::Miss { namespace, .. }
            | CacheEvent::WriteSkipped { namespace, .. }
            | CacheEvent::WriteFailed { namespace, .. }
            | CacheEvent::NamespaceOpened { namespace }
            | CacheEvent::NamespaceDeleted { namespace } => Some(namespace),
            CacheEvent::Fallback { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CacheEvent::WriteFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::NamespaceName;
    use reqwest::Url;

    #[test]
    fn test_event_accessors() {
        let ns = NamespaceKey::new("v1", NamespaceName::Api);
        let key = RequestKey::get(&Url::parse("https://app.test/api/cycle").unwrap());

        let put = CacheEvent::put(&ns, &key, 11);
        assert_eq!(put.key(), Some("GET https://app.test/api/cycle"));
        assert_eq!(put.namespace(), Some("v1-api"));
        assert!(!put.is_error());

        let failed = CacheEvent::write_failed(&ns, &key, "disk full");
        assert!(failed.is_error());

        let deleted = CacheEvent::NamespaceDeleted {
            namespace: "v0-static".into(),
        };
        assert_eq!(deleted.key(), None);
        assert_eq!(deleted.namespace(), Some("v0-static"));
    }
}

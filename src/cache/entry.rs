//! Cache Entry Types
//!
//! Defines namespace keys and cached response entries.

use crate::http::{FetchResponse, Headers, RequestKey};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Namespace Name
// =============================================================================

/// The fixed set of cache namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceName {
    /// App shell and static assets
    Static,
    /// API responses
    Api,
    /// Externally hosted images
    Images,
}

impl NamespaceName {
    /// All namespaces
    pub const ALL: [NamespaceName; 3] = [
        NamespaceName::Static,
        NamespaceName::Api,
        NamespaceName::Images,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceName::Static => "static",
            NamespaceName::Api => "api",
            NamespaceName::Images => "images",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "static" => Some(NamespaceName::Static),
            "api" => Some(NamespaceName::Api),
            "images" => Some(NamespaceName::Images),
            _ => None,
        }
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Namespace Key
// =============================================================================

/// A namespace tagged with a deploy version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceKey {
    /// Deploy version tag (e.g., "hercare-v1")
    pub version_tag: String,
    /// Namespace within the version
    pub name: NamespaceName,
}

impl NamespaceKey {
    pub fn new(version_tag: impl Into<String>, name: NamespaceName) -> Self {
        Self {
            version_tag: version_tag.into(),
            name,
        }
    }

    /// Composite key `"{version_tag}-{name}"`
    pub fn composite(&self) -> String {
        format!("{}-{}", self.version_tag, self.name)
    }

    /// Parse a composite key; the name is the segment after the last `-`
    pub fn parse(composite: &str) -> Option<Self> {
        let (version_tag, name) = composite.rsplit_once('-')?;
        if version_tag.is_empty() {
            return None;
        }
        Some(Self::new(version_tag, NamespaceName::parse(name)?))
    }

    /// Whether a composite key belongs to the given version tag
    pub fn belongs_to(composite: &str, version_tag: &str) -> bool {
        composite
            .strip_prefix(version_tag)
            .map(|rest| rest.starts_with('-'))
            .unwrap_or(false)
    }
}

impl fmt::Display for NamespaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.version_tag, self.name)
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// One cached response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Normalized request key
    pub request_key: RequestKey,
    /// Status of the original response (always 2xx)
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Response body
    pub body: Bytes,
    /// Time the entry was written
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Build an entry from a response, or `None` if the response is not 2xx
    pub fn from_response(request_key: RequestKey, response: &FetchResponse) -> Option<Self> {
        if !response.is_success() {
            return None;
        }
        Some(Self {
            request_key,
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at: Utc::now(),
        })
    }

    /// Rebuild the response this entry was cached from
    pub fn to_response(&self) -> FetchResponse {
        FetchResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    /// Body size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.body.len() as u64
    }

    /// Age in seconds since the entry was stored
    pub fn age_seconds(&self) -> u64 {
        let age = Utc::now().signed_duration_since(self.stored_at);
        age.num_seconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;

    #[test]
    fn test_composite_key() {
        let key = NamespaceKey::new("hercare-v1", NamespaceName::Static);
        assert_eq!(key.composite(), "hercare-v1-static");
        assert_eq!(key.to_string(), "hercare-v1-static");
    }

    #[test]
    fn test_composite_parsing() {
        let key = NamespaceKey::parse("hercare-v2-images").unwrap();
        assert_eq!(key.version_tag, "hercare-v2");
        assert_eq!(key.name, NamespaceName::Images);

        assert!(NamespaceKey::parse("hercare-v2-unknown").is_none());
        assert!(NamespaceKey::parse("-static").is_none());
        assert!(NamespaceKey::parse("static").is_none());
    }

    #[test]
    fn test_belongs_to_requires_separator() {
        assert!(NamespaceKey::belongs_to("v1-static", "v1"));
        assert!(!NamespaceKey::belongs_to("v10-static", "v1"));
        assert!(!NamespaceKey::belongs_to("v2-static", "v1"));
        assert!(!NamespaceKey::belongs_to("v1", "v1"));
    }

    #[test]
    fn test_entry_only_from_success() {
        let url = Url::parse("https://app.test/api/cycle").unwrap();
        let key = RequestKey::get(&url);

        let ok = FetchResponse::ok("{\"logs\":[]}").with_header("Content-Type", "application/json");
        let entry = CacheEntry::from_response(key.clone(), &ok).unwrap();
        assert_eq!(entry.status, 200);
        assert_eq!(entry.to_response(), ok);
        assert_eq!(entry.size_bytes(), 11);

        let failed = FetchResponse::new(500, "boom");
        assert!(CacheEntry::from_response(key, &failed).is_none());
    }
}

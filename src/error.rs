//! Error types for the offline cache worker
//!
//! Provides structured error types for the cache store, strategies,
//! network client, lifecycle controller, and configuration loading.

use thiserror::Error;

/// Unified error type for the worker
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Network Errors
    // =========================================================================
    #[error("Network fetch failed for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Network fetch for {url} did not settle within {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =========================================================================
    // Cache Store Errors
    // =========================================================================
    #[error("Cache read failed in {namespace}: {reason}")]
    CacheRead { namespace: String, reason: String },

    #[error("Cache write failed in {namespace}: {reason}")]
    CacheWrite { namespace: String, reason: String },

    #[error("No content could be produced for {key}")]
    NoContent { key: String },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Install failed for shell resource {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a network error from any displayable cause
    pub fn network(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Network {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this error means the origin could not be reached
    ///
    /// These are the failures strategies recover into offline fallbacks.
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            Error::Network { .. } | Error::Timeout { .. } | Error::HttpClient(_)
        )
    }
}

/// Result type alias for the worker
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_classification() {
        let err = Error::network("https://app.test/api/cycle", "connection refused");
        assert!(err.is_offline());

        let err = Error::Timeout {
            url: "https://app.test/api/cycle".into(),
            timeout_ms: 5000,
        };
        assert!(err.is_offline());

        let err = Error::CacheWrite {
            namespace: "v1-static".into(),
            reason: "disk full".into(),
        };
        assert!(!err.is_offline());
    }

    #[test]
    fn test_local_errors_are_not_offline() {
        let err = Error::Configuration("empty version tag".into());
        assert!(!err.is_offline());

        let err = Error::InvalidRequest("relative url".into());
        assert!(!err.is_offline());
    }

    #[test]
    fn test_error_display() {
        let err = Error::InstallFailed {
            url: "https://app.test/offline.html".into(),
            reason: "status 404".into(),
        };
        assert_eq!(
            err.to_string(),
            "Install failed for shell resource https://app.test/offline.html: status 404"
        );
    }
}

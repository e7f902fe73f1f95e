//! Worker Configuration
//!
//! All worker-scoped settings (deploy version, route tables, shell resources,
//! offline messages, notification defaults) live in one explicit struct that
//! is handed to the worker and dispatcher at construction time.

use crate::background::SyncTag;
use crate::cache::DiskStoreConfig;
use crate::error::{Error, Result};
use crate::network::NetworkConfig;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// Route Configuration
// =============================================================================

/// Inputs for request classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Path prefix of API calls
    pub api_prefix: String,
    /// Network timeout for API calls in milliseconds
    pub api_timeout_ms: u64,
    /// Host substrings of external image providers
    pub image_hosts: Vec<String>,
    /// File extensions served cache-first
    pub static_extensions: Vec<String>,
    /// Host substrings of font providers served cache-first
    pub font_hosts: Vec<String>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            api_prefix: "/api/".to_string(),
            api_timeout_ms: 5000,
            image_hosts: vec!["unsplash.com".into(), "images.unsplash".into()],
            static_extensions: [
                "js", "css", "woff", "woff2", "ttf", "otf", "svg", "png", "jpg", "webp", "ico",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            font_hosts: vec!["fonts.googleapis.com".into(), "fonts.gstatic.com".into()],
        }
    }
}

// =============================================================================
// Shell Configuration
// =============================================================================

/// App shell resources and offline fallbacks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Paths pre-cached into the static namespace on install
    pub urls: Vec<String>,
    /// Path of the offline HTML document served for failed navigations
    pub offline_page: String,
    /// Message of the offline API JSON body
    pub offline_api_message: String,
    /// Body of the offline static-asset response
    pub offline_asset_message: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            urls: vec!["/".into(), "/offline.html".into(), "/manifest.json".into()],
            offline_page: "/offline.html".into(),
            offline_api_message: "You are offline. Please reconnect to see live data.".into(),
            offline_asset_message: "Asset unavailable offline.".into(),
        }
    }
}

// =============================================================================
// Notification Configuration
// =============================================================================

/// Defaults applied to push payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub default_title: String,
    pub default_body: String,
    pub default_tag: String,
    pub default_url: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_title: "HerCare".into(),
            default_body: "You have a new health reminder.".into(),
            default_tag: "hercare-reminder".into(),
            default_url: "/".into(),
            icon: "/icons/icon-192x192.png".into(),
            badge: "/icons/icon-72x72.png".into(),
            vibrate: vec![100, 50, 100],
        }
    }
}

// =============================================================================
// Sync Configuration
// =============================================================================

/// Maps a write path prefix to a background sync tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRoute {
    pub path_prefix: String,
    pub tag: String,
}

/// Which failed writes are queued for background sync
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub routes: Vec<SyncRoute>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            routes: vec![
                SyncRoute {
                    path_prefix: "/api/symptoms".into(),
                    tag: "sync-symptom-logs".into(),
                },
                SyncRoute {
                    path_prefix: "/api/cycle".into(),
                    tag: "sync-cycle-logs".into(),
                },
            ],
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

/// Cache store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Disk,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub disk: DiskStoreConfig,
}

// =============================================================================
// Worker Configuration
// =============================================================================

/// Complete worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Deploy version tag; bump on each deploy to collect old namespaces
    pub version_tag: String,
    /// Origin the worker serves (shell and relative URLs resolve against it)
    pub origin: String,
    pub routes: RouteConfig,
    pub shell: ShellConfig,
    pub notifications: NotificationConfig,
    pub sync: SyncConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version_tag: "hercare-v1".into(),
            origin: "http://localhost:5173".into(),
            routes: RouteConfig::default(),
            shell: ShellConfig::default(),
            notifications: NotificationConfig::default(),
            sync: SyncConfig::default(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Load a YAML config file; missing fields take their defaults
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: WorkerConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the worker cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.version_tag.is_empty() {
            return Err(Error::Configuration("version_tag must not be empty".into()));
        }
        if !self
            .version_tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(Error::Configuration(format!(
                "version_tag {:?} may only contain ASCII letters, digits, '-', '_' and '.'",
                self.version_tag
            )));
        }
        if !self.routes.api_prefix.starts_with('/') {
            return Err(Error::Configuration(format!(
                "api_prefix {:?} must start with '/'",
                self.routes.api_prefix
            )));
        }
        if self.routes.api_timeout_ms == 0 {
            return Err(Error::Configuration("api_timeout_ms must be positive".into()));
        }
        if !self.shell.urls.contains(&self.shell.offline_page) {
            return Err(Error::Configuration(format!(
                "offline_page {} must be one of the shell urls",
                self.shell.offline_page
            )));
        }
        if let Some(route) = self
            .sync
            .routes
            .iter()
            .find(|r| SyncTag::parse(&r.tag).is_none())
        {
            return Err(Error::Configuration(format!(
                "sync route {} uses unknown tag {}",
                route.path_prefix, route.tag
            )));
        }
        self.origin_url()?;
        Ok(())
    }

    /// Parsed origin URL
    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin)
            .map_err(|e| Error::Configuration(format!("Invalid origin {}: {}", self.origin, e)))
    }

    /// Resolve a path (or absolute URL) against the origin
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.origin_url()?
            .join(path)
            .map_err(|e| Error::Configuration(format!("Cannot resolve {}: {}", path, e)))
    }
}

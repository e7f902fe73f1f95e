//! Push notifications
//!
//! Push payloads become [`Notification`]s shown through a
//! [`NotificationSurface`]. Clicks either dismiss the notification or bring
//! the target page to the front, reusing an open window when one already
//! shows that exact URL.

use crate::config::NotificationConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Action id that closes the notification without opening anything
pub const DISMISS_ACTION: &str = "dismiss";
/// Action id that opens the notification target
pub const OPEN_ACTION: &str = "open";

// =============================================================================
// Push Payload
// =============================================================================

/// Fields a push payload may carry; anything missing takes a default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: Option<String>,
    pub body: Option<String>,
    pub tag: Option<String>,
    pub url: Option<String>,
}

impl PushMessage {
    /// Parse a payload as JSON, falling back to treating it as the body text
    pub fn parse(payload: &[u8]) -> Self {
        match serde_json::from_slice::<serde_json::Value>(payload) {
            Ok(serde_json::Value::Object(fields)) => {
                let field = |name: &str| {
                    fields
                        .get(name)
                        .and_then(|v| v.as_str())
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                };
                Self {
                    title: field("title"),
                    body: field("body"),
                    tag: field("tag"),
                    url: field("url"),
                }
            }
            Ok(_) => Self::default(),
            Err(_) => {
                let text = String::from_utf8_lossy(payload).into_owned();
                Self {
                    body: Some(text).filter(|t| !t.is_empty()),
                    ..Default::default()
                }
            }
        }
    }
}

// =============================================================================
// Notification
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: Option<String>,
}

/// A notification ready to be shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    /// Page opened when the notification is clicked
    pub url: String,
    pub actions: Vec<NotificationAction>,
    pub vibrate: Vec<u32>,
}

impl Notification {
    pub fn from_push(message: PushMessage, defaults: &NotificationConfig) -> Self {
        Self {
            title: message.title.unwrap_or_else(|| defaults.default_title.clone()),
            body: message.body.unwrap_or_else(|| defaults.default_body.clone()),
            icon: defaults.icon.clone(),
            badge: defaults.badge.clone(),
            tag: message.tag.unwrap_or_else(|| defaults.default_tag.clone()),
            url: message.url.unwrap_or_else(|| defaults.default_url.clone()),
            actions: vec![
                NotificationAction {
                    action: OPEN_ACTION.into(),
                    title: "View".into(),
                    icon: Some(defaults.badge.clone()),
                },
                NotificationAction {
                    action: DISMISS_ACTION.into(),
                    title: "Dismiss".into(),
                    icon: None,
                },
            ],
            vibrate: defaults.vibrate.clone(),
        }
    }
}

// =============================================================================
// Notification Surface
// =============================================================================

/// An open application window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
    pub id: String,
    pub url: String,
}

/// Platform port for showing notifications and managing windows
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    async fn show(&self, notification: &Notification) -> Result<()>;

    /// Close the notification with the given tag
    async fn close(&self, tag: &str) -> Result<()>;

    /// All open windows, including ones not controlled by the worker
    async fn windows(&self) -> Result<Vec<WindowClient>>;

    async fn focus(&self, window_id: &str) -> Result<()>;

    async fn open_window(&self, url: &Url) -> Result<()>;
}

/// Type alias for a shared notification surface
pub type NotificationSurfaceRef = Arc<dyn NotificationSurface>;

/// Surface for headless runs: notifications are logged, windows are tracked
/// in memory
#[derive(Default)]
pub struct LoggingNotificationSurface {
    windows: Mutex<Vec<WindowClient>>,
}

impl LoggingNotificationSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationSurface for LoggingNotificationSurface {
    async fn show(&self, notification: &Notification) -> Result<()> {
        info!(
            title = %notification.title,
            tag = %notification.tag,
            url = %notification.url,
            "Showing notification: {}",
            notification.body
        );
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<()> {
        debug!(tag = %tag, "Closing notification");
        Ok(())
    }

    async fn windows(&self) -> Result<Vec<WindowClient>> {
        Ok(self.windows.lock().clone())
    }

    async fn focus(&self, window_id: &str) -> Result<()> {
        info!(window = %window_id, "Focusing window");
        Ok(())
    }

    async fn open_window(&self, url: &Url) -> Result<()> {
        let mut windows = self.windows.lock();
        let id = format!("window-{}", windows.len() + 1);
        info!(window = %id, url = %url, "Opening window");
        windows.push(WindowClient {
            id,
            url: url.to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// Push Handler
// =============================================================================

/// What a notification click did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Dismissed,
    Focused(String),
    Opened(Url),
}

/// Turns push payloads into notifications and handles clicks on them
pub struct PushHandler {
    surface: NotificationSurfaceRef,
    defaults: NotificationConfig,
    origin: Url,
}

impl PushHandler {
    pub fn new(surface: NotificationSurfaceRef, defaults: NotificationConfig, origin: Url) -> Self {
        Self {
            surface,
            defaults,
            origin,
        }
    }

    /// Show a notification for a push; empty or absent payloads show nothing
    pub async fn on_push(&self, payload: Option<&[u8]>) -> Result<Option<Notification>> {
        let Some(payload) = payload.filter(|p| !p.is_empty()) else {
            debug!("Push without payload ignored");
            return Ok(None);
        };

        let notification = Notification::from_push(PushMessage::parse(payload), &self.defaults);
        self.surface.show(&notification).await?;
        Ok(Some(notification))
    }

    /// Handle a click on a notification or one of its actions
    pub async fn on_click(
        &self,
        action: Option<&str>,
        notification: &Notification,
    ) -> Result<ClickOutcome> {
        self.surface.close(&notification.tag).await?;
        if action == Some(DISMISS_ACTION) {
            return Ok(ClickOutcome::Dismissed);
        }

        let target = self.origin.join(&notification.url).map_err(|e| {
            Error::InvalidRequest(format!("Bad notification url {}: {}", notification.url, e))
        })?;

        let windows = self.surface.windows().await?;
        if let Some(window) = windows.iter().find(|w| w.url == target.as_str()) {
            self.surface.focus(&window.id).await?;
            return Ok(ClickOutcome::Focused(window.id.clone()));
        }

        self.surface.open_window(&target).await?;
        Ok(ClickOutcome::Opened(target))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Surface recording every call for assertions
    #[derive(Default)]
    pub struct RecordingSurface {
        pub shown: Mutex<Vec<Notification>>,
        pub closed: Mutex<Vec<String>>,
        pub focused: Mutex<Vec<String>>,
        pub opened: Mutex<Vec<String>>,
        pub open_windows: Mutex<Vec<WindowClient>>,
    }

    impl RecordingSurface {
        pub fn with_window(self, id: &str, url: &str) -> Self {
            self.open_windows.lock().push(WindowClient {
                id: id.into(),
                url: url.into(),
            });
            self
        }
    }

    #[async_trait]
    impl NotificationSurface for RecordingSurface {
        async fn show(&self, notification: &Notification) -> Result<()> {
            self.shown.lock().push(notification.clone());
            Ok(())
        }

        async fn close(&self, tag: &str) -> Result<()> {
            self.closed.lock().push(tag.to_string());
            Ok(())
        }

        async fn windows(&self) -> Result<Vec<WindowClient>> {
            Ok(self.open_windows.lock().clone())
        }

        async fn focus(&self, window_id: &str) -> Result<()> {
            self.focused.lock().push(window_id.to_string());
            Ok(())
        }

        async fn open_window(&self, url: &Url) -> Result<()> {
            self.opened.lock().push(url.to_string());
            Ok(())
        }
    }
}

//! Background Task Queue
//!
//! Work that happens outside a request: replaying queued writes when a sync
//! tag is signalled, and turning push payloads into notifications.

pub mod push;
pub mod sync;

pub use push::{
    ClickOutcome, LoggingNotificationSurface, Notification, NotificationAction, NotificationSurface,
    NotificationSurfaceRef, PushHandler, PushMessage, WindowClient, DISMISS_ACTION, OPEN_ACTION,
};
pub use sync::{PendingSyncTask, SyncQueue, SyncReport, SyncTag, IDEMPOTENCY_HEADER};

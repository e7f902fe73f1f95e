//! Offline Worker
//!
//! Owns the lifecycle of one deploy version and routes host events to the
//! dispatcher, the namespace controller and the background queue.
//!
//! # Lifecycle
//!
//! ```text
//!   Parsed ──install──► Installing ──ok──► Installed ──activate──► Activating ──► Activated
//!                            │                                                        │
//!                            └──fail──► Redundant                          claim clients
//! ```
//!
//! Install fetches the app shell from the origin and pre-caches it; any
//! failure marks the worker redundant. Activation collects every namespace
//! left behind by older versions. Requests are only intercepted once the
//! worker is active; before that they go straight to the network.

use crate::background::{
    ClickOutcome, Notification, NotificationSurfaceRef, PushHandler, SyncQueue, SyncReport,
};
use crate::cache::{
    ActivationReport, CacheEntry, CacheEvent, CacheStoreRef, NamespaceController,
};
use crate::config::WorkerConfig;
use crate::dispatcher::{default_routes, Dispatcher, Interception};
use crate::error::{Error, Result};
use crate::http::{FetchRequest, FetchResponse, Method};
use crate::network::NetworkClientRef;
use crate::strategy::{network_only, OfflineFallbacks, StrategyContext};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::try_join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the cache event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// Worker State
// =============================================================================

/// Lifecycle state of the worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    #[default]
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "Parsed"),
            WorkerState::Installing => write!(f, "Installing"),
            WorkerState::Installed => write!(f, "Installed"),
            WorkerState::Activating => write!(f, "Activating"),
            WorkerState::Activated => write!(f, "Activated"),
            WorkerState::Redundant => write!(f, "Redundant"),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Messages posted to the worker by the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate a waiting worker without waiting for old clients to close
    SkipWaiting,
}

impl WorkerMessage {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// Events delivered by the host
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(FetchRequest),
    Sync(String),
    Push(Option<Bytes>),
    NotificationClick {
        action: Option<String>,
        notification: Notification,
    },
    Message(WorkerMessage),
}

/// Result of routing one event
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed,
    Activated(ActivationReport),
    Response(FetchResponse),
    Synced(SyncReport),
    Notified(Option<Notification>),
    Clicked(ClickOutcome),
    MessageHandled,
}

/// One method per host event
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_install(&self) -> Result<()>;

    async fn on_activate(&self) -> Result<ActivationReport>;

    async fn on_fetch(&self, request: FetchRequest) -> Result<FetchResponse>;

    async fn on_sync(&self, tag: &str) -> SyncReport;

    async fn on_push(&self, payload: Option<Bytes>) -> Result<Option<Notification>>;

    async fn on_notification_click(
        &self,
        action: Option<&str>,
        notification: &Notification,
    ) -> Result<ClickOutcome>;

    async fn on_message(&self, message: WorkerMessage) -> Result<()>;
}

/// Dispatches host events to an [`EventHandler`]
pub struct EventRouter {
    handler: Arc<dyn EventHandler>,
}

impl EventRouter {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self { handler }
    }

    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Install => {
                self.handler.on_install().await?;
                Ok(EventOutcome::Installed)
            }
            WorkerEvent::Activate => self.handler.on_activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => self.handler.on_fetch(request).await.map(EventOutcome::Response),
            WorkerEvent::Sync(tag) => Ok(EventOutcome::Synced(self.handler.on_sync(&tag).await)),
            WorkerEvent::Push(payload) => self.handler.on_push(payload).await.map(EventOutcome::Notified),
            WorkerEvent::NotificationClick {
                action,
                notification,
            } => self
                .handler
                .on_notification_click(action.as_deref(), &notification)
                .await
                .map(EventOutcome::Clicked),
            WorkerEvent::Message(message) => {
                self.handler.on_message(message).await?;
                Ok(EventOutcome::MessageHandled)
            }
        }
    }
}

// =============================================================================
// Offline Worker
// =============================================================================

/// The worker for one deploy version
pub struct OfflineWorker {
    config: WorkerConfig,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
    network: NetworkClientRef,
    dispatcher: Dispatcher,
    namespaces: NamespaceController,
    sync: SyncQueue,
    push: PushHandler,
}

impl OfflineWorker {
    pub fn new(
        config: WorkerConfig,
        store: CacheStoreRef,
        network: NetworkClientRef,
        surface: NotificationSurfaceRef,
    ) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let ctx = StrategyContext::new(
            store.clone(),
            network.clone(),
            OfflineFallbacks::from_config(&config)?,
            events.clone(),
        );
        let dispatcher = Dispatcher::new(ctx, default_routes(&config.routes));
        let namespaces = NamespaceController::new(store, config.version_tag.clone(), events);
        let sync = SyncQueue::new(network.clone(), &config.sync)?;
        let push = PushHandler::new(surface, config.notifications.clone(), config.origin_url()?);

        info!(version = %config.version_tag, origin = %config.origin, "Worker parsed");
        Ok(Self {
            config,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
            network,
            dispatcher,
            namespaces,
            sync,
            push,
        })
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    pub fn version_tag(&self) -> &str {
        &self.config.version_tag
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn sync_queue(&self) -> &SyncQueue {
        &self.sync
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.dispatcher.subscribe()
    }

    pub fn is_skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::Acquire)
    }

    /// Ready to serve (used by readiness probes)
    pub fn is_active(&self) -> bool {
        self.state() == WorkerState::Activated
    }

    fn transition(&self, allowed: &[WorkerState], next: WorkerState) -> Result<WorkerState> {
        let mut state = self.state.write();
        if !allowed.contains(&*state) {
            return Err(Error::InvalidTransition {
                from: state.to_string(),
                to: next.to_string(),
            });
        }
        let previous = *state;
        *state = next;
        debug!(from = %previous, to = %next, "Worker state transition");
        Ok(previous)
    }

    fn set_state(&self, next: WorkerState) {
        *self.state.write() = next;
    }

    /// Pre-cache the app shell; a failure makes the worker redundant
    pub async fn install(&self) -> Result<()> {
        if self.state() == WorkerState::Activated {
            debug!("Worker already active, install is a no-op");
            return Ok(());
        }
        self.transition(
            &[WorkerState::Parsed, WorkerState::Installed],
            WorkerState::Installing,
        )?;

        match self.precache_shell().await {
            Ok(count) => {
                self.set_state(WorkerState::Installed);
                self.skip_waiting.store(true, Ordering::Release);
                info!(version = %self.config.version_tag, resources = count, "Worker installed");
                Ok(())
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant);
                warn!(version = %self.config.version_tag, error = %e, "Install failed, worker is redundant");
                Err(e)
            }
        }
    }

    async fn precache_shell(&self) -> Result<usize> {
        let fetches = self
            .config
            .shell
            .urls
            .iter()
            .map(|path| self.fetch_shell_resource(path));
        let entries = try_join_all(fetches).await?;
        let count = entries.len();
        self.namespaces.install(entries).await?;
        Ok(count)
    }

    async fn fetch_shell_resource(&self, path: &str) -> Result<CacheEntry> {
        let url = self.config.resolve(path)?;
        let request = FetchRequest::from_url(Method::Get, url);
        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|e| Error::InstallFailed {
                url: request.url.to_string(),
                reason: e.to_string(),
            })?;

        CacheEntry::from_response(request.cache_key(), &response).ok_or_else(|| {
            Error::InstallFailed {
                url: request.url.to_string(),
                reason: format!("status {}", response.status),
            }
        })
    }

    /// Collect stale namespaces and take control of open clients
    pub async fn activate(&self) -> Result<ActivationReport> {
        self.transition(
            &[WorkerState::Installed, WorkerState::Activated],
            WorkerState::Activating,
        )?;

        match self.namespaces.activate().await {
            Ok(report) => {
                self.set_state(WorkerState::Activated);
                self.claim();
                info!(
                    version = %self.config.version_tag,
                    deleted = report.deleted.len(),
                    retained = report.retained.len(),
                    "Worker activated"
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(WorkerState::Installed);
                warn!(error = %e, "Activation failed");
                Err(e)
            }
        }
    }

    fn claim(&self) {
        if !self.clients_claimed.swap(true, Ordering::AcqRel) {
            info!("Claimed open clients");
        }
    }

    /// Stop waiting and take over now
    ///
    /// An installed worker is activated on the spot. In any other state the
    /// request is only recorded and `None` is returned.
    pub async fn skip_waiting(&self) -> Result<Option<ActivationReport>> {
        self.skip_waiting.store(true, Ordering::Release);
        if self.state() != WorkerState::Installed {
            debug!(state = %self.state(), "Skip-waiting recorded, nothing to activate");
            return Ok(None);
        }
        self.activate().await.map(Some)
    }

    /// Serve a request
    ///
    /// Pass-through writes on a sync route that fail because the origin is
    /// unreachable are queued for background sync; the error still reaches
    /// the caller.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        if !self.is_active() {
            return self.network.fetch(&request).await;
        }

        match self.dispatcher.handle(&request).await {
            Interception::Respond(response) => Ok(response),
            Interception::Passthrough => {
                match network_only(self.dispatcher.context(), &request).await {
                    Err(e) if e.is_offline() => {
                        if let Some(tag) = self.sync.tag_for(&request) {
                            self.sync.enqueue(tag, request);
                        }
                        Err(e)
                    }
                    other => other,
                }
            }
        }
    }
}

#[async_trait]
impl EventHandler for OfflineWorker {
    async fn on_install(&self) -> Result<()> {
        self.install().await
    }

    async fn on_activate(&self) -> Result<ActivationReport> {
        self.activate().await
    }

    async fn on_fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        self.fetch(request).await
    }

    async fn on_sync(&self, tag: &str) -> SyncReport {
        self.sync.on_sync(tag).await
    }

    async fn on_push(&self, payload: Option<Bytes>) -> Result<Option<Notification>> {
        self.push.on_push(payload.as_deref()).await
    }

    async fn on_notification_click(
        &self,
        action: Option<&str>,
        notification: &Notification,
    ) -> Result<ClickOutcome> {
        self.push.on_click(action, notification).await
    }

    async fn on_message(&self, message: WorkerMessage) -> Result<()> {
        match message {
            WorkerMessage::SkipWaiting => {
                info!("Skip-waiting requested by client");
                self.skip_waiting().await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::push::test_support::RecordingSurface;
    use crate::background::SyncTag;
    use crate::cache::{CacheStore, MemoryCacheStore, NamespaceKey, NamespaceName};
    use crate::network::mock::MockNetwork;
    use assert_matches::assert_matches;

    const ORIGIN: &str = "https://app.test";

    fn config() -> WorkerConfig {
        WorkerConfig {
            version_tag: "v2".into(),
            origin: ORIGIN.into(),
            ..Default::default()
        }
    }

    fn shell_network() -> Arc<MockNetwork> {
        let network = MockNetwork::new();
        network.respond("https://app.test/", 200, "<html>home</html>");
        network.respond("https://app.test/offline.html", 200, "<html>offline</html>");
        network.respond("https://app.test/manifest.json", 200, "{}");
        network
    }

    fn worker(network: Arc<MockNetwork>) -> (Arc<OfflineWorker>, Arc<MemoryCacheStore>) {
        let store = Arc::new(MemoryCacheStore::new());
        let worker = OfflineWorker::new(
            config(),
            store.clone(),
            network,
            Arc::new(RecordingSurface::default()),
        )
        .unwrap();
        (Arc::new(worker), store)
    }

    #[tokio::test]
    async fn test_install_precaches_shell() {
        let (worker, store) = worker(shell_network());

        worker.install().await.unwrap();

        assert_eq!(worker.state(), WorkerState::Installed);
        assert!(worker.is_skip_waiting());
        let static_ns = NamespaceKey::new("v2", NamespaceName::Static);
        assert_eq!(store.entry_count(&static_ns).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_install_is_redundant() {
        let network = shell_network();
        network.respond("https://app.test/manifest.json", 404, "");
        let (worker, store) = worker(network);

        let err = worker.install().await.unwrap_err();

        assert_matches!(err, Error::InstallFailed { .. });
        assert_eq!(worker.state(), WorkerState::Redundant);
        assert!(store.namespaces().await.unwrap().is_empty());
        assert_matches!(worker.activate().await, Err(Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_activate_collects_old_versions() {
        let (worker, store) = worker(shell_network());
        store
            .open(&NamespaceKey::new("v1", NamespaceName::Static))
            .await
            .unwrap();
        store
            .open(&NamespaceKey::new("v1", NamespaceName::Api))
            .await
            .unwrap();

        worker.install().await.unwrap();
        let report = worker.activate().await.unwrap();

        assert_eq!(report.deleted, vec!["v1-api".to_string(), "v1-static".to_string()]);
        assert_eq!(report.retained, vec!["v2-static".to_string()]);
        assert_eq!(worker.state(), WorkerState::Activated);
        assert!(worker.clients_claimed());

        let again = worker.activate().await.unwrap();
        assert!(again.deleted.is_empty());
    }

    #[tokio::test]
    async fn test_activate_before_install_is_rejected() {
        let (worker, _) = worker(shell_network());
        assert_matches!(worker.activate().await, Err(Error::InvalidTransition { .. }));
        assert_eq!(worker.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_requests_pass_through_until_active() {
        let network = shell_network();
        network.respond("https://app.test/app.js", 200, "js");
        let (worker, store) = worker(network);

        worker
            .fetch(FetchRequest::get("https://app.test/app.js").unwrap())
            .await
            .unwrap();

        let static_ns = NamespaceKey::new("v2", NamespaceName::Static);
        assert_eq!(store.entry_count(&static_ns).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_navigation_serves_precached_page() {
        let network = shell_network();
        network.fail("https://app.test/dashboard");
        let (worker, _) = worker(network);
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let response = worker
            .fetch(FetchRequest::navigate("https://app.test/dashboard").unwrap())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "<html>offline</html>");
    }

    #[tokio::test]
    async fn test_offline_write_is_queued_and_replayed() {
        let network = shell_network();
        network.fail("https://app.test/api/symptoms");
        let (worker, _) = worker(network.clone());
        let router = EventRouter::new(worker.clone());
        router.dispatch(WorkerEvent::Install).await.unwrap();
        router.dispatch(WorkerEvent::Activate).await.unwrap();

        let write = FetchRequest::new(Method::Post, "https://app.test/api/symptoms")
            .unwrap()
            .with_body(r#"{"cramps":2}"#);
        let result = router.dispatch(WorkerEvent::Fetch(write)).await;
        assert_matches!(result, Err(Error::Network { .. }));
        assert_eq!(worker.sync_queue().pending(SyncTag::SymptomLogs), 1);

        network.respond("https://app.test/api/symptoms", 201, "");
        let outcome = router
            .dispatch(WorkerEvent::Sync("sync-symptom-logs".into()))
            .await
            .unwrap();
        assert_matches!(outcome, EventOutcome::Synced(report) if report.replayed == 1);
        assert_eq!(worker.sync_queue().pending(SyncTag::SymptomLogs), 0);
    }

    #[tokio::test]
    async fn test_unsynced_write_failure_is_not_queued() {
        let network = shell_network();
        network.fail("https://app.test/api/chat");
        let (worker, _) = worker(network);
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let write = FetchRequest::new(Method::Post, "https://app.test/api/chat").unwrap();
        assert!(worker.fetch(write).await.is_err());
        for tag in SyncTag::ALL {
            assert_eq!(worker.sync_queue().pending(tag), 0);
        }
    }

    #[tokio::test]
    async fn test_skip_waiting_message() {
        let (worker, _) = worker(shell_network());
        let router = EventRouter::new(worker.clone());

        let message = WorkerMessage::parse(br#"{"type":"SKIP_WAITING"}"#).unwrap();
        let outcome = router.dispatch(WorkerEvent::Message(message)).await.unwrap();

        assert_matches!(outcome, EventOutcome::MessageHandled);
        assert!(worker.is_skip_waiting());
    }

    #[tokio::test]
    async fn test_skip_waiting_message_activates_installed_worker() {
        let (worker, store) = worker(shell_network());
        store
            .open(&NamespaceKey::new("v1", NamespaceName::Api))
            .await
            .unwrap();
        worker.install().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Installed);
        let router = EventRouter::new(worker.clone());

        let outcome = router
            .dispatch(WorkerEvent::Message(WorkerMessage::SkipWaiting))
            .await
            .unwrap();

        assert_matches!(outcome, EventOutcome::MessageHandled);
        assert_eq!(worker.state(), WorkerState::Activated);
        assert!(worker.clients_claimed());
        assert_eq!(store.namespaces().await.unwrap(), vec!["v2-static".to_string()]);
    }

    #[tokio::test]
    async fn test_skip_waiting_before_install_only_records() {
        let (worker, _) = worker(shell_network());

        assert!(worker.skip_waiting().await.unwrap().is_none());

        assert_eq!(worker.state(), WorkerState::Parsed);
        assert!(worker.is_skip_waiting());
    }

    #[tokio::test]
    async fn test_push_event_shows_notification() {
        let (worker, _) = worker(shell_network());
        let router = EventRouter::new(worker);

        let outcome = router
            .dispatch(WorkerEvent::Push(Some(Bytes::from_static(br#"{"title":"Reminder"}"#))))
            .await
            .unwrap();
        assert_matches!(outcome, EventOutcome::Notified(Some(n)) if n.title == "Reminder");

        let outcome = router.dispatch(WorkerEvent::Push(None)).await.unwrap();
        assert_matches!(outcome, EventOutcome::Notified(None));
    }

    #[test]
    fn test_unknown_message_is_rejected() {
        assert!(WorkerMessage::parse(br#"{"type":"RELOAD"}"#).is_err());
    }
}

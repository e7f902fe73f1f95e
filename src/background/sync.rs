//! Background sync
//!
//! Writes that fail because the origin is unreachable are queued under a
//! sync tag and replayed when that tag is signalled.
//!
//! Replay contract:
//! - each signal attempts every task queued under its tag at most once
//! - every attempt carries the task's `Idempotency-Key`
//! - 2xx or 409 completes the task and reports its key as accepted
//! - any other 4xx drops the task
//! - 5xx or a transport failure keeps the task for the next signal

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::http::FetchRequest;
use crate::network::NetworkClientRef;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Header carrying the replay key
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

// =============================================================================
// Sync Tags
// =============================================================================

/// Known background sync tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncTag {
    SymptomLogs,
    CycleLogs,
}

impl SyncTag {
    pub const ALL: [SyncTag; 2] = [SyncTag::SymptomLogs, SyncTag::CycleLogs];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTag::SymptomLogs => "sync-symptom-logs",
            SyncTag::CycleLogs => "sync-cycle-logs",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for SyncTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Pending Task
// =============================================================================

/// A queued write waiting for connectivity
#[derive(Debug, Clone)]
pub struct PendingSyncTask {
    pub tag: SyncTag,
    pub enqueued_at: DateTime<Utc>,
    pub idempotency_key: Uuid,
    pub request: FetchRequest,
    /// Replay attempts made so far
    pub attempts: u32,
}

/// Outcome of one sync signal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Tasks the origin accepted (2xx or 409)
    pub replayed: usize,
    /// Idempotency keys of the accepted tasks
    pub accepted: Vec<Uuid>,
    /// Tasks the origin rejected with a 4xx
    pub dropped: usize,
    /// Tasks kept for the next signal
    pub requeued: usize,
}

enum ReplayOutcome {
    Accepted,
    Rejected(u16),
    Retry(String),
}

// =============================================================================
// Sync Queue
// =============================================================================

/// Queue of failed writes, grouped by tag
pub struct SyncQueue {
    network: NetworkClientRef,
    routes: Vec<(String, SyncTag)>,
    pending: DashMap<SyncTag, Vec<PendingSyncTask>>,
}

impl SyncQueue {
    pub fn new(network: NetworkClientRef, config: &SyncConfig) -> Result<Self> {
        let routes = config
            .routes
            .iter()
            .map(|route| {
                SyncTag::parse(&route.tag)
                    .map(|tag| (route.path_prefix.clone(), tag))
                    .ok_or_else(|| Error::Configuration(format!("Unknown sync tag {}", route.tag)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            network,
            routes,
            pending: DashMap::new(),
        })
    }

    /// Tag a failed write would be queued under, if any
    pub fn tag_for(&self, request: &FetchRequest) -> Option<SyncTag> {
        if !request.method.is_write() {
            return None;
        }
        let path = request.path();
        self.routes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, tag)| *tag)
    }

    /// Queue a write for replay; returns its idempotency key
    pub fn enqueue(&self, tag: SyncTag, request: FetchRequest) -> Uuid {
        let key = Uuid::new_v4();
        info!(tag = %tag, url = %request.url, idempotency_key = %key, "Queued write for background sync");
        self.pending.entry(tag).or_default().push(PendingSyncTask {
            tag,
            enqueued_at: Utc::now(),
            idempotency_key: key,
            request,
            attempts: 0,
        });
        key
    }

    /// Number of tasks waiting under a tag
    pub fn pending(&self, tag: SyncTag) -> usize {
        self.pending.get(&tag).map(|t| t.len()).unwrap_or(0)
    }

    pub fn pending_tasks(&self, tag: SyncTag) -> Vec<PendingSyncTask> {
        self.pending.get(&tag).map(|t| t.clone()).unwrap_or_default()
    }

    /// Handle a sync signal; unknown tags are ignored
    pub async fn on_sync(&self, tag: &str) -> SyncReport {
        let Some(tag) = SyncTag::parse(tag) else {
            debug!(tag = %tag, "Ignoring unknown sync tag");
            return SyncReport::default();
        };

        // Taking the batch out means a concurrent signal cannot replay it too
        let batch = self
            .pending
            .remove(&tag)
            .map(|(_, tasks)| tasks)
            .unwrap_or_default();
        if batch.is_empty() {
            debug!(tag = %tag, "Nothing to sync");
            return SyncReport::default();
        }

        let mut report = SyncReport::default();
        let mut retry = Vec::new();
        for mut task in batch {
            task.attempts += 1;
            match self.replay(&task).await {
                ReplayOutcome::Accepted => {
                    report.accepted.push(task.idempotency_key);
                    report.replayed += 1;
                }
                ReplayOutcome::Rejected(status) => {
                    warn!(tag = %tag, url = %task.request.url, status = status, "Origin rejected queued write, dropping");
                    report.dropped += 1;
                }
                ReplayOutcome::Retry(reason) => {
                    debug!(tag = %tag, url = %task.request.url, attempts = task.attempts, reason = %reason, "Replay failed, keeping task");
                    retry.push(task);
                }
            }
        }

        report.requeued = retry.len();
        if !retry.is_empty() {
            // Older tasks go back in front of anything queued meanwhile
            let mut slot = self.pending.entry(tag).or_default();
            retry.append(&mut *slot);
            *slot = retry;
        }

        info!(
            tag = %tag,
            replayed = report.replayed,
            dropped = report.dropped,
            requeued = report.requeued,
            "Background sync complete"
        );
        report
    }

    async fn replay(&self, task: &PendingSyncTask) -> ReplayOutcome {
        let request = task
            .request
            .clone()
            .with_header(IDEMPOTENCY_HEADER, task.idempotency_key.to_string());
        match self.network.fetch(&request).await {
            Ok(response) if response.is_success() || response.status == 409 => ReplayOutcome::Accepted,
            Ok(response) if (400..500).contains(&response.status) => {
                ReplayOutcome::Rejected(response.status)
            }
            Ok(response) => ReplayOutcome::Retry(format!("status {}", response.status)),
            Err(e) => ReplayOutcome::Retry(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::network::mock::MockNetwork;
    use std::sync::Arc;

    const SYMPTOMS: &str = "https://app.test/api/symptoms";

    fn queue(network: Arc<MockNetwork>) -> SyncQueue {
        SyncQueue::new(network, &SyncConfig::default()).unwrap()
    }

    fn post(url: &str) -> FetchRequest {
        FetchRequest::new(Method::Post, url)
            .unwrap()
            .with_body(r#"{"mood":"ok"}"#)
    }

    #[test]
    fn test_tag_parsing() {
        assert_eq!(SyncTag::parse("sync-symptom-logs"), Some(SyncTag::SymptomLogs));
        assert_eq!(SyncTag::parse("sync-cycle-logs"), Some(SyncTag::CycleLogs));
        assert_eq!(SyncTag::parse("sync-everything"), None);
    }

    #[test]
    fn test_tag_for_write_routes() {
        let q = queue(MockNetwork::new());
        assert_eq!(q.tag_for(&post(SYMPTOMS)), Some(SyncTag::SymptomLogs));
        assert_eq!(
            q.tag_for(&post("https://app.test/api/cycle/42")),
            Some(SyncTag::CycleLogs)
        );
        assert_eq!(q.tag_for(&post("https://app.test/api/chat")), None);
        assert_eq!(q.tag_for(&FetchRequest::get(SYMPTOMS).unwrap()), None);
    }

    #[test]
    fn test_unknown_configured_tag_is_rejected() {
        let mut config = SyncConfig::default();
        config.routes[0].tag = "sync-mystery".into();
        assert!(SyncQueue::new(MockNetwork::new(), &config).is_err());
    }

    #[tokio::test]
    async fn test_accepted_task_is_never_replayed() {
        let network = MockNetwork::new();
        network.respond(SYMPTOMS, 201, "");
        let q = queue(network.clone());
        let key = q.enqueue(SyncTag::SymptomLogs, post(SYMPTOMS));

        let report = q.on_sync("sync-symptom-logs").await;
        assert_eq!(report.replayed, 1);
        assert_eq!(report.accepted, vec![key]);
        assert_eq!(q.pending(SyncTag::SymptomLogs), 0);

        q.on_sync("sync-symptom-logs").await;
        assert_eq!(network.calls(SYMPTOMS), 1);

        let sent = network.requests();
        assert_eq!(sent[0].header(IDEMPOTENCY_HEADER), Some(key.to_string().as_str()));
    }

    #[tokio::test]
    async fn test_conflict_counts_as_accepted() {
        let network = MockNetwork::new();
        network.respond(SYMPTOMS, 409, "duplicate");
        let q = queue(network);
        q.enqueue(SyncTag::SymptomLogs, post(SYMPTOMS));

        assert_eq!(q.on_sync("sync-symptom-logs").await.replayed, 1);
    }

    #[tokio::test]
    async fn test_client_error_drops_task() {
        let network = MockNetwork::new();
        network.respond(SYMPTOMS, 422, "invalid");
        let q = queue(network);
        q.enqueue(SyncTag::SymptomLogs, post(SYMPTOMS));

        let report = q.on_sync("sync-symptom-logs").await;
        assert_eq!(report.dropped, 1);
        assert_eq!(q.pending(SyncTag::SymptomLogs), 0);
    }

    #[tokio::test]
    async fn test_failures_are_retried_once_per_signal() {
        let network = MockNetwork::new();
        network.fail(SYMPTOMS);
        let q = queue(network.clone());
        q.enqueue(SyncTag::SymptomLogs, post(SYMPTOMS));

        let report = q.on_sync("sync-symptom-logs").await;
        assert_eq!(report.requeued, 1);
        assert_eq!(network.calls(SYMPTOMS), 1);

        network.respond(SYMPTOMS, 503, "busy");
        q.on_sync("sync-symptom-logs").await;
        assert_eq!(network.calls(SYMPTOMS), 2);
        assert_eq!(q.pending_tasks(SyncTag::SymptomLogs)[0].attempts, 2);

        network.respond(SYMPTOMS, 200, "");
        assert_eq!(q.on_sync("sync-symptom-logs").await.replayed, 1);
        assert_eq!(q.pending(SyncTag::SymptomLogs), 0);
    }

    #[tokio::test]
    async fn test_signal_only_touches_its_tag() {
        let network = MockNetwork::new();
        network.respond(SYMPTOMS, 200, "");
        let q = queue(network.clone());
        q.enqueue(SyncTag::SymptomLogs, post(SYMPTOMS));
        q.enqueue(SyncTag::CycleLogs, post("https://app.test/api/cycle"));

        q.on_sync("sync-symptom-logs").await;
        assert_eq!(q.pending(SyncTag::CycleLogs), 1);
        assert_eq!(network.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tag_is_noop() {
        let network = MockNetwork::new();
        let q = queue(network.clone());
        q.enqueue(SyncTag::SymptomLogs, post(SYMPTOMS));

        assert_eq!(q.on_sync("sync-unknown").await, SyncReport::default());
        assert_eq!(q.pending(SyncTag::SymptomLogs), 1);
        assert_eq!(network.total_calls(), 0);
    }
}

//! Network-first with an optional timeout
//!
//! ```text
//!   caller ──select!──┬── oneshot ◄── spawned fetch ──► then write-through (2xx)
//!                     └── sleep(timeout)
//!                            │
//!                            ▼
//!               cached entry ► fallback
//! ```
//!
//! The fetch runs in its own task. The live response is handed to the caller
//! before the cache write starts, so a slow store never turns a network win
//! into a fallback. When the timer wins the caller falls back immediately,
//! but the task keeps running and still writes a late 2xx response through.

use crate::cache::NamespaceKey;
use crate::error::Result;
use crate::http::{FetchRequest, FetchResponse};
use crate::strategy::{FallbackKind, StrategyContext};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

enum Outcome {
    Settled(Result<FetchResponse>),
    TimedOut,
    Aborted,
}

/// Serve `request` from the network, falling back to the cache
///
/// Live responses of any status are returned as-is; only 2xx ones are
/// written to `namespace`. A transport failure or, when `timeout` is set,
/// the timer elapsing first serves the cached entry from `namespace`, or the
/// `fallback` response when there is none. With no namespace nothing is read
/// or written.
pub async fn network_first(
    ctx: &StrategyContext,
    namespace: Option<&NamespaceKey>,
    request: &FetchRequest,
    timeout: Option<Duration>,
    fallback: FallbackKind,
) -> Result<FetchResponse> {
    let key = request.cache_key();
    let (tx, rx) = oneshot::channel();

    {
        let ctx = ctx.clone();
        let request = request.clone();
        let namespace = namespace.cloned();
        let key = key.clone();
        tokio::spawn(async move {
            // The receiver is gone once the caller has fallen back
            match (ctx.network.fetch(&request).await, namespace) {
                (Ok(response), Some(namespace)) => {
                    let _ = tx.send(Ok(response.clone()));
                    ctx.write_through(&namespace, &key, &response).await;
                }
                (result, _) => {
                    let _ = tx.send(result);
                }
            }
        });
    }

    let outcome = match timeout {
        Some(limit) => tokio::select! {
            biased;
            settled = rx => settled.map(Outcome::Settled).unwrap_or(Outcome::Aborted),
            _ = tokio::time::sleep(limit) => Outcome::TimedOut,
        },
        None => rx.await.map(Outcome::Settled).unwrap_or(Outcome::Aborted),
    };

    match outcome {
        Outcome::Settled(Ok(response)) => return Ok(response),
        Outcome::Settled(Err(e)) => {
            debug!(key = %key, error = %e, "Network failed, falling back");
        }
        Outcome::TimedOut => {
            debug!(key = %key, timeout_ms = ?timeout.map(|t| t.as_millis()), "Network timed out, falling back");
        }
        Outcome::Aborted => {
            warn!(key = %key, "Fetch task ended without a result, falling back");
        }
    }

    if let Some(namespace) = namespace {
        if let Some(entry) = ctx.lookup(namespace, &key).await {
            ctx.metrics.namespace(namespace.name).record_stale_served();
            return Ok(entry.to_response());
        }
    }
    ctx.fallbacks.produce(fallback, ctx, &key).await
}

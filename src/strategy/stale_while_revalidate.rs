//! Stale-while-revalidate: answer from cache, refresh in the background

use crate::cache::NamespaceKey;
use crate::error::{Error, Result};
use crate::http::{FetchRequest, FetchResponse};
use crate::strategy::StrategyContext;
use tokio::sync::oneshot;
use tracing::debug;

/// Serve the cached entry immediately and refresh it in the background
///
/// The refresh is always started and always writes a 2xx result through.
/// With no cached entry the caller waits for the refresh; if that fails
/// there is no content to serve.
pub async fn stale_while_revalidate(
    ctx: &StrategyContext,
    namespace: &NamespaceKey,
    request: &FetchRequest,
) -> Result<FetchResponse> {
    let key = request.cache_key();
    let cached = ctx.lookup(namespace, &key).await;

    let (tx, rx) = oneshot::channel();
    {
        let ctx = ctx.clone();
        let request = request.clone();
        let namespace = namespace.clone();
        let key = key.clone();
        tokio::spawn(async move {
            match ctx.network.fetch(&request).await {
                Ok(response) => {
                    let _ = tx.send(Ok(response.clone()));
                    ctx.write_through(&namespace, &key, &response).await;
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "Background revalidation failed");
                    let _ = tx.send(Err(e));
                }
            }
        });
    }

    if let Some(entry) = cached {
        return Ok(entry.to_response());
    }

    match rx.await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(_)) | Err(_) => Err(Error::NoContent {
            key: key.to_string(),
        }),
    }
}

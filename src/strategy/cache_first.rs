//! Cache-first: serve from the namespace, fetch only on a miss

use crate::cache::NamespaceKey;
use crate::error::Result;
use crate::http::{FetchRequest, FetchResponse};
use crate::strategy::{FallbackKind, StrategyContext};
use tracing::debug;

/// Serve `request` from `namespace`, going to the network only on a miss
///
/// A miss is fetched and, if 2xx, written through before it is returned.
/// Non-2xx live responses reach the caller uncached. A transport failure
/// produces the offline asset response.
pub async fn cache_first(
    ctx: &StrategyContext,
    namespace: &NamespaceKey,
    request: &FetchRequest,
) -> Result<FetchResponse> {
    let key = request.cache_key();
    if let Some(entry) = ctx.lookup(namespace, &key).await {
        return Ok(entry.to_response());
    }

    match ctx.network.fetch(request).await {
        Ok(response) => {
            ctx.write_through(namespace, &key, &response).await;
            Ok(response)
        }
        Err(e) => {
            debug!(key = %key, error = %e, "Cache miss and network unavailable");
            ctx.fallbacks
                .produce(FallbackKind::OfflineAsset, ctx, &key)
                .await
        }
    }
}

//! Network-only: never touches the cache

use crate::error::Result;
use crate::http::{FetchRequest, FetchResponse};
use crate::strategy::StrategyContext;

/// Forward `request` to the network; errors are returned unchanged
pub async fn network_only(ctx: &StrategyContext, request: &FetchRequest) -> Result<FetchResponse> {
    ctx.metrics.record_passthrough();
    ctx.network.fetch(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, NamespaceName};
    use crate::http::Method;
    use crate::network::mock::MockNetwork;
    use crate::strategy::test_support::*;

    #[tokio::test]
    async fn test_response_is_not_cached() {
        let network = MockNetwork::new();
        network.respond("https://app.test/api/symptoms", 201, "created");
        let (ctx, store) = context(network);
        let request = FetchRequest::new(Method::Post, "https://app.test/api/symptoms")
            .unwrap()
            .with_body("{}");

        let response = network_only(&ctx, &request).await.unwrap();

        assert_eq!(response.status, 201);
        for name in NamespaceName::ALL {
            assert_eq!(store.entry_count(&ns(name)).await.unwrap(), 0);
        }
        assert_eq!(ctx.metrics.snapshot().passthrough, 1);
    }

    #[tokio::test]
    async fn test_failure_is_propagated() {
        let network = MockNetwork::new();
        network.fail("https://app.test/api/symptoms");
        let (ctx, _store) = context(network);
        let request = FetchRequest::new(Method::Post, "https://app.test/api/symptoms").unwrap();

        let err = network_only(&ctx, &request).await.unwrap_err();
        assert!(err.is_offline());
    }
}

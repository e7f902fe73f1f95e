//! Network Client
//!
//! Performs outbound fetches. Strategies only see the [`NetworkClient`]
//! trait, so transport details stay behind this module.

mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use client::{is_hop_by_hop, HttpNetworkClient, NetworkConfig};

use crate::error::Result;
use crate::http::{FetchRequest, FetchResponse};
use async_trait::async_trait;
use std::sync::Arc;

/// Port for outbound network access
///
/// `Ok` carries any HTTP response, including non-2xx ones. `Err` is reserved
/// for transport failures (DNS, connection, client-side timeout).
#[async_trait]
pub trait NetworkClient: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// Type alias for a shared network client
pub type NetworkClientRef = Arc<dyn NetworkClient>;

//! Scripted network client for tests

use crate::error::{Error, Result};
use crate::http::{FetchRequest, FetchResponse};
use crate::network::NetworkClient;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum MockRoute {
    Respond {
        response: FetchResponse,
        delay: Duration,
    },
    Fail {
        delay: Duration,
    },
}

/// Network client answering from a per-URL script; unknown URLs fail
#[derive(Default)]
pub(crate) struct MockNetwork {
    routes: DashMap<String, MockRoute>,
    calls: DashMap<String, usize>,
    total: AtomicUsize,
    requests: Mutex<Vec<FetchRequest>>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.respond_after(url, status, body, Duration::ZERO);
    }

    pub fn respond_after(&self, url: &str, status: u16, body: &str, delay: Duration) {
        self.respond_with(url, FetchResponse::new(status, body.to_string()), delay);
    }

    pub fn respond_with(&self, url: &str, response: FetchResponse, delay: Duration) {
        self.routes
            .insert(url.to_string(), MockRoute::Respond { response, delay });
    }

    pub fn fail(&self, url: &str) {
        self.fail_after(url, Duration::ZERO);
    }

    pub fn fail_after(&self, url: &str, delay: Duration) {
        self.routes.insert(url.to_string(), MockRoute::Fail { delay });
    }

    /// Number of fetches issued for a URL
    pub fn calls(&self, url: &str) -> usize {
        self.calls.get(url).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl NetworkClient for MockNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let url = request.url.as_str().to_string();
        *self.calls.entry(url.clone()).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let route = self.routes.get(&url).map(|r| r.value().clone());
        match route {
            Some(MockRoute::Respond { response, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(response)
            }
            Some(MockRoute::Fail { delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Err(Error::network(url, "connection refused"))
            }
            None => Err(Error::network(url, "no route scripted")),
        }
    }
}

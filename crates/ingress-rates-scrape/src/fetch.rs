//! Fetch orchestration: pulls raw exposition text from every fleet member.
//!
//! Each endpoint is fetched on its own task with its own timeout. A failing
//! endpoint is recorded in [`FetchOutcome::failures`] and never cancels its
//! siblings, so one cycle costs roughly the latency of the slowest member.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::BodyExt;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use ingress_rates_core::EndpointId;

use crate::discovery::{BoxFuture, Discovery, Endpoint};
use crate::error::ScrapeError;

/// An endpoint that produced no body this cycle.
#[derive(Debug)]
pub struct FetchFailure {
    pub endpoint: EndpointId,
    pub error: ScrapeError,
}

/// Result of one fan-out: bodies of the members that answered, plus the
/// members that did not.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub bodies: HashMap<EndpointId, String>,
    pub failures: Vec<FetchFailure>,
    /// Members known to discovery this cycle.
    pub discovered: usize,
}

impl FetchOutcome {
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

/// Anything that can produce one cycle's worth of raw exposition text.
pub trait Scrape: Send + Sync {
    fn fetch_all(&self) -> BoxFuture<'_, FetchOutcome>;
}

/// HTTP/1 GET of an exposition path.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    path: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// Fetch one endpoint's body, bounded by the fetch timeout.
    pub async fn fetch(&self, endpoint: &Endpoint) -> Result<String, ScrapeError> {
        match tokio::time::timeout(self.timeout, self.fetch_inner(endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::Timeout(self.timeout)),
        }
    }

    async fn fetch_inner(&self, endpoint: &Endpoint) -> Result<String, ScrapeError> {
        let authority = endpoint.authority.as_str();
        let stream = tokio::net::TcpStream::connect(authority)
            .await
            .map_err(|e| ScrapeError::Connect {
                authority: authority.to_string(),
                reason: e.to_string(),
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ScrapeError::Handshake(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(self.path.as_str())
            .header("host", authority)
            .header("accept", "text/plain")
            .header("user-agent", "ingress-rates/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| ScrapeError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ScrapeError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ScrapeError::Status(resp.status().as_u16()));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ScrapeError::Body(e.to_string()))?
            .to_bytes();

        String::from_utf8(body.to_vec()).map_err(|e| ScrapeError::Body(e.to_string()))
    }
}

/// Discovers the fleet and fetches every member concurrently.
pub struct FleetScraper {
    discovery: Box<dyn Discovery>,
    fetcher: Arc<HttpFetcher>,
}

impl FleetScraper {
    pub fn new(discovery: Box<dyn Discovery>, fetcher: HttpFetcher) -> Self {
        Self {
            discovery,
            fetcher: Arc::new(fetcher),
        }
    }

    async fn fetch_fleet(&self) -> FetchOutcome {
        let endpoints = match self.discovery.discover().await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!(error = %e, "fleet discovery failed; cycle has no data");
                return FetchOutcome::default();
            }
        };

        let mut outcome = FetchOutcome {
            discovered: endpoints.len(),
            ..FetchOutcome::default()
        };

        let mut tasks = JoinSet::new();
        for endpoint in endpoints {
            let fetcher = self.fetcher.clone();
            tasks.spawn(async move {
                let result = fetcher.fetch(&endpoint).await;
                (endpoint.id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(body))) => {
                    debug!(endpoint = %id, bytes = body.len(), "fetched exposition");
                    outcome.bodies.insert(id, body);
                }
                Ok((id, Err(e))) => {
                    warn!(endpoint = %id, error = %e, "fetch failed");
                    outcome.failures.push(FetchFailure {
                        endpoint: id,
                        error: e,
                    });
                }
                Err(e) => error!(error = %e, "fetch task panicked"),
            }
        }

        outcome
    }
}

impl Scrape for FleetScraper {
    fn fetch_all(&self) -> BoxFuture<'_, FetchOutcome> {
        Box::pin(self.fetch_fleet())
    }
}

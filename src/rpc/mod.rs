//! RPC endpoint pool.
//!
//! Owns the ordered request-endpoint list and the push-endpoint list from
//! configuration. Providers are constructed per use and never cached across a
//! rotation, so no component can hold a binding to a dead endpoint.

pub mod contracts;
pub mod push;

use alloy::providers::{Provider, RootProvider};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use url::Url;

use crate::error::{SentinelError, SentinelResult};

/// Concrete provider type used throughout the crate.
pub type HttpProvider = RootProvider;

/// Base delay of the rotation retry schedule.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
/// Cap of the rotation retry schedule.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);
/// Per-endpoint budget when racing for the fastest endpoint.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Health snapshot served by `/api/health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcHealth {
    pub http_endpoint: String,
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub wss_endpoint: String,
    pub push_connected: bool,
}

/// Ordered pool of request endpoints plus the push-endpoint list.
pub struct RpcPool {
    http: Vec<String>,
    wss: Vec<String>,
    active: AtomicUsize,
    push_connected: Arc<AtomicBool>,
}

impl RpcPool {
    pub fn new(http: Vec<String>, wss: Vec<String>) -> SentinelResult<Self> {
        if http.is_empty() {
            return Err(SentinelError::Config(
                "rpc pool needs at least one http endpoint".to_string(),
            ));
        }
        if wss.is_empty() {
            return Err(SentinelError::Config(
                "rpc pool needs at least one wss endpoint".to_string(),
            ));
        }
        // Fail fast on unparsable URLs rather than at first use.
        for url in http.iter().chain(wss.iter()) {
            url.parse::<Url>()
                .map_err(|e| SentinelError::Config(format!("bad rpc url {}: {}", url, e)))?;
        }
        Ok(Self {
            http,
            wss,
            active: AtomicUsize::new(0),
            push_connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The active request endpoint.
    pub fn current_request_endpoint(&self) -> String {
        self.http[self.active.load(Ordering::SeqCst) % self.http.len()].clone()
    }

    /// Advance the active index, modulo list length.
    pub fn rotate_request(&self) {
        let next = (self.active.load(Ordering::SeqCst) + 1) % self.http.len();
        self.active.store(next, Ordering::SeqCst);
        tracing::warn!(endpoint = %self.http[next], "Rotated to next RPC endpoint");
    }

    /// Push endpoints, in configured order.
    pub fn push_endpoints(&self) -> Vec<String> {
        self.wss.clone()
    }

    /// Shared flag the push clients report their connection state through.
    pub fn push_status(&self) -> Arc<AtomicBool> {
        self.push_connected.clone()
    }

    /// Build a provider bound to the given endpoint.
    fn provider_for(&self, endpoint: &str) -> SentinelResult<HttpProvider> {
        let url: Url = endpoint
            .parse()
            .map_err(|e| SentinelError::rpc(endpoint, format!("bad url: {}", e)))?;
        Ok(RootProvider::new_http(url))
    }

    /// Execute `op` under the rotation retry discipline.
    ///
    /// `max_attempts` equals the endpoint count; each retry rotates to the
    /// next endpoint. The closure receives a fresh provider and the endpoint
    /// it is bound to, and must not retain either across calls.
    pub async fn call<T, F, Fut>(&self, label: &str, op: F) -> SentinelResult<T>
    where
        F: Fn(HttpProvider, String) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        let attempts = self.http.len();
        let mut delay = RETRY_BASE_DELAY;
        let mut last_err: Option<SentinelError> = None;

        for attempt in 0..attempts {
            let endpoint = self.current_request_endpoint();
            let result = match self.provider_for(&endpoint) {
                Ok(provider) => op(provider, endpoint.clone()).await,
                Err(e) => Err(anyhow::anyhow!(e)),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(
                        call = label,
                        endpoint = %endpoint,
                        attempt = attempt + 1,
                        error = %e,
                        "RPC call failed"
                    );
                    last_err = Some(SentinelError::rpc(&endpoint, e));
                }
            }
            if attempt + 1 < attempts {
                self.rotate_request();
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(RETRY_MAX_DELAY);
            }
        }

        Err(last_err
            .unwrap_or_else(|| SentinelError::rpc(self.current_request_endpoint(), label)))
    }

    /// Race a block-height probe across every endpoint and activate the
    /// lowest-latency one.
    pub async fn select_fastest(&self) {
        let probes = self.http.iter().enumerate().map(|(idx, endpoint)| {
            let endpoint = endpoint.clone();
            let provider = self.provider_for(&endpoint);
            async move {
                let provider = provider.ok()?;
                let started = Instant::now();
                match timeout(PROBE_TIMEOUT, provider.get_block_number()).await {
                    Ok(Ok(_)) => Some((idx, started.elapsed())),
                    _ => None,
                }
            }
        });
        let results = futures_util::future::join_all(probes).await;
        let best = results.into_iter().flatten().min_by_key(|(_, lat)| *lat);
        match best {
            Some((idx, latency)) => {
                self.active.store(idx, Ordering::SeqCst);
                tracing::info!(
                    endpoint = %self.http[idx],
                    latency_ms = latency.as_millis() as u64,
                    "Selected fastest RPC endpoint"
                );
            }
            None => {
                tracing::warn!("No RPC endpoint answered the latency probe; keeping current");
            }
        }
    }

    /// Measure a single call on the current endpoint and report push state.
    pub async fn health_snapshot(&self) -> RpcHealth {
        let endpoint = self.current_request_endpoint();
        let latency = match self.provider_for(&endpoint) {
            Ok(provider) => {
                let started = Instant::now();
                match timeout(PROBE_TIMEOUT, provider.get_block_number()).await {
                    Ok(Ok(_)) => Some(started.elapsed().as_millis() as u64),
                    _ => None,
                }
            }
            Err(_) => None,
        };
        RpcHealth {
            http_endpoint: endpoint,
            healthy: latency.is_some(),
            latency_ms: latency,
            wss_endpoint: self.wss[0].clone(),
            push_connected: self.push_connected.load(Ordering::SeqCst),
        }
    }

    /// Tear down. Providers are per-call, so there is nothing cached to drop;
    /// push clients are destroyed by their owning monitors.
    pub fn shutdown(&self) {
        tracing::info!("RPC pool shut down");
    }
}

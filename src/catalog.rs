//! Off-chain project catalog client.
//!
//! Paged REST client for the launch catalog plus the project selection
//! policy. All operations are idempotent reads; the upcoming-launch
//! aggregation is cached and single-flighted so concurrent callers share one
//! in-flight request.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::VirtualsConfig;
use crate::error::{SentinelError, SentinelResult};
use crate::models::{Factory, PoolKind, Project, ProjectStatus, SelectedProject};

/// Page size used by paged-exhaustive listings.
const EXHAUSTIVE_PAGE_SIZE: u32 = 100;
/// TTL of the upcoming-launch cache.
const UPCOMING_CACHE_TTL: Duration = Duration::from_secs(30);
/// Upcoming launches further out than this are ignored.
const UPCOMING_HORIZON_DAYS: i64 = 10;
/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Retry delays after the first failed attempt.
const RETRY_DELAYS: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(10)];
/// Consecutive discovery failures tolerated before giving up.
const MAX_DISCOVERY_FAILURES: u32 = 10;

/// Catalog sort orders used by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    CreatedAtDesc,
    LpCreatedAtDesc,
    LaunchedAtDesc,
}

impl Sort {
    pub fn as_query(&self) -> &'static str {
        match self {
            Sort::CreatedAtDesc => "createdAt:desc",
            Sort::LpCreatedAtDesc => "lpCreatedAt:desc",
            Sort::LaunchedAtDesc => "launchedAt:desc",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub page_count: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct Meta {
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
    #[serde(default)]
    meta: Meta,
}

/// One page of catalog projects.
#[derive(Debug, Clone)]
pub struct ProjectPage {
    pub items: Vec<Project>,
    pub pagination: Pagination,
}

struct UpcomingCache {
    fetched_at: Option<Instant>,
    items: Vec<Project>,
}

/// REST client for the project catalog.
pub struct CatalogClient {
    base: String,
    client: reqwest::Client,
    poll_interval: Duration,
    tax_window: ChronoDuration,
    preferred_ticker: Option<String>,
    upcoming: tokio::sync::Mutex<UpcomingCache>,
}

impl CatalogClient {
    pub fn new(virtuals: &VirtualsConfig, tax_window: ChronoDuration) -> SentinelResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SentinelError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            base: virtuals.api_base.trim_end_matches('/').to_string(),
            client,
            poll_interval: virtuals.poll_interval(),
            tax_window,
            preferred_ticker: virtuals.preferred_ticker.clone(),
            upcoming: tokio::sync::Mutex::new(UpcomingCache {
                fetched_at: None,
                items: Vec::new(),
            }),
        })
    }

    /// GET with retry. Network errors and 5xx responses are retried up to
    /// three attempts; 4xx responses are returned immediately.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> SentinelResult<T> {
        let mut last: Option<SentinelError> = None;
        for attempt in 0..=RETRY_DELAYS.len() {
            if attempt > 0 {
                tokio::time::sleep(RETRY_DELAYS[attempt - 1]).await;
            }
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .map_err(|e| SentinelError::api(status.as_u16(), url, e));
                    }
                    let err = SentinelError::api(status.as_u16(), url, "catalog request failed");
                    if status.is_client_error() {
                        return Err(err);
                    }
                    tracing::warn!(url, status = status.as_u16(), attempt, "Catalog request failed");
                    last = Some(err);
                }
                Err(e) => {
                    tracing::warn!(url, error = %e, attempt, "Catalog request error");
                    last = Some(SentinelError::from(e));
                }
            }
        }
        Err(last.unwrap_or_else(|| SentinelError::api(0, url, "catalog request failed")))
    }

    /// One page for a given sort order.
    pub async fn list_by_sort(
        &self,
        sort: Sort,
        page: u32,
        page_size: u32,
    ) -> SentinelResult<ProjectPage> {
        let url = format!(
            "{}/api/virtuals?sort[0]={}&pagination[page]={}&pagination[pageSize]={}",
            self.base,
            sort.as_query(),
            page,
            page_size
        );
        let envelope: Envelope<Vec<Project>> = self.get_json(&url).await?;
        Ok(ProjectPage {
            items: envelope.data,
            pagination: envelope.meta.pagination,
        })
    }

    /// One page filtered to a factory tag.
    pub async fn list_by_factory(
        &self,
        factory: Factory,
        page: u32,
        page_size: u32,
    ) -> SentinelResult<ProjectPage> {
        let url = format!(
            "{}/api/virtuals?filters[factory]={}&pagination[page]={}&pagination[pageSize]={}",
            self.base,
            factory.as_query(),
            page,
            page_size
        );
        let envelope: Envelope<Vec<Project>> = self.get_json(&url).await?;
        Ok(ProjectPage {
            items: envelope.data,
            pagination: envelope.meta.pagination,
        })
    }

    /// Every project of one factory, iterating until `pageCount` is reached.
    pub async fn list_all_by_factory(&self, factory: Factory) -> SentinelResult<Vec<Project>> {
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let result = self
                .list_by_factory(factory, page, EXHAUSTIVE_PAGE_SIZE)
                .await?;
            all.extend(result.items);
            if page >= result.pagination.page_count.max(1) {
                break;
            }
            page += 1;
        }
        Ok(all)
    }

    /// Single-resource lookup; a 404 is "none".
    pub async fn by_id(&self, id: u64) -> SentinelResult<Option<Project>> {
        let url = format!("{}/api/virtuals/{}", self.base, id);
        match self.get_json::<Envelope<Project>>(&url).await {
            Ok(envelope) => Ok(Some(envelope.data)),
            Err(SentinelError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Upcoming launches across the curve factories, cached for 30 s.
    ///
    /// The mutex is held across the fetch, which both guards the cache and
    /// single-flights concurrent callers onto one request.
    pub async fn upcoming_launches(&self) -> SentinelResult<Vec<Project>> {
        let mut cache = self.upcoming.lock().await;
        if let Some(at) = cache.fetched_at {
            if at.elapsed() < UPCOMING_CACHE_TTL {
                return Ok(cache.items.clone());
            }
        }

        let fetches = Factory::UPCOMING.map(|f| self.list_all_by_factory(f));
        let results = futures_util::future::join_all(fetches).await;
        let mut merged: Vec<Project> = Vec::new();
        let mut failed = 0usize;
        for result in results {
            match result {
                Ok(items) => merge_by_id(&mut merged, items),
                Err(e) => {
                    tracing::warn!(error = %e, "Upcoming-launch factory fetch failed");
                    failed += 1;
                }
            }
        }
        if failed == Factory::UPCOMING.len() {
            return Err(SentinelError::Generic(
                "all upcoming-launch fetches failed".to_string(),
            ));
        }

        let now = Utc::now();
        let horizon = now + ChronoDuration::days(UPCOMING_HORIZON_DAYS);
        let mut upcoming: Vec<Project> = merged
            .into_iter()
            .filter(|p| {
                p.status == ProjectStatus::Initialized
                    && p.pre_token_pair.is_some()
                    && p.lp_created_at.is_none()
                    && p.launched_at.map_or(false, |t| t >= now && t <= horizon)
            })
            .collect();
        upcoming.sort_by_key(|p| p.launched_at);

        cache.items = upcoming.clone();
        cache.fetched_at = Some(Instant::now());
        Ok(upcoming)
    }

    /// Poll the catalog until the selection policy picks a project.
    ///
    /// Per iteration exactly one of three things happens: a selection is
    /// returned, the loop sleeps and retries, or — after ten consecutive
    /// fetch failures — a fatal error is returned. `Ok(None)` means the
    /// cancellation token fired.
    pub async fn discover_project(
        &self,
        cancel: &CancellationToken,
    ) -> SentinelResult<Option<SelectedProject>> {
        let mut failures = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            let (created, launched) = tokio::join!(
                self.list_by_sort(Sort::CreatedAtDesc, 1, 50),
                self.list_by_sort(Sort::LaunchedAtDesc, 1, 50),
            );

            let mut candidates: Vec<Project> = Vec::new();
            let mut any_ok = false;
            for result in [created, launched] {
                match result {
                    Ok(page) => {
                        any_ok = true;
                        merge_by_id(&mut candidates, page.items);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Discovery fetch failed");
                    }
                }
            }

            if any_ok {
                failures = 0;
                if let Some(selected) = select_project(
                    &candidates,
                    Utc::now(),
                    self.tax_window,
                    self.preferred_ticker.as_deref(),
                ) {
                    tracing::info!(
                        project = %selected.project.name,
                        symbol = %selected.project.symbol,
                        pool = %selected.pool,
                        t0 = %selected.t0,
                        "Selected project"
                    );
                    return Ok(Some(selected));
                }
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            } else {
                failures += 1;
                if failures >= MAX_DISCOVERY_FAILURES {
                    return Err(SentinelError::Generic(format!(
                        "catalog unreachable: {} consecutive discovery failures",
                        failures
                    )));
                }
                let backoff =
                    Duration::from_secs(1u64 << failures.min(5)).min(Duration::from_secs(30));
                tracing::warn!(failures, backoff_secs = backoff.as_secs(), "Discovery backing off");
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }
}

/// Merge `incoming` into `merged`, keeping the first occurrence of each id.
fn merge_by_id(merged: &mut Vec<Project>, incoming: Vec<Project>) {
    for project in incoming {
        if !merged.iter().any(|p| p.id == project.id) {
            merged.push(project);
        }
    }
}

/// Derive the pool the monitors attach to.
fn derive_pool(project: &Project) -> Option<(alloy::primitives::Address, PoolKind)> {
    if let Some(lp) = project.lp_address {
        return Some((lp, PoolKind::AmmV2));
    }
    project.pre_token_pair.map(|pre| (pre, PoolKind::Curve))
}

/// The selection policy.
///
/// Deterministic: identical candidate sets always yield the same choice.
pub fn select_project(
    candidates: &[Project],
    now: DateTime<Utc>,
    tax_window: ChronoDuration,
    preferred_ticker: Option<&str>,
) -> Option<SelectedProject> {
    let mut eligible: Vec<&Project> = candidates
        .iter()
        .filter(|p| {
            p.status == ProjectStatus::Undergrad
                && p.pre_token_pair.is_some()
                && p.lp_address.is_none()
                && p.anchor_t0().timestamp() > 0
        })
        .collect();
    if eligible.is_empty() {
        return None;
    }

    let in_window: Vec<&Project> = eligible
        .iter()
        .copied()
        .filter(|p| {
            let t0 = p.anchor_t0();
            now >= t0 && now <= t0 + tax_window
        })
        .collect();
    if !in_window.is_empty() {
        eligible = in_window;
    }
    eligible.sort_by(|a, b| b.anchor_t0().cmp(&a.anchor_t0()));

    let chosen = preferred_ticker
        .and_then(|ticker| {
            eligible
                .iter()
                .find(|p| p.symbol.eq_ignore_ascii_case(ticker))
                .copied()
        })
        .or_else(|| eligible.first().copied())?;

    let (pool, pool_kind) = derive_pool(chosen)?;
    Some(SelectedProject {
        project: chosen.clone(),
        pool,
        pool_kind,
        t0: chosen.anchor_t0(),
    })
}

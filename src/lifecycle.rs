//! The five-state lifecycle machine.
//!
//! Single task, sole writer of the lifecycle context. Discovers a project,
//! supervises the monitors through the tax window and the buyback phase,
//! checks for graduation, and retires the run back into discovery.
//!
//! Recoverable faults are logged, notified and ridden out with a short
//! sleep without changing state. Only configuration errors and the
//! catalog giving up terminate the process.

use alloy::primitives::U256;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::catalog::CatalogClient;
use crate::config::AppConfig;
use crate::dashboard::DashboardState;
use crate::error::{SentinelError, SentinelResult};
use crate::handlers::HealthState;
use crate::models::{EventKind, LifecycleContext, Phase, PoolKind};
use crate::monitoring::{BuybackTracker, FdvCalculator, TaxCounters, TaxTracker, WhaleDetector};
use crate::notifications::{CompositeNotifier, NotificationEvent};
use crate::rpc::contracts::format_units;
use crate::rpc::RpcPool;

/// Machine tick.
const TICK: Duration = Duration::from_secs(1);
/// Sleep after a recoverable error.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
/// Health snapshot push cadence, in ticks.
const HEALTH_PUSH_TICKS: u64 = 60;
/// Graduation poll cadence.
const GRADUATION_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Tax refresh cadence inside the launch window.
fn tax_refresh_interval() -> ChronoDuration {
    ChronoDuration::minutes(5)
}

/// Buyback status publish cadence.
fn buyback_publish_interval() -> ChronoDuration {
    ChronoDuration::minutes(10)
}

/// The lifecycle machine. Owns the monitors and the context.
pub struct LifecycleMachine {
    config: Arc<AppConfig>,
    whale_threshold: U256,
    rpc: Arc<RpcPool>,
    catalog: Arc<CatalogClient>,
    dashboard: Arc<DashboardState>,
    notifier: Arc<CompositeNotifier>,
    health: Arc<HealthState>,
    fdv: FdvCalculator,
    cancel: CancellationToken,
    ctx: LifecycleContext,
    tax: Option<TaxTracker>,
    whales: Option<WhaleDetector>,
    buyback: Option<BuybackTracker>,
    /// Latest catalog-reported market cap, the FDV fallback
    catalog_mcap: Option<f64>,
    last_graduation_check: Option<Instant>,
    tick: u64,
}

impl LifecycleMachine {
    pub fn new(
        config: Arc<AppConfig>,
        rpc: Arc<RpcPool>,
        catalog: Arc<CatalogClient>,
        dashboard: Arc<DashboardState>,
        notifier: Arc<CompositeNotifier>,
        health: Arc<HealthState>,
        cancel: CancellationToken,
    ) -> SentinelResult<Self> {
        let whale_threshold = config.thresholds.big_trade_base_units()?;
        Ok(Self {
            fdv: FdvCalculator::new(rpc.clone()),
            config,
            whale_threshold,
            rpc,
            catalog,
            dashboard,
            notifier,
            health,
            cancel,
            ctx: LifecycleContext::new(),
            tax: None,
            whales: None,
            buyback: None,
            catalog_mcap: None,
            last_graduation_check: None,
            tick: 0,
        })
    }

    /// Tick loop. Returns `Err` only for terminal failures; clean shutdown
    /// via cancellation returns `Ok`.
    pub async fn run(mut self) -> SentinelResult<()> {
        tracing::info!("Lifecycle machine started");
        self.dashboard.update_context(&self.ctx);
        self.push_health();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(TICK) => {}
            }
            self.tick += 1;
            let phase_before = self.ctx.phase;

            if let Err(e) = self.step().await {
                // Discovery absorbs its own retries; an error surfacing from
                // it means the catalog gave up. That, and config errors, end
                // the process.
                if phase_before == Phase::Discover || !e.is_recoverable() {
                    tracing::error!(error = %e, phase = %phase_before, "Fatal lifecycle error");
                    self.cleanup();
                    return Err(e);
                }
                tracing::error!(error = %e, phase = %self.ctx.phase, "Monitor error; continuing");
                self.dashboard.emit(
                    EventKind::Error,
                    json!({
                        "phase": self.ctx.phase.as_wire(),
                        "message": e.to_string(),
                    }),
                );
                self.notifier
                    .notify(NotificationEvent::MonitorError {
                        component: self.ctx.phase.as_wire().to_string(),
                        message: e.to_string(),
                    })
                    .await;
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                }
            }

            if self.tick % HEALTH_PUSH_TICKS == 0 {
                self.push_health();
            }
        }

        self.cleanup();
        Ok(())
    }

    async fn step(&mut self) -> SentinelResult<()> {
        match self.ctx.phase {
            Phase::Discover => self.step_discover().await,
            Phase::WaitT0 => self.step_wait_t0().await,
            Phase::LaunchWindow => self.step_launch_window().await,
            Phase::BuybackPhase => self.step_buyback().await,
            Phase::Done => self.step_done().await,
        }
    }

    /// Transitions are the only way to change phase; every one refreshes the
    /// dashboard snapshot and the health probe.
    fn transition(&mut self, next: Phase) {
        debug_assert!(
            self.ctx.phase.can_transition_to(next),
            "illegal transition {} -> {}",
            self.ctx.phase,
            next
        );
        tracing::info!(from = %self.ctx.phase, to = %next, "Phase transition");
        self.ctx.phase = next;
        self.dashboard.update_context(&self.ctx);
        self.push_health();
    }

    fn push_health(&self) {
        self.health.update(json!({
            "state": self.ctx.phase.as_wire(),
            "project": self.ctx.selected.as_ref().map(|s| s.project.name.clone()),
            "taxTotal": self.ctx.tax_total.to_string(),
            "tick": self.tick,
        }));
    }

    /// `discover`: block on the catalog until a candidate is selected.
    async fn step_discover(&mut self) -> SentinelResult<()> {
        self.ctx.reset();
        self.catalog_mcap = None;
        self.last_graduation_check = None;
        self.dashboard.update_context(&self.ctx);

        let Some(selected) = self.catalog.discover_project(&self.cancel).await? else {
            return Ok(()); // cancelled
        };

        self.catalog_mcap = selected.project.mcap_in_virtual;
        self.ctx.t0 = Some(selected.t0);
        self.ctx.t1 = Some(selected.t0 + self.config.thresholds.tax_window());
        self.ctx.selected = Some(selected.clone());

        self.dashboard.emit(
            EventKind::ProjectStart,
            json!({
                "name": selected.project.name,
                "symbol": selected.project.symbol,
                "t0": selected.t0,
                "t1": self.ctx.t1,
            }),
        );
        self.notifier
            .notify(NotificationEvent::ProjectStarted {
                name: selected.project.name.clone(),
                symbol: selected.project.symbol.clone(),
                t0: selected.t0,
                t1: self.ctx.t1.unwrap_or(selected.t0),
            })
            .await;

        self.transition(Phase::WaitT0);
        Ok(())
    }

    /// `wait_t0`: bring up the tax tracker and the whale detector. Retried
    /// whole on failure; each monitor only initialises once.
    async fn step_wait_t0(&mut self) -> SentinelResult<()> {
        let selected = self
            .ctx
            .selected
            .clone()
            .ok_or_else(|| SentinelError::Generic("no selected project in WAIT_T0".to_string()))?;

        if self.tax.is_none() {
            let mut tracker = TaxTracker::new(
                self.rpc.clone(),
                self.config.addresses.virtual_token,
                self.config.addresses.buyback_addr,
            );
            tracker.init(selected.t0).await?;
            self.ctx.start_balance = tracker.counters().start_balance;
            self.tax = Some(tracker);
            self.dashboard.update_context(&self.ctx);
        }

        if self.whales.is_none() {
            let detector = WhaleDetector::start(
                &self.rpc,
                self.rpc.push_endpoints(),
                self.rpc.push_status(),
                &selected,
                self.config.addresses.virtual_token,
                self.whale_threshold,
                self.dashboard.clone(),
            )
            .await?;
            self.whales = Some(detector);
        }

        self.transition(Phase::LaunchWindow);
        Ok(())
    }

    /// `launch_window`: periodic tax refresh, FDV refresh, graduation polls;
    /// closes the window at T1.
    async fn step_launch_window(&mut self) -> SentinelResult<()> {
        let now = Utc::now();
        let t1 = self
            .ctx
            .t1
            .ok_or_else(|| SentinelError::Generic("no T1 in LAUNCH_WINDOW".to_string()))?;

        if now >= t1 {
            let counters = self.refresh_tax().await?;
            self.ctx.tax_total = counters.net_inflow();
            self.dashboard
                .update_tax(&counters, self.ctx.elapsed_minutes(now));
            tracing::info!(
                tax_total = %format_units(self.ctx.tax_total, 18),
                "Tax window closed"
            );
            self.transition(Phase::BuybackPhase);
            self.start_buyback();
            return Ok(());
        }

        if interval_due(self.ctx.last_tax_refresh, now, tax_refresh_interval()) {
            let counters = self.refresh_tax().await?;
            self.ctx.tax_total = counters.net_inflow();
            self.ctx.last_tax_refresh = Some(now);
            let elapsed = self.ctx.elapsed_minutes(now);
            self.dashboard.update_tax(&counters, elapsed);
            self.dashboard.update_context(&self.ctx);
            self.notifier
                .notify(NotificationEvent::TaxUpdate {
                    net_inflow: format_units(counters.net_inflow(), 18),
                    elapsed_minutes: elapsed,
                    remaining_minutes: self.ctx.remaining_minutes(now),
                })
                .await;
        }

        self.refresh_fdv().await;
        self.check_graduation().await?;
        Ok(())
    }

    /// `buyback_phase`: watch the spend ledger until the budget is spent or
    /// the project graduates.
    async fn step_buyback(&mut self) -> SentinelResult<()> {
        let now = Utc::now();
        let (status, complete, stall) = {
            let tracker = self.buyback.as_ref().ok_or_else(|| {
                SentinelError::Generic("no buyback tracker in BUYBACK_PHASE".to_string())
            })?;
            (
                tracker.status(now),
                tracker.is_complete(),
                tracker.check_stall(now),
            )
        };

        // Keep the snapshot warm every tick; broadcast on the publish cadence.
        self.dashboard.set_buyback(status.clone());

        if complete {
            tracing::info!(
                spent = %format_units(status.spent_total, 18),
                "Buyback complete"
            );
            self.transition(Phase::Done);
            return Ok(());
        }

        if let Some(idle) = stall {
            let idle_minutes = idle.num_minutes();
            tracing::warn!(idle_minutes, "Buyback stalled");
            self.dashboard.emit(
                EventKind::Error,
                json!({
                    "component": "buyback",
                    "message": format!("no spend for {} minutes", idle_minutes),
                }),
            );
            self.notifier
                .notify(NotificationEvent::BuybackStalled { idle_minutes })
                .await;
        }

        if interval_due(self.ctx.last_buyback_refresh, now, buyback_publish_interval()) {
            self.ctx.last_buyback_refresh = Some(now);
            self.dashboard.update_buyback(status.clone());
            self.notifier
                .notify(NotificationEvent::BuybackUpdate {
                    spent: format_units(status.spent_total, 18),
                    progress: status.progress,
                    eta_hours: status.eta_hours,
                })
                .await;
        }

        self.check_graduation().await?;
        Ok(())
    }

    /// `done`: publish completion, tear everything down, restart discovery.
    async fn step_done(&mut self) -> SentinelResult<()> {
        let name = self
            .ctx
            .selected
            .as_ref()
            .map(|s| s.project.name.clone())
            .unwrap_or_default();
        let spent_total = self
            .buyback
            .as_ref()
            .map(|b| b.spent_total())
            .unwrap_or(U256::ZERO);

        self.dashboard.emit(
            EventKind::ProjectComplete,
            json!({
                "name": name,
                "taxTotal": self.ctx.tax_total.to_string(),
                "spentTotal": spent_total.to_string(),
            }),
        );
        self.notifier
            .notify(NotificationEvent::ProjectCompleted {
                name,
                tax_total: format_units(self.ctx.tax_total, 18),
                spent_total: format_units(spent_total, 18),
            })
            .await;

        self.teardown_monitors();
        self.ctx.reset();
        self.transition(Phase::Discover);
        Ok(())
    }

    /// Catch-up then regular tax update.
    async fn refresh_tax(&mut self) -> SentinelResult<TaxCounters> {
        let tracker = self
            .tax
            .as_mut()
            .ok_or_else(|| SentinelError::Generic("tax tracker not initialised".to_string()))?;
        tracker.catch_up().await?;
        tracker.update().await
    }

    /// Best-effort FDV refresh: on-chain preferred, catalog estimate as
    /// fallback.
    async fn refresh_fdv(&mut self) {
        let Some(selected) = self.ctx.selected.as_ref() else {
            return;
        };
        if selected.pool_kind != PoolKind::Curve {
            return;
        }
        let pool = selected.pool;
        let hint = selected.project.token_address;
        match self.fdv.compute_curve_fdv(pool, hint).await {
            Some(snapshot) => self.dashboard.update_onchain_fdv(Some(snapshot)),
            None => {
                self.dashboard.update_onchain_fdv(None);
                if let Some(mcap) = self.catalog_mcap {
                    let estimate = self.fdv.from_catalog_mcap(mcap).await;
                    self.dashboard.update_api_fdv(Some(estimate));
                }
            }
        }
    }

    /// Poll the catalog for graduation once a minute. Returns true when the
    /// machine transitioned to `done`.
    async fn check_graduation(&mut self) -> SentinelResult<bool> {
        let due = self
            .last_graduation_check
            .map_or(true, |at| at.elapsed() >= GRADUATION_CHECK_INTERVAL);
        if !due {
            return Ok(false);
        }
        self.last_graduation_check = Some(Instant::now());

        let Some(id) = self.ctx.selected.as_ref().map(|s| s.project.id) else {
            return Ok(false);
        };
        if let Some(project) = self.catalog.by_id(id).await? {
            self.catalog_mcap = project.mcap_in_virtual.or(self.catalog_mcap);
            if project.is_graduated() {
                tracing::info!(project = %project.name, "Project graduated");
                self.transition(Phase::Done);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn start_buyback(&mut self) {
        let tracker = BuybackTracker::start(
            self.rpc.push_endpoints(),
            self.rpc.push_status(),
            self.config.addresses.virtual_token,
            self.config.addresses.buyback_addr,
            self.ctx.tax_total,
            self.config.thresholds.rate_window(),
            self.config.thresholds.stall_alert(),
        );
        self.dashboard.set_buyback(tracker.status(Utc::now()));
        self.buyback = Some(tracker);
    }

    /// Destroy monitors; their push clients stop reconnecting immediately.
    fn teardown_monitors(&mut self) {
        if let Some(detector) = self.whales.take() {
            detector.destroy();
        }
        if let Some(tracker) = self.buyback.take() {
            tracker.destroy();
        }
        self.tax = None;
    }

    fn cleanup(&mut self) {
        self.teardown_monitors();
        self.push_health();
        self.rpc.shutdown();
        tracing::info!("Lifecycle machine stopped");
    }
}

fn interval_due(
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: ChronoDuration,
) -> bool {
    match last {
        None => true,
        Some(last) => now - last >= interval,
    }
}

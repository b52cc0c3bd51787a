//! Dashboard state: the snapshot REST reads and the event fan-out the push
//! socket streams.
//!
//! Ring buffers hold the last 100 trades and the last 100 typed events,
//! newest first. Broadcasts go through a bounded channel; a client that falls
//! behind is resynced by the socket handler rather than stalling the loop.

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::collections::VecDeque;
use tokio::sync::broadcast;

use crate::models::{serde_amount, Event, EventKind, LifecycleContext, Phase, SelectedProject, WhaleTrade};
use crate::monitoring::{BuybackStatus, FdvSnapshot, TaxCounters};

/// Ring capacity for both trades and events.
const RING_CAPACITY: usize = 100;
/// Broadcast channel capacity; laggards are resynced, not waited on.
const BROADCAST_CAPACITY: usize = 256;

/// Tax numbers served inside `/api/state`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxView {
    #[serde(with = "serde_amount")]
    pub net_inflow: U256,
    #[serde(with = "serde_amount")]
    pub balance_diff: U256,
}

struct Inner {
    phase: Phase,
    selected: Option<SelectedProject>,
    t0: Option<DateTime<Utc>>,
    t1: Option<DateTime<Utc>>,
    tax_total: U256,
    start_balance: Option<U256>,
    tax: Option<TaxView>,
    buyback: Option<BuybackStatus>,
    onchain_fdv: Option<FdvSnapshot>,
    api_fdv: Option<FdvSnapshot>,
    trades: VecDeque<WhaleTrade>,
    events: VecDeque<Event>,
}

/// Shared dashboard state.
pub struct DashboardState {
    inner: RwLock<Inner>,
    tx: broadcast::Sender<Event>,
}

impl DashboardState {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: RwLock::new(Inner {
                phase: Phase::Discover,
                selected: None,
                t0: None,
                t1: None,
                tax_total: U256::ZERO,
                start_balance: None,
                tax: None,
                buyback: None,
                onchain_fdv: None,
                api_fdv: None,
                trades: VecDeque::with_capacity(RING_CAPACITY),
                events: VecDeque::with_capacity(RING_CAPACITY),
            }),
            tx,
        }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Record an event in the ring and broadcast it.
    pub fn emit(&self, kind: EventKind, payload: impl Serialize) {
        let event = Event::new(kind, payload);
        {
            let mut inner = self.inner.write();
            inner.events.push_front(event.clone());
            inner.events.truncate(RING_CAPACITY);
        }
        // Send errors only mean there are no subscribers.
        let _ = self.tx.send(event);
    }

    /// Sync the snapshot with the lifecycle context. Broadcasts a
    /// `state_change` only when the phase actually changed, so repeated calls
    /// with the same context are idempotent.
    pub fn update_context(&self, ctx: &LifecycleContext) {
        let changed = {
            let mut inner = self.inner.write();
            let changed = inner.phase != ctx.phase;
            inner.phase = ctx.phase;
            inner.selected = ctx.selected.clone();
            inner.t0 = ctx.t0;
            inner.t1 = ctx.t1;
            inner.tax_total = ctx.tax_total;
            inner.start_balance = ctx.start_balance;
            if ctx.selected.is_none() {
                inner.tax = None;
                inner.buyback = None;
                inner.onchain_fdv = None;
                inner.api_fdv = None;
            }
            changed
        };
        if changed {
            self.emit(EventKind::StateChange, self.state_json());
        }
    }

    /// Push a whale trade: ring insert (dedup by hash) plus broadcast.
    pub fn record_trade(&self, trade: WhaleTrade) {
        {
            let mut inner = self.inner.write();
            if inner.trades.iter().any(|t| t.tx_hash == trade.tx_hash) {
                return;
            }
            inner.trades.push_front(trade.clone());
            inner.trades.truncate(RING_CAPACITY);
        }
        self.emit(EventKind::WhaleTrade, &trade);
    }

    /// Update tax numbers and broadcast a `tax_update`.
    pub fn update_tax(&self, counters: &TaxCounters, elapsed_minutes: i64) {
        let view = TaxView {
            net_inflow: counters.net_inflow(),
            balance_diff: counters.balance_diff(),
        };
        {
            let mut inner = self.inner.write();
            inner.tax = Some(view.clone());
        }
        self.emit(
            EventKind::TaxUpdate,
            json!({
                "netInflow": view.net_inflow.to_string(),
                "balanceDiff": view.balance_diff.to_string(),
                "elapsedMinutes": elapsed_minutes,
            }),
        );
    }

    /// Refresh the buyback numbers without broadcasting.
    pub fn set_buyback(&self, status: BuybackStatus) {
        self.inner.write().buyback = Some(status);
    }

    /// Refresh the buyback numbers and broadcast a `buyback_update`.
    pub fn update_buyback(&self, status: BuybackStatus) {
        {
            let mut inner = self.inner.write();
            inner.buyback = Some(status.clone());
        }
        self.emit(EventKind::BuybackUpdate, &status);
    }

    /// On-chain FDV takes precedence over catalog estimates in the snapshot.
    pub fn update_onchain_fdv(&self, fdv: Option<FdvSnapshot>) {
        self.inner.write().onchain_fdv = fdv;
    }

    pub fn update_api_fdv(&self, fdv: Option<FdvSnapshot>) {
        self.inner.write().api_fdv = fdv;
    }

    /// Snapshot served by `/api/state` and sent to fresh socket clients.
    pub fn state_json(&self) -> serde_json::Value {
        let inner = self.inner.read();
        let now = Utc::now();
        let elapsed = inner
            .t0
            .map(|t0| (now - t0).num_minutes().max(0))
            .unwrap_or(0);
        let remaining = inner
            .t1
            .map(|t1| (t1 - now).num_minutes().max(0))
            .unwrap_or(0);
        json!({
            "state": inner.phase.as_wire(),
            "project": inner.selected.as_ref().map(|s| &s.project),
            "t0": inner.t0,
            "t1": inner.t1,
            "taxTotal": inner.tax_total.to_string(),
            "startBalance": inner.start_balance.map(|b| b.to_string()),
            "elapsedMinutes": elapsed,
            "remainingMinutes": remaining,
            "onchainFdvVirtual": inner.onchain_fdv.as_ref().map(|f| f.fdv_virtual.clone()),
            "onchainFdvUsd": inner.onchain_fdv.as_ref().and_then(|f| f.fdv_usd.clone()),
            "apiFdvVirtual": inner.api_fdv.as_ref().map(|f| f.fdv_virtual.clone()),
            "apiFdvUsd": inner.api_fdv.as_ref().and_then(|f| f.fdv_usd.clone()),
            "tax": inner.tax.clone(),
            "buyback": inner.buyback.clone(),
        })
    }

    /// Last 100 trades, newest first.
    pub fn trades(&self) -> Vec<WhaleTrade> {
        self.inner.read().trades.iter().cloned().collect()
    }

    /// Last 100 events, newest first.
    pub fn events(&self) -> Vec<Event> {
        self.inner.read().events.iter().cloned().collect()
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

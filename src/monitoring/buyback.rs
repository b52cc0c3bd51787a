//! Spend scanner: tracks the fee receiver spending the collected tax back
//! into the market.
//!
//! A live transfer subscription feeds a sliding-window ledger; the ledger
//! derives spend rate, ETA and stall state. The ledger itself is synchronous
//! and fully deterministic — the push client is only its feed.

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::models::serde_amount;
use crate::rpc::contracts::{
    decode_transfer, log_filter_params, to_display, topic_address, IERC20,
};
use crate::rpc::push::PushClient;

/// Dedup cache size, transaction hashes.
const DEDUP_CAPACITY: usize = 1000;

/// One observed spend.
#[derive(Debug, Clone)]
pub struct SpendRecord {
    pub at: DateTime<Utc>,
    pub amount: U256,
    pub tx_hash: B256,
}

/// Derived buyback state returned by `status()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuybackStatus {
    #[serde(with = "serde_amount")]
    pub spent_total: U256,
    #[serde(with = "serde_amount")]
    pub spent_in_window: U256,
    /// Display units per hour
    pub rate_per_hour: f64,
    #[serde(with = "serde_amount")]
    pub remaining: U256,
    /// Infinite when the window is empty; serialises as null
    pub eta_hours: f64,
    pub progress: f64,
    #[serde(with = "serde_amount::option")]
    pub last_tx_amount: Option<U256>,
}

/// Sliding-window spend ledger.
pub struct SpendLedger {
    budget: U256,
    rate_window: ChronoDuration,
    stall_after: ChronoDuration,
    records: VecDeque<SpendRecord>,
    spent_total: U256,
    last_spend_at: Option<DateTime<Utc>>,
    last_tx_amount: Option<U256>,
    seen: LruCache<B256, ()>,
    stall_alerted: bool,
}

impl SpendLedger {
    pub fn new(budget: U256, rate_window: ChronoDuration, stall_after: ChronoDuration) -> Self {
        Self {
            budget,
            rate_window,
            stall_after,
            records: VecDeque::new(),
            spent_total: U256::ZERO,
            last_spend_at: None,
            last_tx_amount: None,
            seen: LruCache::new(NonZeroUsize::new(DEDUP_CAPACITY).expect("capacity > 0")),
            stall_alerted: false,
        }
    }

    /// Record one spend. Returns false when the hash was already seen.
    pub fn record(&mut self, record: SpendRecord) -> bool {
        if self.seen.put(record.tx_hash, ()).is_some() {
            return false;
        }
        self.spent_total += record.amount;
        self.last_spend_at = Some(record.at);
        self.last_tx_amount = Some(record.amount);
        // A new spend re-arms the stall alert.
        self.stall_alerted = false;
        self.records.push_back(record);
        true
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.rate_window;
        while let Some(front) = self.records.front() {
            if front.at < cutoff {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn status(&mut self, now: DateTime<Utc>) -> BuybackStatus {
        self.prune(now);
        let spent_in_window: U256 = self
            .records
            .iter()
            .fold(U256::ZERO, |acc, r| acc + r.amount);
        let window_secs = self.rate_window.num_seconds().max(1) as f64;
        let rate_per_hour = to_display(spent_in_window) / window_secs * 3600.0;
        let remaining = self.budget.saturating_sub(self.spent_total);
        let eta_hours = if rate_per_hour > 0.0 {
            to_display(remaining) / rate_per_hour
        } else {
            f64::INFINITY
        };
        let progress = if self.budget.is_zero() {
            100.0
        } else {
            (to_display(self.spent_total) / to_display(self.budget) * 100.0).min(100.0)
        };
        BuybackStatus {
            spent_total: self.spent_total,
            spent_in_window,
            rate_per_hour,
            remaining,
            eta_hours,
            progress,
            last_tx_amount: self.last_tx_amount,
        }
    }

    /// Stall check: fires at most once per quiet period. Returns how long the
    /// receiver has been idle when it fires.
    pub fn check_stall(&mut self, now: DateTime<Utc>) -> Option<ChronoDuration> {
        if self.is_complete() || self.stall_alerted {
            return None;
        }
        let last = self.last_spend_at?;
        let idle = now - last;
        if idle > self.stall_after {
            self.stall_alerted = true;
            Some(idle)
        } else {
            None
        }
    }

    pub fn is_complete(&self) -> bool {
        self.spent_total >= self.budget
    }

    pub fn spent_total(&self) -> U256 {
        self.spent_total
    }
}

/// Live buyback tracker: subscription + ledger.
pub struct BuybackTracker {
    ledger: Arc<Mutex<SpendLedger>>,
    push: PushClient,
}

impl BuybackTracker {
    /// Subscribe to outbound transfers from the receiver and start recording.
    pub fn start(
        push_endpoints: Vec<String>,
        push_connected: Arc<AtomicBool>,
        token: Address,
        receiver: Address,
        budget: U256,
        rate_window: ChronoDuration,
        stall_after: ChronoDuration,
    ) -> Self {
        let ledger = Arc::new(Mutex::new(SpendLedger::new(budget, rate_window, stall_after)));
        let push = PushClient::connect(push_endpoints, push_connected);

        let params = log_filter_params(
            token,
            &[
                Some(IERC20::Transfer::SIGNATURE_HASH),
                Some(topic_address(receiver)),
                None,
            ],
        );
        let handler_ledger = ledger.clone();
        push.subscribe_logs(
            "buyback-spends",
            params,
            Arc::new(move |log| {
                let Some(transfer) = decode_transfer(&log) else {
                    return;
                };
                if transfer.from != receiver {
                    return;
                }
                let recorded = handler_ledger.lock().record(SpendRecord {
                    at: Utc::now(),
                    amount: transfer.value,
                    tx_hash: transfer.tx_hash,
                });
                if recorded {
                    tracing::info!(
                        amount = %transfer.value,
                        tx = %transfer.tx_hash,
                        "Buyback spend observed"
                    );
                }
            }),
        );

        tracing::info!(budget = %budget, receiver = %receiver, "Buyback tracker started");
        Self { ledger, push }
    }

    pub fn status(&self, now: DateTime<Utc>) -> BuybackStatus {
        self.ledger.lock().status(now)
    }

    pub fn check_stall(&self, now: DateTime<Utc>) -> Option<ChronoDuration> {
        self.ledger.lock().check_stall(now)
    }

    pub fn is_complete(&self) -> bool {
        self.ledger.lock().is_complete()
    }

    pub fn spent_total(&self) -> U256 {
        self.ledger.lock().spent_total()
    }

    pub fn destroy(&self) {
        self.push.destroy();
    }
}

//! Buyback ledger tests
//!
//! Sliding-window rate, ETA, progress, stall detection and completion.

use alloy::primitives::{B256, U256};
use chrono::{DateTime, Duration, TimeZone, Utc};
use virtuals_sentinel::monitoring::{SpendLedger, SpendRecord};

fn units(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18))
}

fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn ledger(budget: u64) -> SpendLedger {
    SpendLedger::new(units(budget), Duration::minutes(20), Duration::minutes(5))
}

fn spend(at: DateTime<Utc>, amount: u64, key: u8) -> SpendRecord {
    SpendRecord {
        at,
        amount: units(amount),
        tx_hash: B256::with_last_byte(key),
    }
}

#[test]
fn test_eta_scenario_from_spec() {
    // Budget 1000; spends 100 @ t-15m and 50 @ t-5m in a 20-minute window.
    let now = t0();
    let mut ledger = ledger(1000);
    ledger.record(spend(now - Duration::minutes(15), 100, 1));
    ledger.record(spend(now - Duration::minutes(5), 50, 2));

    let status = ledger.status(now);
    assert_eq!(status.spent_in_window, units(150));
    // 150 / 1200s × 3600 = 450 per hour
    assert_eq!(status.rate_per_hour, 450.0);
    assert_eq!(status.remaining, units(850));
    assert!((status.eta_hours - 1.8888888888888888).abs() < 1e-12);
    assert_eq!(status.progress, 15.0);
    assert_eq!(status.last_tx_amount, Some(units(50)));
}

#[test]
fn test_empty_window_has_zero_rate_and_infinite_eta() {
    let mut ledger = ledger(1000);
    let status = ledger.status(t0());
    assert_eq!(status.rate_per_hour, 0.0);
    assert!(status.eta_hours.is_infinite());
}

#[test]
fn test_records_age_out_of_the_window() {
    let now = t0();
    let mut ledger = ledger(1000);
    ledger.record(spend(now - Duration::minutes(25), 300, 1));
    ledger.record(spend(now - Duration::minutes(1), 10, 2));

    let status = ledger.status(now);
    assert_eq!(status.spent_in_window, units(10));
    assert_eq!(status.spent_total, units(310));
}

#[test]
fn test_duplicate_hash_is_recorded_once() {
    let now = t0();
    let mut ledger = ledger(1000);
    assert!(ledger.record(spend(now, 100, 7)));
    assert!(!ledger.record(spend(now, 100, 7)));
    assert_eq!(ledger.status(now).spent_total, units(100));
}

#[test]
fn test_stall_fires_once_then_rearms_on_new_spend() {
    // stallAlert = 5 min; last spend at t-6m.
    let now = t0();
    let mut ledger = ledger(1000);
    ledger.record(spend(now - Duration::minutes(6), 100, 1));

    let first = ledger.check_stall(now);
    assert!(first.is_some());
    assert!(first.unwrap() >= Duration::minutes(6));

    // Still stalled, already alerted: quiet.
    assert!(ledger.check_stall(now + Duration::minutes(3)).is_none());

    // A spend at t re-arms; a second stall at t+6m alerts again.
    ledger.record(spend(now, 25, 2));
    assert!(ledger.check_stall(now + Duration::minutes(1)).is_none());
    assert!(ledger.check_stall(now + Duration::minutes(6)).is_some());
}

#[test]
fn test_completion_stops_stall_checks() {
    let now = t0();
    let mut ledger = ledger(100);
    ledger.record(spend(now - Duration::minutes(30), 100, 1));
    assert!(ledger.is_complete());
    assert!(ledger.check_stall(now).is_none());

    let status = ledger.status(now);
    assert_eq!(status.progress, 100.0);
    assert_eq!(status.remaining, U256::ZERO);
}

#[test]
fn test_progress_caps_at_100_when_overspent() {
    let now = t0();
    let mut ledger = ledger(100);
    ledger.record(spend(now, 250, 1));
    let status = ledger.status(now);
    assert_eq!(status.progress, 100.0);
    assert_eq!(status.remaining, U256::ZERO);
}

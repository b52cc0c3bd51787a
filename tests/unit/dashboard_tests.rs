//! Dashboard fan-out tests
//!
//! Snapshot idempotence, ring behaviour and per-client broadcast ordering.

use alloy::primitives::{Address, B256, U256};
use chrono::Utc;
use serde_json::json;
use virtuals_sentinel::models::EventKind;
use virtuals_sentinel::{DashboardState, LifecycleContext, Phase, TradeSide, WhaleTrade};

fn trade(key: u8, block: u64) -> WhaleTrade {
    WhaleTrade {
        side: TradeSide::Buy,
        amount_virtual: U256::from(2_000u64),
        amount_token: U256::ZERO,
        trader: Address::ZERO,
        tx_hash: B256::from(U256::from(key as u64 + 1)),
        block_number: block,
        timestamp: Utc::now(),
    }
}

#[test]
fn test_update_context_is_idempotent() {
    let dashboard = DashboardState::new();
    let mut rx = dashboard.subscribe();

    let mut ctx = LifecycleContext::new();
    ctx.phase = Phase::WaitT0;
    dashboard.update_context(&ctx);
    dashboard.update_context(&ctx);

    assert_eq!(rx.try_recv().unwrap().kind, EventKind::StateChange);
    assert!(
        rx.try_recv().is_err(),
        "second identical context must not broadcast"
    );
}

#[test]
fn test_phase_change_broadcasts_fresh_snapshot() {
    let dashboard = DashboardState::new();
    let mut rx = dashboard.subscribe();

    let mut ctx = LifecycleContext::new();
    ctx.phase = Phase::WaitT0;
    dashboard.update_context(&ctx);
    ctx.phase = Phase::LaunchWindow;
    dashboard.update_context(&ctx);

    let first = rx.try_recv().unwrap();
    let second = rx.try_recv().unwrap();
    assert_eq!(first.data["state"], "WAIT_T0");
    assert_eq!(second.data["state"], "LAUNCH_WINDOW");
}

#[test]
fn test_broadcast_preserves_per_client_order() {
    let dashboard = DashboardState::new();
    let mut rx_a = dashboard.subscribe();
    let mut rx_b = dashboard.subscribe();

    for i in 0..5u8 {
        dashboard.emit(EventKind::TaxUpdate, json!({ "seq": i }));
    }

    for rx in [&mut rx_a, &mut rx_b] {
        for expected in 0..5u8 {
            let event = rx.try_recv().unwrap();
            assert_eq!(event.data["seq"], expected);
        }
    }
}

#[test]
fn test_trade_ring_newest_first_capped() {
    let dashboard = DashboardState::new();
    for i in 0..120 {
        dashboard.record_trade(trade(i as u8, i));
    }
    let trades = dashboard.trades();
    assert_eq!(trades.len(), 100);
    assert!(trades[0].block_number > trades[99].block_number);
}

#[test]
fn test_duplicate_trade_hash_enqueued_once() {
    let dashboard = DashboardState::new();
    dashboard.record_trade(trade(1, 10));
    dashboard.record_trade(trade(1, 10));
    assert_eq!(dashboard.trades().len(), 1);
}

#[test]
fn test_event_ring_newest_first() {
    let dashboard = DashboardState::new();
    for i in 0..110u32 {
        dashboard.emit(EventKind::TaxUpdate, json!({ "seq": i }));
    }
    let events = dashboard.events();
    assert_eq!(events.len(), 100);
    assert_eq!(events[0].data["seq"], 109);
}

#[test]
fn test_state_snapshot_amounts_are_strings() {
    let dashboard = DashboardState::new();
    let mut ctx = LifecycleContext::new();
    ctx.tax_total = U256::from(10u64).pow(U256::from(21)); // 1000 tokens
    ctx.phase = Phase::BuybackPhase;
    dashboard.update_context(&ctx);

    let state = dashboard.state_json();
    assert_eq!(state["taxTotal"], "1000000000000000000000");
}

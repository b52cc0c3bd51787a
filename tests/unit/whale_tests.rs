//! Whale detector tests
//!
//! Threshold classification in both pool modes, plus hash dedup through the
//! trade ring.

use alloy::primitives::{Address, B256, U256};
use chrono::Utc;
use virtuals_sentinel::monitoring::whales::{classify_curve_transfer, classify_swap};
use virtuals_sentinel::rpc::contracts::{SwapRecord, TransferRecord};
use virtuals_sentinel::{DashboardState, TradeSide, WhaleTrade};

fn units(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18))
}

fn addr(n: u8) -> Address {
    Address::from_slice(&[[0u8; 19].as_slice(), &[n]].concat())
}

fn swap(a0i: u64, a1i: u64, a0o: u64, a1o: u64) -> SwapRecord {
    SwapRecord {
        sender: addr(1),
        to: addr(2),
        amount0_in: units(a0i),
        amount1_in: units(a1i),
        amount0_out: units(a0o),
        amount1_out: units(a1o),
        block_number: 1,
        log_index: 0,
        tx_hash: B256::with_last_byte(1),
    }
}

#[test]
fn test_spec_scenario_buy_with_base_as_token0() {
    // amount0In = 1500, base is token0, threshold 1000: one buy of 1500.
    let (side, amount_virtual, _) =
        classify_swap(&swap(1500, 0, 0, 3000), true, units(1000)).unwrap();
    assert_eq!(side, TradeSide::Buy);
    assert_eq!(amount_virtual, units(1500));
}

#[test]
fn test_threshold_is_inclusive_boundary() {
    assert!(classify_swap(&swap(1000, 0, 0, 1), true, units(1000)).is_some());
    assert!(classify_swap(&swap(999, 0, 0, 1), true, units(1000)).is_none());
}

#[test]
fn test_sell_when_base_leaves_the_pool() {
    let (side, amount_virtual, amount_token) =
        classify_swap(&swap(0, 500, 1200, 0), true, units(1000)).unwrap();
    assert_eq!(side, TradeSide::Sell);
    assert_eq!(amount_virtual, units(1200));
    assert_eq!(amount_token, units(500));
}

#[test]
fn test_token1_base_mirrors_token0_logic() {
    let buy = classify_swap(&swap(0, 2000, 100, 0), false, units(1000)).unwrap();
    assert_eq!(buy.0, TradeSide::Buy);
    assert_eq!(buy.1, units(2000));
    assert_eq!(buy.2, units(100));
}

#[test]
fn test_curve_mode_directions_and_threshold() {
    let pool = addr(9);
    let trader = addr(3);
    let base = TransferRecord {
        from: trader,
        to: pool,
        value: units(1500),
        block_number: 1,
        log_index: 0,
        tx_hash: B256::with_last_byte(1),
    };

    let (side, amount, who) = classify_curve_transfer(&base, pool, units(1000)).unwrap();
    assert_eq!((side, amount, who), (TradeSide::Buy, units(1500), trader));

    let sell = TransferRecord {
        from: pool,
        to: trader,
        ..base.clone()
    };
    let (side, _, who) = classify_curve_transfer(&sell, pool, units(1000)).unwrap();
    assert_eq!((side, who), (TradeSide::Sell, trader));

    let small = TransferRecord {
        value: units(10),
        ..base
    };
    assert!(classify_curve_transfer(&small, pool, units(1000)).is_none());
}

#[test]
fn test_same_transaction_hash_emits_once() {
    // The ring is the last line of defence: a hash already enqueued is
    // never enqueued again.
    let dashboard = DashboardState::new();
    let trade = WhaleTrade {
        side: TradeSide::Buy,
        amount_virtual: units(1500),
        amount_token: U256::ZERO,
        trader: addr(4),
        tx_hash: B256::with_last_byte(42),
        block_number: 7,
        timestamp: Utc::now(),
    };
    dashboard.record_trade(trade.clone());
    dashboard.record_trade(trade);
    assert_eq!(dashboard.trades().len(), 1);
}

//! Tax accounting tests
//!
//! Counter arithmetic over transfer windows, frontier monotonicity, and the
//! catch-up range planner.

use alloy::primitives::{Address, B256, U256};
use virtuals_sentinel::monitoring::tax::{catch_up_ranges, next_range, MAX_CATCHUP_ROUNDS};
use virtuals_sentinel::rpc::contracts::TransferRecord;
use virtuals_sentinel::TaxCounters;

fn units(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18))
}

fn addr(n: u8) -> Address {
    Address::from_slice(&[[0u8; 19].as_slice(), &[n]].concat())
}

fn transfer(from: Address, to: Address, value: U256, block: u64, index: u64) -> TransferRecord {
    TransferRecord {
        from,
        to,
        value,
        block_number: block,
        log_index: index,
        tx_hash: B256::with_last_byte(index as u8 + 1),
    }
}

#[test]
fn test_net_inflow_equals_prefix_sum() {
    // Spec scenario: startBalance 1000, inflows 200 + 50, outflow 30.
    let receiver = addr(1);
    let sender = addr(2);
    let mut counters = TaxCounters {
        start_balance: Some(units(1000)),
        ..Default::default()
    };

    counters.apply_transfers(
        receiver,
        &[
            transfer(sender, receiver, units(200), 5, 0),
            transfer(sender, receiver, units(50), 42, 1),
            transfer(receiver, sender, units(30), 77, 2),
        ],
    );
    counters.current_balance = units(1220);
    counters.advance_to(100);

    assert_eq!(counters.inflow, units(250));
    assert_eq!(counters.outflow, units(30));
    assert_eq!(counters.net_inflow(), units(220));
    assert_eq!(counters.balance_diff(), units(220));
    // delta = balanceDiff − netInflow must vanish when nothing was missed.
    assert_eq!(counters.residual(), (false, U256::ZERO));
    assert_eq!(counters.last_processed_block, 100);
}

#[test]
fn test_prefix_property_holds_after_each_window() {
    let receiver = addr(1);
    let sender = addr(2);
    let mut counters = TaxCounters::default();
    let mut expected_net = U256::ZERO;

    for window in 0..10u64 {
        let inflow = units(window + 1);
        let outflow = units(window / 2);
        counters.apply_transfers(
            receiver,
            &[
                transfer(sender, receiver, inflow, window * 10, 0),
                transfer(receiver, sender, outflow, window * 10 + 1, 1),
            ],
        );
        expected_net += inflow - outflow;
        assert_eq!(counters.net_inflow(), expected_net);
    }
}

#[test]
fn test_frontier_is_monotonic() {
    let mut counters = TaxCounters::default();
    counters.advance_to(500);
    counters.advance_to(400);
    counters.advance_to(500);
    assert_eq!(counters.last_processed_block, 500);
    counters.advance_to(501);
    assert_eq!(counters.last_processed_block, 501);
}

#[test]
fn test_self_transfer_counts_both_ways_and_cancels() {
    let receiver = addr(1);
    let mut counters = TaxCounters::default();
    counters.apply_transfers(receiver, &[transfer(receiver, receiver, units(7), 1, 0)]);
    assert_eq!(counters.inflow, units(7));
    assert_eq!(counters.outflow, units(7));
    assert_eq!(counters.net_inflow(), U256::ZERO);
}

#[test]
fn test_catch_up_scenario_converges_in_one_tick() {
    // Frontier at 100, chain at 12000: five capped catch-up rounds, then the
    // regular update reaches the head.
    let ranges = catch_up_ranges(100, 12_000);
    assert_eq!(
        ranges,
        vec![
            (101, 2_100),
            (2_101, 4_100),
            (4_101, 6_100),
            (6_101, 8_100),
            (8_101, 10_100),
        ]
    );
    assert_eq!(next_range(10_100, 12_000), Some((10_101, 12_000)));
}

#[test]
fn test_catch_up_runs_at_most_ten_rounds() {
    // Chain arbitrarily far ahead: the planner still stops at the cap.
    let ranges = catch_up_ranges(0, u64::MAX / 2);
    assert_eq!(ranges.len(), MAX_CATCHUP_ROUNDS);
    for window in &ranges {
        assert!(window.1 - window.0 < 2000);
    }
}

#[test]
fn test_range_never_exceeds_latest_block() {
    let (_, to) = next_range(10, 1500).unwrap();
    assert_eq!(to, 1500);
    assert_eq!(next_range(1500, 1500), None);
}

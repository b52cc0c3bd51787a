//! Lifecycle phase tests
//!
//! Transition validity and wire values. The five phases:
//! DISCOVER -> WAIT_T0 -> LAUNCH_WINDOW -> BUYBACK_PHASE -> DONE -> DISCOVER,
//! with LAUNCH_WINDOW allowed to short-circuit to DONE on graduation.

use chrono::{Duration, TimeZone, Utc};
use virtuals_sentinel::{LifecycleContext, Phase};

#[test]
fn test_happy_path_transitions() {
    assert!(Phase::Discover.can_transition_to(Phase::WaitT0));
    assert!(Phase::WaitT0.can_transition_to(Phase::LaunchWindow));
    assert!(Phase::LaunchWindow.can_transition_to(Phase::BuybackPhase));
    assert!(Phase::BuybackPhase.can_transition_to(Phase::Done));
    assert!(Phase::Done.can_transition_to(Phase::Discover));
}

#[test]
fn test_graduation_short_circuit() {
    assert!(
        Phase::LaunchWindow.can_transition_to(Phase::Done),
        "graduation during the window skips the buyback phase"
    );
}

#[test]
fn test_invalid_transitions() {
    assert!(!Phase::Discover.can_transition_to(Phase::LaunchWindow));
    assert!(!Phase::Discover.can_transition_to(Phase::Done));
    assert!(!Phase::WaitT0.can_transition_to(Phase::BuybackPhase));
    assert!(!Phase::BuybackPhase.can_transition_to(Phase::LaunchWindow));
    assert!(!Phase::Done.can_transition_to(Phase::WaitT0));
    assert!(!Phase::LaunchWindow.can_transition_to(Phase::WaitT0));
}

#[test]
fn test_no_self_transitions() {
    for phase in [
        Phase::Discover,
        Phase::WaitT0,
        Phase::LaunchWindow,
        Phase::BuybackPhase,
        Phase::Done,
    ] {
        assert!(!phase.can_transition_to(phase));
    }
}

#[test]
fn test_wire_values_are_stable() {
    assert_eq!(Phase::Discover.as_wire(), "DISCOVER");
    assert_eq!(Phase::WaitT0.as_wire(), "WAIT_T0");
    assert_eq!(Phase::LaunchWindow.as_wire(), "LAUNCH_WINDOW");
    assert_eq!(Phase::BuybackPhase.as_wire(), "BUYBACK_PHASE");
    assert_eq!(Phase::Done.as_wire(), "DONE");
}

#[test]
fn test_wire_values_roundtrip_through_serde() {
    for phase in [
        Phase::Discover,
        Phase::WaitT0,
        Phase::LaunchWindow,
        Phase::BuybackPhase,
        Phase::Done,
    ] {
        let json = serde_json::to_string(&phase).unwrap();
        assert_eq!(json, format!("\"{}\"", phase.as_wire()));
        let back: Phase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, phase);
    }
}

#[test]
fn test_context_window_invariant() {
    // T0 <= T1 = T0 + taxWindow, and the minute arithmetic is clamped.
    let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let mut ctx = LifecycleContext::new();
    ctx.t0 = Some(t0);
    ctx.t1 = Some(t0 + Duration::minutes(100));
    assert!(ctx.t0.unwrap() <= ctx.t1.unwrap());

    assert_eq!(ctx.elapsed_minutes(t0 - Duration::minutes(5)), 0);
    assert_eq!(ctx.elapsed_minutes(t0 + Duration::minutes(40)), 40);
    assert_eq!(ctx.remaining_minutes(t0 + Duration::minutes(40)), 60);
    assert_eq!(ctx.remaining_minutes(t0 + Duration::minutes(400)), 0);
}

#[test]
fn test_context_reset_clears_project_state() {
    let mut ctx = LifecycleContext::new();
    ctx.phase = Phase::Done;
    ctx.t0 = Some(Utc::now());
    ctx.tax_total = alloy::primitives::U256::from(5u64);
    ctx.reset();
    assert_eq!(ctx.phase, Phase::Done, "reset keeps the phase");
    assert!(ctx.t0.is_none());
    assert!(ctx.selected.is_none());
    assert_eq!(ctx.tax_total, alloy::primitives::U256::ZERO);
}

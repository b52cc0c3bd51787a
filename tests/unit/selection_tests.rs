//! Selection policy tests
//!
//! Discovery must deterministically pick the project whose launch window
//! contains "now", preferring the most recent anchor, with a configurable
//! ticker override.

use chrono::{DateTime, Duration, TimeZone, Utc};
use virtuals_sentinel::models::{Factory, Project, ProjectStatus};
use virtuals_sentinel::select_project;

fn addr(n: u8) -> alloy::primitives::Address {
    alloy::primitives::Address::from_slice(&[[0u8; 19].as_slice(), &[n]].concat())
}

fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn undergrad(id: u64, launched_min_ago: i64) -> Project {
    Project {
        id,
        name: format!("Project {}", id),
        symbol: format!("P{}", id),
        factory: Factory::CurveV2,
        status: ProjectStatus::Undergrad,
        pre_token_pair: Some(addr(id as u8)),
        lp_address: None,
        token_address: None,
        created_at: now() - Duration::days(2),
        launched_at: Some(now() - Duration::minutes(launched_min_ago)),
        lp_created_at: None,
        mcap_in_virtual: None,
    }
}

#[test]
fn test_picks_in_window_candidate_over_expired_one() {
    // Candidate 1 launched 30 min ago (inside a 100-minute window),
    // candidate 2 launched 200 min ago (outside).
    let candidates = vec![undergrad(1, 30), undergrad(2, 200)];
    let selected = select_project(&candidates, now(), Duration::minutes(100), None).unwrap();
    assert_eq!(selected.project.id, 1);
}

#[test]
fn test_most_recent_anchor_wins_inside_window() {
    let candidates = vec![undergrad(1, 90), undergrad(2, 10), undergrad(3, 50)];
    let selected = select_project(&candidates, now(), Duration::minutes(100), None).unwrap();
    assert_eq!(selected.project.id, 2);
}

#[test]
fn test_full_set_used_when_window_is_empty() {
    let candidates = vec![undergrad(1, 300), undergrad(2, 150)];
    let selected = select_project(&candidates, now(), Duration::minutes(100), None).unwrap();
    assert_eq!(selected.project.id, 2, "most recent T0 among expired candidates");
}

#[test]
fn test_ticker_preference_applies_within_chosen_set() {
    let candidates = vec![undergrad(1, 10), undergrad(2, 30)];
    let selected =
        select_project(&candidates, now(), Duration::minutes(100), Some("P2")).unwrap();
    assert_eq!(selected.project.id, 2);

    // Ticker not present: falls back to the sort order.
    let selected =
        select_project(&candidates, now(), Duration::minutes(100), Some("NOPE")).unwrap();
    assert_eq!(selected.project.id, 1);
}

#[test]
fn test_filters_initialized_and_graduated_projects() {
    let mut initialized = undergrad(1, 10);
    initialized.status = ProjectStatus::Initialized;
    let mut graduated = undergrad(2, 10);
    graduated.lp_address = Some(addr(99));
    let mut available = undergrad(3, 10);
    available.status = ProjectStatus::Available;
    assert!(select_project(
        &[initialized, graduated, available],
        now(),
        Duration::minutes(100),
        None
    )
    .is_none());
}

#[test]
fn test_anchor_fallback_chain() {
    // No launchedAt: lpCreatedAt anchors the window; then createdAt.
    let mut p = undergrad(1, 10);
    p.launched_at = None;
    p.lp_created_at = Some(now() - Duration::minutes(20));
    let selected = select_project(
        std::slice::from_ref(&p),
        now(),
        Duration::minutes(100),
        None,
    )
    .unwrap();
    assert_eq!(selected.t0, p.lp_created_at.unwrap());

    p.lp_created_at = None;
    let selected = select_project(
        std::slice::from_ref(&p),
        now(),
        Duration::minutes(100),
        None,
    )
    .unwrap();
    assert_eq!(selected.t0, p.created_at);
}

#[test]
fn test_selection_is_deterministic_over_identical_inputs() {
    let candidates = vec![undergrad(1, 30), undergrad(2, 40), undergrad(3, 60)];
    let first = select_project(&candidates, now(), Duration::minutes(100), None)
        .unwrap()
        .project
        .id;
    for _ in 0..10 {
        let id = select_project(&candidates, now(), Duration::minutes(100), None)
            .unwrap()
            .project
            .id;
        assert_eq!(id, first);
    }
}

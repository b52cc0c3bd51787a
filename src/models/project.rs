//! Project descriptors and the lifecycle context.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Factory that minted the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Factory {
    #[serde(rename = "BONDING_CURVE_V2")]
    CurveV2,
    #[serde(rename = "BONDING_CURVE_V4")]
    CurveV4,
    #[serde(rename = "VIBES")]
    Vibes,
    #[serde(rename = "OTHER")]
    Other,
}

impl Factory {
    /// The tags exhausted by the upcoming-launch aggregation.
    pub const UPCOMING: [Factory; 3] = [Factory::CurveV2, Factory::CurveV4, Factory::Vibes];

    pub fn from_tag(tag: &str) -> Self {
        let t = tag.to_ascii_uppercase().replace('-', "_");
        match t.as_str() {
            "BONDING_CURVE_V2" | "CURVE_V2" => Factory::CurveV2,
            "BONDING_CURVE_V4" | "CURVE_V4" => Factory::CurveV4,
            "VIBES" => Factory::Vibes,
            _ => Factory::Other,
        }
    }

    /// Tag used in catalog query strings.
    pub fn as_query(&self) -> &'static str {
        match self {
            Factory::CurveV2 => "BONDING_CURVE_V2",
            Factory::CurveV4 => "BONDING_CURVE_V4",
            Factory::Vibes => "VIBES",
            Factory::Other => "OTHER",
        }
    }
}

impl<'de> Deserialize<'de> for Factory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Factory::from_tag(&tag))
    }
}

/// Catalog lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProjectStatus {
    #[serde(alias = "initialized")]
    Initialized,
    #[serde(alias = "undergrad")]
    Undergrad,
    #[serde(alias = "available")]
    Available,
}

/// Immutable descriptor of one catalog project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_factory")]
    pub factory: Factory,
    pub status: ProjectStatus,
    /// Pre-graduation bonding-curve pair, if any
    #[serde(default, deserialize_with = "empty_as_none")]
    pub pre_token_pair: Option<Address>,
    /// Post-graduation AMM pair, set on graduation
    #[serde(default, deserialize_with = "empty_as_none")]
    pub lp_address: Option<Address>,
    /// Project token contract
    #[serde(default, deserialize_with = "empty_as_none")]
    pub token_address: Option<Address>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub launched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lp_created_at: Option<DateTime<Utc>>,
    /// Catalog-reported market cap in base-token display units
    #[serde(default)]
    pub mcap_in_virtual: Option<f64>,
}

fn default_factory() -> Factory {
    Factory::Other
}

/// The catalog serialises absent addresses as `null` or `""`.
fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Address>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<Address>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl Project {
    /// Anchor moment of the launch window: `launchedAt ?? lpCreatedAt ?? createdAt`.
    pub fn anchor_t0(&self) -> DateTime<Utc> {
        self.launched_at
            .or(self.lp_created_at)
            .unwrap_or(self.created_at)
    }

    /// Whether the project has graduated to a conventional pool.
    pub fn is_graduated(&self) -> bool {
        self.status == ProjectStatus::Available || self.lp_address.is_some()
    }
}

/// Pool flavour the monitors attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolKind {
    #[serde(rename = "curve")]
    Curve,
    #[serde(rename = "ammv2")]
    AmmV2,
}

/// A project the machine has committed to monitoring.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedProject {
    pub project: Project,
    pub pool: Address,
    pub pool_kind: PoolKind,
    pub t0: DateTime<Utc>,
}

/// Lifecycle phases; wire values are fixed for API compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "DISCOVER")]
    Discover,
    #[serde(rename = "WAIT_T0")]
    WaitT0,
    #[serde(rename = "LAUNCH_WINDOW")]
    LaunchWindow,
    #[serde(rename = "BUYBACK_PHASE")]
    BuybackPhase,
    #[serde(rename = "DONE")]
    Done,
}

impl Phase {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Phase::Discover => "DISCOVER",
            Phase::WaitT0 => "WAIT_T0",
            Phase::LaunchWindow => "LAUNCH_WINDOW",
            Phase::BuybackPhase => "BUYBACK_PHASE",
            Phase::Done => "DONE",
        }
    }
}

impl Phase {
    /// Legal phase transitions; the machine asserts these on every change.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Discover, Phase::WaitT0)
                | (Phase::WaitT0, Phase::LaunchWindow)
                | (Phase::LaunchWindow, Phase::BuybackPhase)
                | (Phase::LaunchWindow, Phase::Done)
                | (Phase::BuybackPhase, Phase::Done)
                | (Phase::Done, Phase::Discover)
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Single-writer record owned by the state machine.
///
/// Every other component sees this only through snapshots taken on
/// transition.
#[derive(Debug, Clone)]
pub struct LifecycleContext {
    pub phase: Phase,
    pub selected: Option<SelectedProject>,
    pub t0: Option<DateTime<Utc>>,
    pub t1: Option<DateTime<Utc>>,
    /// Net tax inflow accumulated over the window, integer base units
    pub tax_total: U256,
    pub start_balance: Option<U256>,
    pub last_tax_refresh: Option<DateTime<Utc>>,
    pub last_buyback_refresh: Option<DateTime<Utc>>,
}

impl LifecycleContext {
    pub fn new() -> Self {
        Self {
            phase: Phase::Discover,
            selected: None,
            t0: None,
            t1: None,
            tax_total: U256::ZERO,
            start_balance: None,
            last_tax_refresh: None,
            last_buyback_refresh: None,
        }
    }

    /// Clear everything except the phase; used on entry to `discover`.
    pub fn reset(&mut self) {
        let phase = self.phase;
        *self = Self::new();
        self.phase = phase;
    }

    /// Minutes since T0, clamped at zero.
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        self.t0
            .map(|t0| (now - t0).num_minutes().max(0))
            .unwrap_or(0)
    }

    /// Minutes until T1, clamped at zero.
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        self.t1
            .map(|t1| (t1 - now).num_minutes().max(0))
            .unwrap_or(0)
    }
}

impl Default for LifecycleContext {
    fn default() -> Self {
        Self::new()
    }
}

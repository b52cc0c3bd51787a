//! Typed event envelopes and whale trades.

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event kinds broadcast to dashboard clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StateChange,
    WhaleTrade,
    TaxUpdate,
    BuybackUpdate,
    ProjectStart,
    ProjectComplete,
    Error,
}

/// Wire envelope: `{type, timestamp, data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(kind: EventKind, payload: impl Serialize) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            data: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Trade direction relative to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A trade that crossed the whale threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleTrade {
    pub side: TradeSide,
    /// Base-token leg, integer base units
    #[serde(with = "super::serde_amount")]
    pub amount_virtual: U256,
    /// Project-token leg; zero when only derivable from transfers
    #[serde(with = "super::serde_amount")]
    pub amount_token: U256,
    pub trader: Address,
    /// Primary key for dedup
    pub tx_hash: B256,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
}

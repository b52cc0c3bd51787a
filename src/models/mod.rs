//! Data model shared across the sentinel.

mod event;
mod project;

pub use event::{Event, EventKind, TradeSide, WhaleTrade};
pub use project::{
    Factory, LifecycleContext, Phase, PoolKind, Project, ProjectStatus, SelectedProject,
};

/// Serde helpers for integer token amounts.
///
/// `U256` amounts cross the wire as decimal strings so they survive
/// double-precision JSON parsers on the other end.
pub mod serde_amount {
    use alloy::primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<U256>().map_err(serde::de::Error::custom)
    }

    pub mod option {
        use alloy::primitives::U256;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<U256>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_some(&v.to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<U256>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            match raw {
                Some(s) => s
                    .parse::<U256>()
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

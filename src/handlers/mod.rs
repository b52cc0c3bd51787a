//! HTTP surface: REST snapshot endpoints, the push socket and the health
//! probe.

pub mod api;
pub mod health;
pub mod ws;

pub use api::{api_router, ApiContext, ConfigView};
pub use health::{health_router, HealthState};

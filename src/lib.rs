//! Virtuals Sentinel
//!
//! Launch lifecycle monitor for a single token project: tracks the
//! tax-collection window, the buyback phase and graduation, streams
//! whale-size trades and serves a live dashboard.
//! This library exposes the core modules for integration tests.

pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod monitoring;
pub mod notifications;
pub mod rpc;

// Re-export commonly used types for tests
pub use catalog::{select_project, CatalogClient, Sort};
pub use config::AppConfig;
pub use dashboard::DashboardState;
pub use error::{SentinelError, SentinelResult};
pub use lifecycle::LifecycleMachine;
pub use models::{Event, EventKind, LifecycleContext, Phase, Project, TradeSide, WhaleTrade};
pub use monitoring::{BuybackStatus, SpendLedger, TaxCounters, TaxTracker};
pub use notifications::{CompositeNotifier, NotificationEvent};
pub use rpc::{RpcHealth, RpcPool};

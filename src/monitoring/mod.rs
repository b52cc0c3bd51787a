//! On-chain monitors: tax inflow, buyback spends, whale trades, FDV.

pub mod buyback;
pub mod fdv;
pub mod tax;
pub mod whales;

pub use buyback::{BuybackStatus, BuybackTracker, SpendLedger, SpendRecord};
pub use fdv::{FdvCalculator, FdvSnapshot};
pub use tax::{TaxCounters, TaxTracker};
pub use whales::WhaleDetector;

//! FDV calculator: on-chain curve price × total supply, quoted in the base
//! token and optionally USD.
//!
//! The USD quote comes from one external price endpoint with a short cache;
//! on fetch failure the last cached value is served even if stale. Any
//! on-chain failure yields "no FDV" and the state machine falls back to the
//! catalog-reported market cap, flagged as an estimate.

use alloy::primitives::{Address, U256};
use parking_lot::RwLock;
use rust_decimal::prelude::*;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::rpc::contracts::{format_units, IBondingCurve, IERC20};
use crate::rpc::RpcPool;

/// External USD quote for the base token.
const USD_QUOTE_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=virtual-protocol&vs_currencies=usd";
/// Quote fetch budget.
const QUOTE_TIMEOUT: Duration = Duration::from_secs(5);
/// Quote cache TTL.
const QUOTE_TTL: Duration = Duration::from_secs(10);

/// One FDV figure, display-unit decimal strings.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FdvSnapshot {
    pub fdv_virtual: String,
    pub fdv_usd: Option<String>,
}

struct CachedQuote {
    price: Decimal,
    fetched_at: Instant,
}

/// Stateless FDV helpers with a cached USD quote.
pub struct FdvCalculator {
    rpc: Arc<RpcPool>,
    client: reqwest::Client,
    quote: RwLock<Option<CachedQuote>>,
}

impl FdvCalculator {
    pub fn new(rpc: Arc<RpcPool>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(QUOTE_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            rpc,
            client,
            quote: RwLock::new(None),
        }
    }

    /// USD price of the base token, cached for [`QUOTE_TTL`].
    ///
    /// On failure the last cached value is returned, stale or not.
    pub async fn virtual_usd_price(&self) -> Option<Decimal> {
        {
            let cached = self.quote.read();
            if let Some(entry) = cached.as_ref() {
                if entry.fetched_at.elapsed() < QUOTE_TTL {
                    return Some(entry.price);
                }
            }
        }

        match self.fetch_quote().await {
            Some(price) => {
                *self.quote.write() = Some(CachedQuote {
                    price,
                    fetched_at: Instant::now(),
                });
                Some(price)
            }
            None => {
                let cached = self.quote.read();
                cached.as_ref().map(|entry| {
                    tracing::debug!("Serving stale USD quote");
                    entry.price
                })
            }
        }
    }

    async fn fetch_quote(&self) -> Option<Decimal> {
        let response = match self.client.get(USD_QUOTE_URL).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "USD quote fetch failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::warn!(status = response.status().as_u16(), "USD quote fetch rejected");
            return None;
        }
        let body: serde_json::Value = response.json().await.ok()?;
        let usd = body.get("virtual-protocol")?.get("usd")?.as_f64()?;
        Decimal::from_f64_retain(usd)
    }

    /// Resolve the project token from the curve: `token()` then
    /// `agentToken()`, first non-zero answer wins.
    pub async fn token_from_curve(&self, pool: Address) -> Option<Address> {
        let primary = self
            .rpc
            .call("curve.token", move |provider, _| async move {
                Ok(IBondingCurve::new(pool, provider).token().call().await?)
            })
            .await;
        if let Ok(addr) = primary {
            if addr != Address::ZERO {
                return Some(addr);
            }
        }
        let secondary = self
            .rpc
            .call("curve.agentToken", move |provider, _| async move {
                Ok(IBondingCurve::new(pool, provider)
                    .agentToken()
                    .call()
                    .await?)
            })
            .await;
        match secondary {
            Ok(addr) if addr != Address::ZERO => Some(addr),
            _ => None,
        }
    }

    /// Curve FDV = price × supply / 10^18, in base-token display units.
    pub async fn compute_curve_fdv(
        &self,
        pool: Address,
        token_hint: Option<Address>,
    ) -> Option<FdvSnapshot> {
        let token = match token_hint {
            Some(t) => t,
            None => self.token_from_curve(pool).await?,
        };

        let price = match self.curve_price(pool).await {
            Some(p) => p,
            None => {
                tracing::debug!(pool = %pool, "Curve price unavailable");
                return None;
            }
        };
        let supply = self
            .rpc
            .call("totalSupply", move |provider, _| async move {
                Ok(IERC20::new(token, provider).totalSupply().call().await?)
            })
            .await
            .ok()?;

        let scale = U256::from(10u64).pow(U256::from(18));
        let fdv_raw = price.checked_mul(supply)? / scale;
        let fdv_virtual = format_units(fdv_raw, 18);
        let fdv_usd = self.virtual_usd_price().await.and_then(|quote| {
            Decimal::from_str(&fdv_virtual)
                .ok()
                .map(|v| (v * quote).round_dp(2).to_string())
        });
        Some(FdvSnapshot {
            fdv_virtual,
            fdv_usd,
        })
    }

    /// Pool price with method fallback: `getTokenPrice()` then `getPrice()`.
    async fn curve_price(&self, pool: Address) -> Option<U256> {
        let primary = self
            .rpc
            .call("getTokenPrice", move |provider, _| async move {
                Ok(IBondingCurve::new(pool, provider)
                    .getTokenPrice()
                    .call()
                    .await?)
            })
            .await;
        if let Ok(price) = primary {
            return Some(price);
        }
        self.rpc
            .call("getPrice", move |provider, _| async move {
                Ok(IBondingCurve::new(pool, provider).getPrice().call().await?)
            })
            .await
            .ok()
    }

    /// FDV snapshot from a catalog-reported market cap, used when the
    /// on-chain read fails. The caller flags it as an estimate.
    pub async fn from_catalog_mcap(&self, mcap_in_virtual: f64) -> FdvSnapshot {
        let fdv_virtual = if mcap_in_virtual.fract() == 0.0 {
            format!("{:.0}", mcap_in_virtual)
        } else {
            format!("{}", mcap_in_virtual)
        };
        let fdv_usd = self.virtual_usd_price().await.and_then(|quote| {
            Decimal::from_f64_retain(mcap_in_virtual).map(|v| (v * quote).round_dp(2).to_string())
        });
        FdvSnapshot {
            fdv_virtual,
            fdv_usd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fdv_snapshot_serialization() {
        let snap = FdvSnapshot {
            fdv_virtual: "125000.5".to_string(),
            fdv_usd: Some("212500.85".to_string()),
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["fdvVirtual"], "125000.5");
        assert_eq!(json["fdvUsd"], "212500.85");
    }

    #[test]
    fn test_fdv_math_matches_format_units() {
        // price 2e18 (2 base per token), supply 1e9 tokens
        let price = U256::from(2u64) * U256::from(10u64).pow(U256::from(18));
        let supply = U256::from(1_000_000_000u64) * U256::from(10u64).pow(U256::from(18));
        let scale = U256::from(10u64).pow(U256::from(18));
        let fdv_raw = price.checked_mul(supply).unwrap() / scale;
        assert_eq!(format_units(fdv_raw, 18), "2000000000");
    }
}

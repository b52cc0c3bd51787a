//! Swap detector: streams trades whose base-token leg crosses the whale
//! threshold.
//!
//! Two modes, chosen by the selected pool. AMM-v2 pools expose a swap event
//! with explicit in/out amounts; pre-graduation curves only show base-token
//! transfers touching the curve address, so direction is inferred from the
//! transfer side and the project-token leg is left at zero.

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;
use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::dashboard::DashboardState;
use crate::error::SentinelResult;
use crate::models::{PoolKind, SelectedProject, TradeSide, WhaleTrade};
use crate::rpc::contracts::{
    decode_swap, decode_transfer, log_filter_params, topic_address, IUniswapV2Pair, SwapRecord,
    TransferRecord, IERC20,
};
use crate::rpc::push::PushClient;
use crate::rpc::RpcPool;

/// Dedup cache size, transaction hashes.
const DEDUP_CAPACITY: usize = 1000;

/// Classify an AMM-v2 swap against the threshold.
///
/// A positive base-token delta into the pool is a buy; the project-token leg
/// is the opposite side of the swap.
pub fn classify_swap(
    swap: &SwapRecord,
    base_is_token0: bool,
    threshold: U256,
) -> Option<(TradeSide, U256, U256)> {
    let (base_in, base_out, token_in, token_out) = if base_is_token0 {
        (
            swap.amount0_in,
            swap.amount0_out,
            swap.amount1_in,
            swap.amount1_out,
        )
    } else {
        (
            swap.amount1_in,
            swap.amount1_out,
            swap.amount0_in,
            swap.amount0_out,
        )
    };

    let (side, amount_virtual, amount_token) = if base_in >= base_out {
        (TradeSide::Buy, base_in - base_out, token_out)
    } else {
        (TradeSide::Sell, base_out - base_in, token_in)
    };
    if amount_virtual < threshold {
        return None;
    }
    Some((side, amount_virtual, amount_token))
}

/// Classify a base-token transfer touching the curve address.
pub fn classify_curve_transfer(
    transfer: &TransferRecord,
    pool: Address,
    threshold: U256,
) -> Option<(TradeSide, U256, Address)> {
    if transfer.value < threshold {
        return None;
    }
    if transfer.to == pool {
        Some((TradeSide::Buy, transfer.value, transfer.from))
    } else if transfer.from == pool {
        Some((TradeSide::Sell, transfer.value, transfer.to))
    } else {
        None
    }
}

/// Live whale-trade monitor. Owns its own push client.
pub struct WhaleDetector {
    push: PushClient,
}

impl WhaleDetector {
    /// Start streaming trades for the selected pool into the dashboard.
    pub async fn start(
        rpc: &RpcPool,
        push_endpoints: Vec<String>,
        push_connected: Arc<AtomicBool>,
        selected: &SelectedProject,
        base_token: Address,
        threshold: U256,
        dashboard: Arc<DashboardState>,
    ) -> SentinelResult<Self> {
        let push = PushClient::connect(push_endpoints, push_connected);
        let dedup: Arc<Mutex<LruCache<B256, ()>>> = Arc::new(Mutex::new(LruCache::new(
            NonZeroUsize::new(DEDUP_CAPACITY).expect("capacity > 0"),
        )));
        let pool = selected.pool;

        match selected.pool_kind {
            PoolKind::AmmV2 => {
                let token0 = rpc
                    .call("token0", move |provider, _| async move {
                        Ok(IUniswapV2Pair::new(pool, provider).token0().call().await?)
                    })
                    .await?;
                let base_is_token0 = token0 == base_token;
                tracing::info!(pool = %pool, base_is_token0, "Whale detector in AMM-v2 mode");

                let handler_dedup = dedup.clone();
                let handler_dashboard = dashboard.clone();
                push.subscribe_logs(
                    "pool-swaps",
                    log_filter_params(pool, &[Some(IUniswapV2Pair::Swap::SIGNATURE_HASH)]),
                    Arc::new(move |log| {
                        let Some(swap) = decode_swap(&log) else {
                            return;
                        };
                        let Some((side, amount_virtual, amount_token)) =
                            classify_swap(&swap, base_is_token0, threshold)
                        else {
                            return;
                        };
                        if handler_dedup.lock().put(swap.tx_hash, ()).is_some() {
                            return;
                        }
                        handler_dashboard.record_trade(WhaleTrade {
                            side,
                            amount_virtual,
                            amount_token,
                            trader: swap.to,
                            tx_hash: swap.tx_hash,
                            block_number: swap.block_number,
                            timestamp: Utc::now(),
                        });
                    }),
                );
            }
            PoolKind::Curve => {
                tracing::info!(pool = %pool, "Whale detector in curve mode");
                let signature = IERC20::Transfer::SIGNATURE_HASH;
                // Curve trades only surface as base-token transfers; one
                // subscription per direction.
                let filters = [
                    log_filter_params(
                        base_token,
                        &[Some(signature), None, Some(topic_address(pool))],
                    ),
                    log_filter_params(
                        base_token,
                        &[Some(signature), Some(topic_address(pool)), None],
                    ),
                ];
                for (idx, params) in filters.into_iter().enumerate() {
                    let handler_dedup = dedup.clone();
                    let handler_dashboard = dashboard.clone();
                    push.subscribe_logs(
                        if idx == 0 { "curve-buys" } else { "curve-sells" },
                        params,
                        Arc::new(move |log| {
                            let Some(transfer) = decode_transfer(&log) else {
                                return;
                            };
                            let Some((side, amount_virtual, trader)) =
                                classify_curve_transfer(&transfer, pool, threshold)
                            else {
                                return;
                            };
                            if handler_dedup.lock().put(transfer.tx_hash, ()).is_some() {
                                return;
                            }
                            handler_dashboard.record_trade(WhaleTrade {
                                side,
                                amount_virtual,
                                amount_token: U256::ZERO,
                                trader,
                                tx_hash: transfer.tx_hash,
                                block_number: transfer.block_number,
                                timestamp: Utc::now(),
                            });
                        }),
                    );
                }
            }
        }

        Ok(Self { push })
    }

    pub fn destroy(&self) {
        self.push.destroy();
    }
}

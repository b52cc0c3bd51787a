//! Contract bindings, log decoding and unit helpers.

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log as RpcLog;
use alloy::sol;
use alloy::sol_types::SolEvent;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);
        function balanceOf(address account) external view returns (uint256);
        function totalSupply() external view returns (uint256);
    }

    #[sol(rpc)]
    interface IUniswapV2Pair {
        event Swap(
            address indexed sender,
            uint256 amount0In,
            uint256 amount1In,
            uint256 amount0Out,
            uint256 amount1Out,
            address indexed to
        );
        function token0() external view returns (address);
        function token1() external view returns (address);
    }

    #[sol(rpc)]
    interface IBondingCurve {
        function token() external view returns (address);
        function agentToken() external view returns (address);
        function getTokenPrice() external view returns (uint256);
        function getPrice() external view returns (uint256);
    }
}

/// One decoded ERC-20 transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: B256,
}

/// One decoded AMM-v2 swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRecord {
    pub sender: Address,
    pub to: Address,
    pub amount0_in: U256,
    pub amount1_in: U256,
    pub amount0_out: U256,
    pub amount1_out: U256,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: B256,
}

/// Decode a raw log as an ERC-20 `Transfer`; `None` if it is something else.
pub fn decode_transfer(log: &RpcLog) -> Option<TransferRecord> {
    let decoded = IERC20::Transfer::decode_log(&log.inner).ok()?;
    Some(TransferRecord {
        from: decoded.data.from,
        to: decoded.data.to,
        value: decoded.data.value,
        block_number: log.block_number.unwrap_or(0),
        log_index: log.log_index.unwrap_or(0),
        tx_hash: log.transaction_hash.unwrap_or(B256::ZERO),
    })
}

/// Decode a raw log as a v2 `Swap`; `None` if it is something else.
pub fn decode_swap(log: &RpcLog) -> Option<SwapRecord> {
    let decoded = IUniswapV2Pair::Swap::decode_log(&log.inner).ok()?;
    Some(SwapRecord {
        sender: decoded.data.sender,
        to: decoded.data.to,
        amount0_in: decoded.data.amount0In,
        amount1_in: decoded.data.amount1In,
        amount0_out: decoded.data.amount0Out,
        amount1_out: decoded.data.amount1Out,
        block_number: log.block_number.unwrap_or(0),
        log_index: log.log_index.unwrap_or(0),
        tx_hash: log.transaction_hash.unwrap_or(B256::ZERO),
    })
}

/// Left-pad an address into a 32-byte log topic.
pub fn topic_address(addr: Address) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(addr.as_slice());
    B256::from(bytes)
}

/// Build the params object for an `eth_subscribe("logs", ...)` call.
///
/// `topics` entries are positional: `None` matches anything at that position.
pub fn log_filter_params(address: Address, topics: &[Option<B256>]) -> serde_json::Value {
    let topics_json: Vec<serde_json::Value> = topics
        .iter()
        .map(|t| match t {
            Some(topic) => serde_json::Value::String(format!("{:#x}", topic)),
            None => serde_json::Value::Null,
        })
        .collect();
    serde_json::json!({
        "address": format!("{:#x}", address),
        "topics": topics_json,
    })
}

/// Format integer base units as a decimal string with `decimals` fraction
/// digits, trailing zeros trimmed.
pub fn format_units(value: U256, decimals: u32) -> String {
    let scale = U256::from(10u64).pow(U256::from(decimals));
    let integer = value / scale;
    let frac = value % scale;
    if frac.is_zero() {
        return integer.to_string();
    }
    let mut frac_str = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    while frac_str.ends_with('0') {
        frac_str.pop();
    }
    format!("{}.{}", integer, frac_str)
}

/// Parse a display-unit decimal string into integer base units.
pub fn parse_units(value: &str, decimals: u32) -> anyhow::Result<U256> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        anyhow::bail!("empty amount");
    }
    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };
    if frac_part.len() > decimals as usize {
        anyhow::bail!(
            "too many fraction digits ({} > {})",
            frac_part.len(),
            decimals
        );
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
        || int_part.is_empty()
    {
        anyhow::bail!("malformed amount {:?}", value);
    }
    let scale = U256::from(10u64).pow(U256::from(decimals));
    let integer: U256 = int_part.parse()?;
    let frac = if frac_part.is_empty() {
        U256::ZERO
    } else {
        let parsed: U256 = frac_part.parse()?;
        parsed * U256::from(10u64).pow(U256::from(decimals as usize - frac_part.len()))
    };
    Ok(integer * scale + frac)
}

/// Lossy conversion to display units for rates and progress figures.
pub fn to_display(value: U256) -> f64 {
    let capped = value.min(U256::from(u128::MAX));
    capped.to::<u128>() as f64 / 1e18
}

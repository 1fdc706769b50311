//! Constants Module - Single Source of Truth
//!
//! Protocol constants, default deployment addresses, token override tables
//! and the raw/human unit conversions. `EngineConfig` is seeded from here;
//! nothing downstream reads these tables directly.

use alloy_primitives::{Address, U256};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::str::FromStr;

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "ve-bribe-engine";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for JSON-RPC requests
pub const USER_AGENT: &str = "ve-bribe-engine/0.1.0";

// ============================================
// PROTOCOL CONSTANTS
// ============================================

/// Epoch length in seconds (7 days)
pub const WEEK: u64 = 604_800;

/// Fixed-point denominator for vote weights
pub const ONE_E18: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Default fixed-point scale for reward-per-unit
pub const DEFAULT_REWARD_SCALE: U256 = ONE_E18;

/// Decimals assumed when nothing authoritative is available
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Largest decimals value accepted from any source
pub const MAX_TOKEN_DECIMALS: u8 = 36;

// ============================================
// RPC CONSTANTS
// ============================================

/// Default timeout for RPC requests (seconds)
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

/// Default transport retry attempts per endpoint
pub const DEFAULT_RPC_MAX_RETRIES: u32 = 3;

/// Default bound on rows evaluated concurrently by the batch runner
pub const DEFAULT_MAX_CONCURRENT_ROWS: usize = 8;

// ============================================
// DEFAULT DEPLOYMENT (Hydrex on Base)
// ============================================

/// Voting escrow contract
pub const DEFAULT_VE_ADDRESS: &str = "0x25B2ED7149fb8A05f6eF9407d9c8F878f59cd1e1";

/// Pre-boundary probes: (label, seconds before the epoch boundary)
pub const DEFAULT_PROBES: [(&str, u64); 2] = [("T-5", 300), ("T-1", 60)];

lazy_static! {
    /// Tokens whose cached decimals were known to be wrong
    pub static ref DECIMAL_OVERRIDES: HashMap<Address, u8> = {
        let mut map = HashMap::new();
        for (addr, decimals) in [
            ("0x833589fcd6edb6e08f4c7c32d4f71b54bda02913", 6u8), // USDC
            ("0xfde4c96c8593536e31f229ea8f37b2ada2699bb2", 6u8), // USDT
        ] {
            if let Ok(address) = Address::from_str(addr) {
                map.insert(address, decimals);
            }
        }
        map
    };

    /// Symbol-keyed decimal overrides, used only when `decimals()` cannot be read
    pub static ref SYMBOL_DECIMAL_OVERRIDES: HashMap<String, u8> = {
        let mut map = HashMap::new();
        map.insert("USDC".to_string(), 6u8);
        map.insert("USDT".to_string(), 6u8);
        map
    };

    /// Canonical symbols for tokens whose on-chain or cached symbol is unreliable
    pub static ref TOKEN_ALIASES: HashMap<Address, String> = {
        let mut map = HashMap::new();
        for (addr, symbol) in [
            ("0x833589fcd6edb6e08f4c7c32d4f71b54bda02913", "USDC"),
            ("0x4200000000000000000000000000000000000006", "WETH"),
            ("0x00000e7efa313f4e11bfff432471ed9423ac6b30", "HYDX"),
            ("0xa1136031150e50b015b41f1ca6b2e99e49d8cb78", "oHYDX"),
            ("0x00fbac94fec8d4089d3fe979f39454f48c71a65d", "kVCM"),
        ] {
            if let Ok(address) = Address::from_str(addr) {
                map.insert(address, symbol.to_string());
            }
        }
        map
    };
}

// ============================================
// CONVERSION UTILITIES
// ============================================

/// `10^decimals` as U256
#[inline]
pub fn pow10(decimals: u8) -> U256 {
    U256::from(10u8).pow(U256::from(decimals))
}

/// Lossy U256 -> f64 for display and human amounts
pub fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(f64::INFINITY)
}

/// Convert a raw token amount to human units (`raw / 10^decimals`)
pub fn raw_to_human(raw: U256, decimals: u8) -> f64 {
    let scale = pow10(decimals);
    let whole = raw / scale;
    let frac = raw % scale;
    u256_to_f64(whole) + u256_to_f64(frac) / u256_to_f64(scale)
}

/// Convert a human amount to raw units, truncating toward zero.
/// Non-finite or non-positive inputs yield zero.
pub fn human_to_raw(amount: f64, decimals: u8) -> U256 {
    if !amount.is_finite() || amount <= 0.0 {
        return U256::ZERO;
    }
    let scaled = (amount * 10f64.powi(decimals as i32)).trunc();
    U256::from_str_radix(&format!("{:.0}", scaled), 10).unwrap_or(U256::MAX)
}

/// `0x8335...2913` style label for tokens without a readable symbol
pub fn short_address(address: &Address) -> String {
    let hex = format!("0x{}", hex::encode(address));
    format!("{}...{}", &hex[..6], &hex[hex.len() - 4..])
}

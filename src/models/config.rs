//! Engine configuration
//!
//! `EngineConfig` is immutable once built and shared behind an `Arc`. It is
//! seeded from `utils/constants.rs`, optionally layered with a TOML file, and
//! validated before any resolver is constructed. Override tables in the file
//! extend the built-in tables rather than replacing them.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::models::errors::{EngineError, EngineResult};
use crate::utils::constants::{
    pow10, DECIMAL_OVERRIDES, DEFAULT_MAX_CONCURRENT_ROWS, DEFAULT_PROBES, DEFAULT_REWARD_SCALE,
    DEFAULT_RPC_MAX_RETRIES, DEFAULT_RPC_TIMEOUT_SECS, DEFAULT_TOKEN_DECIMALS, DEFAULT_VE_ADDRESS,
    MAX_TOKEN_DECIMALS, ONE_E18, SYMBOL_DECIMAL_OVERRIDES, TOKEN_ALIASES, WEEK,
};

/// A pre-boundary probe: estimate again at the block `seconds_before_boundary`
/// before the epoch boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbePoint {
    pub label: String,
    pub seconds_before_boundary: u64,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Epoch length in seconds
    pub week: u64,
    /// Denominator of `weight_raw` (ONE_E18)
    pub weight_scale: U256,
    /// Fixed-point scale of reward-per-unit
    pub reward_scale: U256,
    /// Voting escrow contract holding positions
    pub ve_address: Address,
    pub default_decimals: u8,
    /// Permit the default-decimals tier instead of failing the row
    pub allow_default_decimals: bool,
    pub decimal_overrides: HashMap<Address, u8>,
    pub symbol_decimal_overrides: HashMap<String, u8>,
    pub token_aliases: HashMap<Address, String>,
    /// Snapshot TTL; `None` keeps entries for the whole run
    pub cache_ttl_secs: Option<u64>,
    pub probes: Vec<ProbePoint>,
    pub max_concurrent_rows: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            week: WEEK,
            weight_scale: ONE_E18,
            reward_scale: DEFAULT_REWARD_SCALE,
            ve_address: Address::from_str(DEFAULT_VE_ADDRESS).unwrap_or_default(),
            default_decimals: DEFAULT_TOKEN_DECIMALS,
            allow_default_decimals: false,
            decimal_overrides: DECIMAL_OVERRIDES.clone(),
            symbol_decimal_overrides: SYMBOL_DECIMAL_OVERRIDES.clone(),
            token_aliases: TOKEN_ALIASES.clone(),
            cache_ttl_secs: None,
            probes: DEFAULT_PROBES
                .iter()
                .map(|(label, secs)| ProbePoint {
                    label: label.to_string(),
                    seconds_before_boundary: *secs,
                })
                .collect(),
            max_concurrent_rows: DEFAULT_MAX_CONCURRENT_ROWS,
        }
    }
}

/// On-disk shape of the config file; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    week_secs: Option<u64>,
    weight_scale_exp: Option<u8>,
    reward_scale_exp: Option<u8>,
    ve_address: Option<String>,
    default_decimals: Option<u8>,
    allow_default_decimals: Option<bool>,
    #[serde(default)]
    decimal_overrides: HashMap<String, u8>,
    #[serde(default)]
    symbol_decimal_overrides: HashMap<String, u8>,
    #[serde(default)]
    token_aliases: HashMap<String, String>,
    cache_ttl_secs: Option<u64>,
    probes: Option<Vec<ProbePoint>>,
    max_concurrent_rows: Option<usize>,
}

fn parse_address(field: &str, raw: &str) -> EngineResult<Address> {
    Address::from_str(raw.trim())
        .map_err(|e| EngineError::invalid_config(format!("{}: bad address {:?}: {}", field, raw, e)))
}

impl EngineConfig {
    /// Layer a TOML document over the defaults
    pub fn from_toml_str(raw: &str) -> EngineResult<Self> {
        let file: ConfigFile = toml::from_str(raw)?;
        let mut config = Self::default();

        if let Some(week) = file.week_secs {
            config.week = week;
        }
        if let Some(exp) = file.weight_scale_exp {
            config.weight_scale = pow10(exp);
        }
        if let Some(exp) = file.reward_scale_exp {
            config.reward_scale = pow10(exp);
        }
        if let Some(ve) = file.ve_address {
            config.ve_address = parse_address("ve_address", &ve)?;
        }
        if let Some(decimals) = file.default_decimals {
            config.default_decimals = decimals;
        }
        if let Some(allow) = file.allow_default_decimals {
            config.allow_default_decimals = allow;
        }
        for (addr, decimals) in file.decimal_overrides {
            let address = parse_address("decimal_overrides", &addr)?;
            config.decimal_overrides.insert(address, decimals);
        }
        for (symbol, decimals) in file.symbol_decimal_overrides {
            config.symbol_decimal_overrides.insert(symbol, decimals);
        }
        for (addr, symbol) in file.token_aliases {
            let address = parse_address("token_aliases", &addr)?;
            config.token_aliases.insert(address, symbol);
        }
        if file.cache_ttl_secs.is_some() {
            config.cache_ttl_secs = file.cache_ttl_secs;
        }
        if let Some(probes) = file.probes {
            config.probes = probes;
        }
        if let Some(limit) = file.max_concurrent_rows {
            config.max_concurrent_rows = limit;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        info!("⚙️ Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn with_week(mut self, week: u64) -> Self {
        self.week = week;
        self
    }

    pub fn with_reward_scale(mut self, scale: U256) -> Self {
        self.reward_scale = scale;
        self
    }

    pub fn with_allow_default_decimals(mut self, allow: bool) -> Self {
        self.allow_default_decimals = allow;
        self
    }

    pub fn with_cache_ttl(mut self, ttl_secs: Option<u64>) -> Self {
        self.cache_ttl_secs = ttl_secs;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.week == 0 {
            return Err(EngineError::invalid_config("week must be non-zero"));
        }
        if self.weight_scale.is_zero() || self.reward_scale.is_zero() {
            return Err(EngineError::invalid_config("fixed-point scales must be non-zero"));
        }
        if self.default_decimals > MAX_TOKEN_DECIMALS {
            return Err(EngineError::invalid_config(format!(
                "default_decimals {} exceeds {}",
                self.default_decimals, MAX_TOKEN_DECIMALS
            )));
        }
        let bad_override = self
            .decimal_overrides
            .values()
            .chain(self.symbol_decimal_overrides.values())
            .find(|d| **d > MAX_TOKEN_DECIMALS);
        if let Some(decimals) = bad_override {
            return Err(EngineError::invalid_config(format!(
                "decimal override {} exceeds {}",
                decimals, MAX_TOKEN_DECIMALS
            )));
        }
        if self.max_concurrent_rows == 0 {
            return Err(EngineError::invalid_config("max_concurrent_rows must be at least 1"));
        }
        Ok(())
    }
}

/// JSON-RPC transport settings, read from the environment
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub primary_url: String,
    pub fallback_url: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl RpcConfig {
    pub fn new(primary_url: impl Into<String>) -> Self {
        Self {
            primary_url: primary_url.into(),
            fallback_url: None,
            timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
            max_retries: DEFAULT_RPC_MAX_RETRIES,
        }
    }

    /// `RPC_URL` (required), `RPC_FALLBACK_URL`, `RPC_TIMEOUT_SECS`, `RPC_MAX_RETRIES`
    pub fn from_env() -> EngineResult<Self> {
        let primary_url = std::env::var("RPC_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| EngineError::missing_env("RPC_URL"))?;

        let mut config = Self::new(primary_url);
        config.fallback_url = std::env::var("RPC_FALLBACK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        if let Some(secs) = std::env::var("RPC_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()) {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = std::env::var("RPC_MAX_RETRIES").ok().and_then(|s| s.parse().ok()) {
            config.max_retries = retries;
        }
        Ok(config)
    }

    /// Primary URL with any API key path segment hidden
    pub fn masked_url(&self) -> String {
        mask_url(&self.primary_url)
    }
}

/// Hide the key segment of provider URLs such as `.../v2/<key>`
pub fn mask_url(url: &str) -> String {
    match url.split_once("/v2/") {
        Some((base, key)) if !key.is_empty() => format!("{}/v2/***HIDDEN***", base),
        _ => url.to_string(),
    }
}

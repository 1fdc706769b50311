//! RPC Client Module - JSON-RPC transport and RPC-backed state reader
//!
//! 1. Primary endpoint with optional fallback endpoint
//! 2. Exponential backoff with jitter for transport failures and HTTP 429
//! 3. Reverts are never retried: the same call at the same block reverts again
//! 4. Gzip compression and a fixed User-Agent
//!
//! `RpcStateReader` maps engine accessors onto ABI-encoded `eth_call`s.

use alloy_primitives::aliases::U48;
use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::config::{mask_url, RpcConfig};
use crate::models::types::BlockPin;
use crate::providers::chain::{
    Accessor, ChainStateReader, RewardDataRecord, StateErrorKind, StateUnavailable, StateValue,
};
use crate::utils::constants::USER_AGENT as USER_AGENT_CONST;

/// Base retry delay in milliseconds
pub const BASE_RETRY_MS: u64 = 500;

/// Maximum retry delay in milliseconds
pub const MAX_RETRY_MS: u64 = 8_000;

/// Jitter percentage applied to each retry delay
pub const RETRY_JITTER_PERCENT: u64 = 20;

sol! {
    // Voting escrow
    function delegates(uint256 tokenId, uint48 timepoint) external view returns (address);
    function balanceOfNFTAt(uint256 tokenId, uint256 timestamp) external view returns (uint256);
    function getPastVotes(address account, uint256 timestamp) external view returns (uint256);

    // Gauge reward contracts
    function rewardData(address token, uint256 epoch) external view returns (
        uint256 periodFinish,
        uint256 rewardsPerEpoch,
        uint256 lastUpdateTime
    );
    function totalSupplyAt(uint256 epoch) external view returns (uint256);
    function balanceOfOwnerAt(address owner, uint256 epoch) external view returns (uint256);
    function isReward(address token) external view returns (bool);

    // ERC20 metadata
    function decimals() external view returns (uint8);
    function symbol() external view returns (string);
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// Rate limit (code -32005 or message)
    pub fn is_rate_limit(&self) -> bool {
        self.code == -32005 || self.message.to_lowercase().contains("rate limit")
    }

    /// Execution reverted (code 3, or geth-style message on -32000)
    pub fn is_revert(&self) -> bool {
        self.code == 3 || self.message.to_lowercase().contains("execution reverted")
    }
}

/// Why a JSON-RPC call failed
#[derive(Debug, Clone)]
pub enum RpcFailure {
    /// Connection, timeout or non-2xx HTTP status
    Transport(String),
    /// HTTP 429 or a rate-limit error object
    RateLimited,
    /// Node returned an error object
    Node(RpcError),
    /// Response body did not carry a usable result
    InvalidResponse(String),
}

impl RpcFailure {
    pub fn is_revert(&self) -> bool {
        matches!(self, RpcFailure::Node(err) if err.is_revert())
    }

    fn is_retryable(&self) -> bool {
        match self {
            RpcFailure::Transport(_) | RpcFailure::RateLimited => true,
            RpcFailure::Node(err) => err.is_rate_limit(),
            RpcFailure::InvalidResponse(_) => false,
        }
    }

    fn kind(&self) -> StateErrorKind {
        match self {
            RpcFailure::Node(err) if err.is_revert() => StateErrorKind::Reverted,
            RpcFailure::InvalidResponse(_) => StateErrorKind::Decode,
            _ => StateErrorKind::Transport,
        }
    }
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcFailure::Transport(msg) => write!(f, "transport: {}", msg),
            RpcFailure::RateLimited => write!(f, "rate limited (HTTP 429)"),
            RpcFailure::Node(err) => write!(f, "RPC error: {} (code: {})", err.message, err.code),
            RpcFailure::InvalidResponse(msg) => write!(f, "invalid response: {}", msg),
        }
    }
}

impl std::error::Error for RpcFailure {}

/// RPC Provider with retry logic and fallback support
#[derive(Clone)]
pub struct RpcProvider {
    primary_url: String,
    fallback_url: Option<String>,
    client: reqwest::Client,
    max_retries: u32,
}

impl RpcProvider {
    pub fn new(config: &RpcConfig) -> eyre::Result<Self> {
        let client = Self::build_client(config.timeout)?;
        info!("🌐 RPC provider ready ({})", config.masked_url());
        Ok(Self {
            primary_url: config.primary_url.clone(),
            fallback_url: config.fallback_url.clone(),
            client,
            max_retries: config.max_retries.max(1),
        })
    }

    /// Build HTTP client with custom headers and gzip
    fn build_client(timeout: Duration) -> eyre::Result<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| eyre::eyre!("Failed to build HTTP client: {}", e))
    }

    /// Execute a JSON-RPC call against the primary, then the fallback
    pub async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, RpcFailure> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let primary_err = match self.call_with_retry(&self.primary_url, &payload).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };
        // a revert is a property of the call, not the endpoint
        if !primary_err.is_retryable() {
            return Err(primary_err);
        }
        warn!("⚠️ Primary RPC failed for {}: {}", method, primary_err);

        if let Some(ref fallback) = self.fallback_url {
            info!("🔄 Trying fallback RPC {}", mask_url(fallback));
            return self.call_with_retry(fallback, &payload).await;
        }

        Err(primary_err)
    }

    /// Exponential backoff with jitter, retrying only transport-class failures
    async fn call_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<T, RpcFailure> {
        let mut last_error = RpcFailure::Transport("no attempt made".to_string());

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let base_delay = BASE_RETRY_MS * 2_u64.pow(attempt - 1);
                let capped_delay = base_delay.min(MAX_RETRY_MS);
                let jitter_range = (capped_delay * RETRY_JITTER_PERCENT) / 100;
                let jitter: i64 =
                    rand::thread_rng().gen_range(-(jitter_range as i64)..=(jitter_range as i64));
                let final_delay = (capped_delay as i64 + jitter).max(50) as u64;

                debug!(
                    "⏳ Retry {}/{} after {}ms",
                    attempt + 1,
                    self.max_retries,
                    final_delay
                );
                tokio::time::sleep(Duration::from_millis(final_delay)).await;
            }

            match self.execute_call::<T>(url, payload).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() => {
                    if matches!(e, RpcFailure::RateLimited) {
                        warn!("⏳ Rate limited, backing off (attempt {}/{})", attempt + 1, self.max_retries);
                    }
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }

    async fn execute_call<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<T, RpcFailure> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;

        let status = response.status();
        if status == 429 {
            return Err(RpcFailure::RateLimited);
        }
        if !status.is_success() {
            return Err(RpcFailure::Transport(format!("HTTP error: {}", status)));
        }

        let json: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| RpcFailure::InvalidResponse(e.to_string()))?;

        if let Some(error) = json.error {
            if error.is_rate_limit() {
                return Err(RpcFailure::RateLimited);
            }
            return Err(RpcFailure::Node(error));
        }

        json.result
            .ok_or_else(|| RpcFailure::InvalidResponse("no result in response".to_string()))
    }

    /// `eth_call` pinned to `block`, returning raw return data
    pub async fn eth_call(&self, to: Address, data: &[u8], block: BlockPin) -> Result<Vec<u8>, RpcFailure> {
        let params = serde_json::json!([
            { "to": to, "data": format!("0x{}", hex::encode(data)) },
            block.to_rpc_tag()
        ]);
        let hex_result: String = self.call("eth_call", params).await?;
        decode_hex(&hex_result)
    }

    pub async fn block_number(&self) -> Result<u64, RpcFailure> {
        let hex_result: String = self.call("eth_blockNumber", serde_json::json!([])).await?;
        parse_quantity(&hex_result)
    }

    pub async fn block_timestamp(&self, number: u64) -> Result<u64, RpcFailure> {
        #[derive(Deserialize)]
        struct BlockHeader {
            timestamp: String,
        }

        let params = serde_json::json!([BlockPin::Number(number).to_rpc_tag(), false]);
        let header: Option<BlockHeader> = self.call("eth_getBlockByNumber", params).await?;
        let header = header
            .ok_or_else(|| RpcFailure::InvalidResponse(format!("block {} not found", number)))?;
        parse_quantity(&header.timestamp)
    }

    /// Get RPC URL (masked for logging)
    pub fn masked_url(&self) -> String {
        mask_url(&self.primary_url)
    }
}

fn decode_hex(raw: &str) -> Result<Vec<u8>, RpcFailure> {
    hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| RpcFailure::InvalidResponse(format!("bad hex: {}", e)))
}

fn parse_quantity(raw: &str) -> Result<u64, RpcFailure> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| RpcFailure::InvalidResponse(format!("bad quantity {:?}: {}", raw, e)))
}

/// Non-standard tokens return `bytes32` from `symbol()`
fn decode_bytes32_symbol(data: &[u8]) -> Option<String> {
    if data.len() != 32 {
        return None;
    }
    let end = data.iter().position(|b| *b == 0).unwrap_or(32);
    let text = std::str::from_utf8(&data[..end]).ok()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// `ChainStateReader` backed by `eth_call`
#[derive(Clone)]
pub struct RpcStateReader {
    provider: RpcProvider,
}

impl RpcStateReader {
    pub fn new(provider: RpcProvider) -> Self {
        Self { provider }
    }

    pub fn from_config(config: &RpcConfig) -> eyre::Result<Self> {
        Ok(Self::new(RpcProvider::new(config)?))
    }

    fn encode(accessor: &Accessor) -> Vec<u8> {
        match accessor {
            Accessor::Delegates { position_id, epoch } => delegatesCall {
                tokenId: *position_id,
                timepoint: U48::from(*epoch),
            }
            .abi_encode(),
            Accessor::BalanceOfNftAt { position_id, epoch } => balanceOfNFTAtCall {
                tokenId: *position_id,
                timestamp: U256::from(*epoch),
            }
            .abi_encode(),
            Accessor::GetPastVotes { account, epoch } => getPastVotesCall {
                account: *account,
                timestamp: U256::from(*epoch),
            }
            .abi_encode(),
            Accessor::RewardData { token, epoch } => rewardDataCall {
                token: *token,
                epoch: U256::from(*epoch),
            }
            .abi_encode(),
            Accessor::TotalSupplyAt { epoch } => totalSupplyAtCall {
                epoch: U256::from(*epoch),
            }
            .abi_encode(),
            Accessor::BalanceOfOwnerAt { owner, epoch } => balanceOfOwnerAtCall {
                owner: *owner,
                epoch: U256::from(*epoch),
            }
            .abi_encode(),
            Accessor::IsReward { token } => isRewardCall { token: *token }.abi_encode(),
            Accessor::Decimals => decimalsCall {}.abi_encode(),
            Accessor::Symbol => symbolCall {}.abi_encode(),
        }
    }

    fn decode(accessor: &Accessor, data: &[u8]) -> Result<StateValue, alloy_sol_types::Error> {
        let value = match accessor {
            Accessor::Delegates { .. } => {
                StateValue::Address(delegatesCall::abi_decode_returns(data, true)?._0)
            }
            Accessor::BalanceOfNftAt { .. } => {
                StateValue::Uint(balanceOfNFTAtCall::abi_decode_returns(data, true)?._0)
            }
            Accessor::GetPastVotes { .. } => {
                StateValue::Uint(getPastVotesCall::abi_decode_returns(data, true)?._0)
            }
            Accessor::RewardData { .. } => {
                let ret = rewardDataCall::abi_decode_returns(data, true)?;
                StateValue::RewardData(RewardDataRecord {
                    period_finish: ret.periodFinish,
                    rewards_per_epoch: ret.rewardsPerEpoch,
                    last_update_time: ret.lastUpdateTime,
                })
            }
            Accessor::TotalSupplyAt { .. } => {
                StateValue::Uint(totalSupplyAtCall::abi_decode_returns(data, true)?._0)
            }
            Accessor::BalanceOfOwnerAt { .. } => {
                StateValue::Uint(balanceOfOwnerAtCall::abi_decode_returns(data, true)?._0)
            }
            Accessor::IsReward { .. } => {
                StateValue::Bool(isRewardCall::abi_decode_returns(data, true)?._0)
            }
            Accessor::Decimals => {
                StateValue::Uint(U256::from(decimalsCall::abi_decode_returns(data, true)?._0))
            }
            Accessor::Symbol => match symbolCall::abi_decode_returns(data, true) {
                Ok(ret) => StateValue::Text(ret._0),
                Err(e) => match decode_bytes32_symbol(data) {
                    Some(text) => StateValue::Text(text),
                    None => return Err(e),
                },
            },
        };
        Ok(value)
    }
}

impl ChainStateReader for RpcStateReader {
    async fn read(
        &self,
        contract: Address,
        accessor: &Accessor,
        block: BlockPin,
    ) -> Result<StateValue, StateUnavailable> {
        let calldata = Self::encode(accessor);
        let data = self
            .provider
            .eth_call(contract, &calldata, block)
            .await
            .map_err(|e| {
                debug!("📭 {}() on {} failed: {}", accessor.name(), contract, e);
                StateUnavailable::new(contract, accessor.name(), block, e.kind(), e.to_string())
            })?;

        if data.is_empty() {
            // calls to addresses without code return 0x
            return Err(StateUnavailable::new(
                contract,
                accessor.name(),
                block,
                StateErrorKind::Missing,
                "empty return data",
            ));
        }

        Self::decode(accessor, &data).map_err(|e| {
            StateUnavailable::new(contract, accessor.name(), block, StateErrorKind::Decode, e.to_string())
        })
    }

    async fn latest_block(&self) -> Result<u64, StateUnavailable> {
        self.provider.block_number().await.map_err(|e| {
            StateUnavailable::new(Address::ZERO, "eth_blockNumber", BlockPin::Latest, e.kind(), e.to_string())
        })
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, StateUnavailable> {
        self.provider.block_timestamp(number).await.map_err(|e| {
            StateUnavailable::new(
                Address::ZERO,
                "eth_getBlockByNumber",
                BlockPin::Number(number),
                e.kind(),
                e.to_string(),
            )
        })
    }
}

//! Type definitions for the reward engine
//! Epochs, block pins, token metadata, state snapshots and estimate results

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::errors::{EngineError, EngineResult};
use crate::providers::chain::StateErrorKind;
use crate::utils::constants::{raw_to_human, u256_to_f64};

// ============================================
// EPOCHS & BLOCKS
// ============================================

/// WEEK-aligned UNIX timestamp marking a reward/voting cycle boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(u64);

impl Epoch {
    /// Align an arbitrary timestamp down to its epoch boundary
    pub fn align(timestamp: u64, week: u64) -> Self {
        Self((timestamp / week) * week)
    }

    /// Accept only timestamps that already sit on a boundary
    pub fn new(timestamp: u64, week: u64) -> EngineResult<Self> {
        if week == 0 || timestamp % week != 0 {
            return Err(EngineError::invalid_epoch(timestamp, week));
        }
        Ok(Self(timestamp))
    }

    pub fn timestamp(&self) -> u64 {
        self.0
    }

    pub fn next(&self, week: u64) -> Self {
        Self(self.0 + week)
    }

    pub fn is_aligned(&self, week: u64) -> bool {
        week != 0 && self.0 % week == 0
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0 as i64, 0)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{} ({})", self.0, dt.format("%Y-%m-%dT%H:%M:%SZ")),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Block a state read is pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockPin {
    #[default]
    Latest,
    Number(u64),
}

impl BlockPin {
    /// JSON-RPC block tag
    pub fn to_rpc_tag(&self) -> String {
        match self {
            BlockPin::Latest => "latest".to_string(),
            BlockPin::Number(n) => format!("0x{:x}", n),
        }
    }
}

impl fmt::Display for BlockPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockPin::Latest => write!(f, "latest"),
            BlockPin::Number(n) => write!(f, "#{}", n),
        }
    }
}

// ============================================
// GAUGE REWARD CONTRACTS
// ============================================

/// Which of a gauge's two reward contracts a row refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BribeType {
    /// Trading-fee rewards
    Internal,
    /// Third-party incentives
    External,
}

impl BribeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BribeType::Internal => "internal",
            BribeType::External => "external",
        }
    }
}

impl fmt::Display for BribeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// TOKEN METADATA
// ============================================

/// Which tier produced a token's decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenMetadataSource {
    /// Hard-coded override table
    Override,
    /// Live `decimals()` read
    OnChain,
    /// Local metadata cache
    Cached,
    /// Configured default, no confident source
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub source: TokenMetadataSource,
}

impl TokenInfo {
    pub fn to_human(&self, raw: U256) -> f64 {
        raw_to_human(raw, self.decimals)
    }
}

// ============================================
// STATE SNAPSHOTS
// ============================================

/// Delegation state of one position at one epoch, pinned to one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VeDelegationSnapshot {
    pub delegatee: Address,
    pub position_power: U256,
    pub delegatee_total_past_votes: U256,
    /// `floor(power * ONE_E18 / total)`, zero when undelegated
    pub weight_raw: U256,
}

impl VeDelegationSnapshot {
    pub fn new(
        delegatee: Address,
        position_power: U256,
        delegatee_total_past_votes: U256,
        weight_scale: U256,
    ) -> Self {
        let weight_raw = if delegatee == Address::ZERO || delegatee_total_past_votes.is_zero() {
            U256::ZERO
        } else {
            position_power
                .checked_mul(weight_scale)
                .map(|scaled| scaled / delegatee_total_past_votes)
                .unwrap_or(U256::ZERO)
        };
        Self {
            delegatee,
            position_power,
            delegatee_total_past_votes,
            weight_raw,
        }
    }

    /// Position with no delegatee: nothing is attributable
    pub fn undelegated() -> Self {
        Self {
            delegatee: Address::ZERO,
            position_power: U256::ZERO,
            delegatee_total_past_votes: U256::ZERO,
            weight_raw: U256::ZERO,
        }
    }

    pub fn has_delegatee(&self) -> bool {
        self.delegatee != Address::ZERO
    }

    /// Weight as a plain ratio, for display only
    pub fn weight_fraction(&self, weight_scale: U256) -> f64 {
        if weight_scale.is_zero() {
            return 0.0;
        }
        u256_to_f64(self.weight_raw) / u256_to_f64(weight_scale)
    }
}

/// Reward contract state for one token at one epoch, pinned to one block
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BribeContractSnapshot {
    pub rewards_for_epoch_raw: U256,
    pub total_eligible_supply_raw: U256,
    pub delegatee_balance_raw: U256,
}

impl BribeContractSnapshot {
    pub fn zeroed() -> Self {
        Self::default()
    }
}

// ============================================
// ESTIMATE RESULTS
// ============================================

/// Provenance of an expected reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    /// Contract reward rate through the contract formula
    ContractFormula,
    /// Recorded off-chain amount substituted for a missing reward rate
    DbFallback,
    /// Recorded amount times a historical pool vote share
    LegacyShareFallback,
}

impl RewardSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardSource::ContractFormula => "contract_formula",
            RewardSource::DbFallback => "db_fallback",
            RewardSource::LegacyShareFallback => "legacy_share_fallback",
        }
    }

    /// Lower is more authoritative
    pub fn authority_rank(&self) -> u8 {
        match self {
            RewardSource::ContractFormula => 0,
            RewardSource::DbFallback => 1,
            RewardSource::LegacyShareFallback => 2,
        }
    }
}

impl fmt::Display for RewardSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an estimate fell short of the full contract formula.
///
/// This is a defined result, not an error: the estimate still carries an
/// amount (usually zero) and a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InsufficientData {
    /// Position had no delegatee at the epoch
    NoDelegation,
    /// Delegatee exists but the position carries zero weight
    ZeroWeight,
    /// Reward contract recorded zero eligible supply
    ZeroSupply,
    /// Delegatee holds no balance in the reward contract
    ZeroBalance,
    /// Reward rate not finalized and no fallback amount supplied
    NoRewardRate,
    /// A state read failed and its fields were treated as zero
    StateUnavailable {
        accessor: String,
        kind: StateErrorKind,
    },
    /// Fixed-point intermediate exceeded 256 bits
    Overflow,
}

/// Whether an estimate is final (epoch closed) or a pre-boundary prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    #[default]
    Final,
    Predictive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedReward {
    pub pool: String,
    pub bribe_type: BribeType,
    pub token: TokenInfo,
    pub calc_epoch: Epoch,
    pub block: BlockPin,
    pub horizon: Horizon,
    pub raw_amount: U256,
    pub human_amount: f64,
    pub source: RewardSource,
    pub shortfall: Option<InsufficientData>,
}

impl ExpectedReward {
    /// Final contract-formula result with complete inputs
    pub fn is_authoritative(&self) -> bool {
        self.horizon == Horizon::Final
            && self.source == RewardSource::ContractFormula
            && self.shortfall.is_none()
    }

    /// Result degraded because a state read failed
    pub fn hit_unavailable_state(&self) -> bool {
        matches!(self.shortfall, Some(InsufficientData::StateUnavailable { .. }))
    }
}

/// Externally supplied ground truth for one (pool, bribe type, token)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualReceived {
    pub pool: String,
    pub bribe_type: BribeType,
    /// Canonical token symbol
    pub token: String,
    pub human_amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::{ONE_E18, WEEK};

    #[test]
    fn test_epoch_alignment() {
        let epoch = Epoch::align(1_770_854_400 + 12_345, WEEK);
        assert_eq!(epoch.timestamp(), 1_770_854_400);
        assert!(epoch.is_aligned(WEEK));
        assert!(Epoch::new(1_770_854_401, WEEK).is_err());
        assert_eq!(Epoch::new(1_770_854_400, WEEK).unwrap(), epoch);
    }

    #[test]
    fn test_block_pin_rpc_tag() {
        assert_eq!(BlockPin::Latest.to_rpc_tag(), "latest");
        assert_eq!(BlockPin::Number(255).to_rpc_tag(), "0xff");
    }

    #[test]
    fn test_weight_is_floored() {
        let delegatee = Address::repeat_byte(0x11);
        let snap = VeDelegationSnapshot::new(delegatee, U256::from(1), U256::from(3), ONE_E18);
        assert_eq!(snap.weight_raw, U256::from(333_333_333_333_333_333u128));
    }

    #[test]
    fn test_weight_zero_denominator() {
        let delegatee = Address::repeat_byte(0x11);
        let snap = VeDelegationSnapshot::new(delegatee, U256::from(500), U256::ZERO, ONE_E18);
        assert_eq!(snap.weight_raw, U256::ZERO);
    }

    #[test]
    fn test_null_delegatee_has_no_weight() {
        let snap = VeDelegationSnapshot::new(Address::ZERO, U256::from(500), U256::from(5000), ONE_E18);
        assert_eq!(snap.weight_raw, U256::ZERO);
        assert!(!snap.has_delegatee());
    }

    #[test]
    fn test_source_serializes_snake_case() {
        let json = serde_json::to_string(&RewardSource::LegacyShareFallback).unwrap();
        assert_eq!(json, "\"legacy_share_fallback\"");
    }
}

//! Chain state reader contract
//!
//! Every on-chain value the engine needs is read through [`ChainStateReader`]:
//! "read a value from a named accessor on a contract, pinned to a block".
//! The RPC-backed and fixture-backed readers both implement it.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

use crate::models::types::BlockPin;

/// Named view accessors used by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "accessor", rename_all = "snake_case")]
pub enum Accessor {
    /// `delegates(tokenId, timepoint)` on the voting escrow
    Delegates { position_id: U256, epoch: u64 },
    /// `balanceOfNFTAt(tokenId, timestamp)` on the voting escrow
    BalanceOfNftAt { position_id: U256, epoch: u64 },
    /// `getPastVotes(account, timestamp)` on the voting escrow
    GetPastVotes { account: Address, epoch: u64 },
    /// `rewardData(token, epoch)` on a reward contract
    RewardData { token: Address, epoch: u64 },
    /// `totalSupplyAt(epoch)` on a reward contract
    TotalSupplyAt { epoch: u64 },
    /// `balanceOfOwnerAt(owner, epoch)` on a reward contract
    BalanceOfOwnerAt { owner: Address, epoch: u64 },
    /// `isReward(token)` on a reward contract
    IsReward { token: Address },
    /// ERC20 `decimals()`
    Decimals,
    /// ERC20 `symbol()`
    Symbol,
}

impl Accessor {
    /// Solidity function name, used in logs and error reports
    pub fn name(&self) -> &'static str {
        match self {
            Accessor::Delegates { .. } => "delegates",
            Accessor::BalanceOfNftAt { .. } => "balanceOfNFTAt",
            Accessor::GetPastVotes { .. } => "getPastVotes",
            Accessor::RewardData { .. } => "rewardData",
            Accessor::TotalSupplyAt { .. } => "totalSupplyAt",
            Accessor::BalanceOfOwnerAt { .. } => "balanceOfOwnerAt",
            Accessor::IsReward { .. } => "isReward",
            Accessor::Decimals => "decimals",
            Accessor::Symbol => "symbol",
        }
    }
}

/// `rewardData(token, epoch)` return tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RewardDataRecord {
    pub period_finish: U256,
    pub rewards_per_epoch: U256,
    pub last_update_time: U256,
}

/// Decoded accessor result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StateValue {
    Uint(U256),
    Address(Address),
    Bool(bool),
    Text(String),
    RewardData(RewardDataRecord),
}

/// Failure class of a state read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateErrorKind {
    /// The call executed and reverted
    Reverted,
    /// Network, HTTP or node-side failure
    Transport,
    /// Return data did not match the expected ABI shape
    Decode,
    /// The reader has no value for this accessor
    Missing,
}

/// A requested on-chain value could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateUnavailable {
    pub contract: Address,
    pub accessor: &'static str,
    pub block: BlockPin,
    pub kind: StateErrorKind,
    pub reason: String,
}

impl StateUnavailable {
    pub fn new(
        contract: Address,
        accessor: &'static str,
        block: BlockPin,
        kind: StateErrorKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            contract,
            accessor,
            block,
            kind,
            reason: reason.into(),
        }
    }

    pub fn is_revert(&self) -> bool {
        self.kind == StateErrorKind::Reverted
    }

    fn unexpected(contract: Address, accessor: &'static str, block: BlockPin, got: &StateValue) -> Self {
        Self::new(
            contract,
            accessor,
            block,
            StateErrorKind::Decode,
            format!("unexpected value shape {:?}", got),
        )
    }
}

impl fmt::Display for StateUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}() on {} at {} unavailable ({:?}): {}",
            self.accessor, self.contract, self.block, self.kind, self.reason
        )
    }
}

impl std::error::Error for StateUnavailable {}

/// Read access to historical contract state.
///
/// Implementations own their own transport policy (timeouts, retries,
/// endpoint fallback). The engine never retries a failed read.
pub trait ChainStateReader: Send + Sync {
    /// Read one accessor on `contract`, pinned to `block`
    fn read(
        &self,
        contract: Address,
        accessor: &Accessor,
        block: BlockPin,
    ) -> impl Future<Output = Result<StateValue, StateUnavailable>> + Send;

    /// Current head block number
    fn latest_block(&self) -> impl Future<Output = Result<u64, StateUnavailable>> + Send;

    /// Timestamp of block `number`
    fn block_timestamp(&self, number: u64)
        -> impl Future<Output = Result<u64, StateUnavailable>> + Send;

    fn read_uint(
        &self,
        contract: Address,
        accessor: &Accessor,
        block: BlockPin,
    ) -> impl Future<Output = Result<U256, StateUnavailable>> + Send {
        async move {
            match self.read(contract, accessor, block).await? {
                StateValue::Uint(value) => Ok(value),
                other => Err(StateUnavailable::unexpected(contract, accessor.name(), block, &other)),
            }
        }
    }

    fn read_address(
        &self,
        contract: Address,
        accessor: &Accessor,
        block: BlockPin,
    ) -> impl Future<Output = Result<Address, StateUnavailable>> + Send {
        async move {
            match self.read(contract, accessor, block).await? {
                StateValue::Address(value) => Ok(value),
                other => Err(StateUnavailable::unexpected(contract, accessor.name(), block, &other)),
            }
        }
    }

    fn read_bool(
        &self,
        contract: Address,
        accessor: &Accessor,
        block: BlockPin,
    ) -> impl Future<Output = Result<bool, StateUnavailable>> + Send {
        async move {
            match self.read(contract, accessor, block).await? {
                StateValue::Bool(value) => Ok(value),
                other => Err(StateUnavailable::unexpected(contract, accessor.name(), block, &other)),
            }
        }
    }

    fn read_text(
        &self,
        contract: Address,
        accessor: &Accessor,
        block: BlockPin,
    ) -> impl Future<Output = Result<String, StateUnavailable>> + Send {
        async move {
            match self.read(contract, accessor, block).await? {
                StateValue::Text(value) => Ok(value),
                other => Err(StateUnavailable::unexpected(contract, accessor.name(), block, &other)),
            }
        }
    }

    fn read_reward_data(
        &self,
        contract: Address,
        accessor: &Accessor,
        block: BlockPin,
    ) -> impl Future<Output = Result<RewardDataRecord, StateUnavailable>> + Send {
        async move {
            match self.read(contract, accessor, block).await? {
                StateValue::RewardData(value) => Ok(value),
                other => Err(StateUnavailable::unexpected(contract, accessor.name(), block, &other)),
            }
        }
    }
}

impl<R: ChainStateReader> ChainStateReader for std::sync::Arc<R> {
    fn read(
        &self,
        contract: Address,
        accessor: &Accessor,
        block: BlockPin,
    ) -> impl Future<Output = Result<StateValue, StateUnavailable>> + Send {
        (**self).read(contract, accessor, block)
    }

    fn latest_block(&self) -> impl Future<Output = Result<u64, StateUnavailable>> + Send {
        (**self).latest_block()
    }

    fn block_timestamp(&self, number: u64)
        -> impl Future<Output = Result<u64, StateUnavailable>> + Send {
        (**self).block_timestamp(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessor_names_match_solidity() {
        let acc = Accessor::BalanceOfNftAt {
            position_id: U256::from(7),
            epoch: 604_800,
        };
        assert_eq!(acc.name(), "balanceOfNFTAt");
        assert_eq!(Accessor::Decimals.name(), "decimals");
    }

    #[test]
    fn test_accessor_json_shape() {
        let acc = Accessor::TotalSupplyAt { epoch: 604_800 };
        let json = serde_json::to_value(&acc).unwrap();
        assert_eq!(json["accessor"], "total_supply_at");
        assert_eq!(json["epoch"], 604_800);
        let back: Accessor = serde_json::from_value(json).unwrap();
        assert_eq!(back, acc);
    }

    #[test]
    fn test_state_unavailable_display() {
        let err = StateUnavailable::new(
            Address::ZERO,
            "rewardData",
            BlockPin::Number(10),
            StateErrorKind::Transport,
            "timeout",
        );
        assert!(!err.is_revert());
        let text = err.to_string();
        assert!(text.contains("rewardData()"));
        assert!(text.contains("#10"));
    }
}

//! In-memory chain state for offline replays and tests
//!
//! Values are keyed by `(contract, accessor)` with an optional block pin. A
//! read pinned to a block prefers the value recorded for that block and falls
//! back to the unpinned value.

use alloy_primitives::{Address, U256};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use crate::models::errors::EngineResult;
use crate::models::types::BlockPin;
use crate::providers::chain::{
    Accessor, ChainStateReader, RewardDataRecord, StateErrorKind, StateUnavailable, StateValue,
};

type ValueKey = (Address, Accessor, Option<u64>);

#[derive(Debug, Default)]
pub struct FixtureStateReader {
    values: HashMap<ValueKey, StateValue>,
    /// (contract, accessor name) pairs that always fail
    failures: HashMap<(Address, String), StateErrorKind>,
    /// block number -> timestamp
    blocks: BTreeMap<u64, u64>,
    reads: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    values: Vec<FixtureValue>,
    #[serde(default)]
    failures: Vec<FixtureFailure>,
    #[serde(default)]
    blocks: BTreeMap<u64, u64>,
}

#[derive(Debug, Deserialize)]
struct FixtureValue {
    contract: Address,
    accessor: Accessor,
    #[serde(default)]
    block: Option<u64>,
    value: StateValue,
}

#[derive(Debug, Deserialize)]
struct FixtureFailure {
    contract: Address,
    accessor: String,
    kind: StateErrorKind,
}

impl FixtureStateReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        let file: FixtureFile = serde_json::from_str(raw)?;
        let mut reader = Self::new();
        for entry in file.values {
            reader.values.insert((entry.contract, entry.accessor, entry.block), entry.value);
        }
        for failure in file.failures {
            reader.failures.insert((failure.contract, failure.accessor), failure.kind);
        }
        reader.blocks = file.blocks;
        Ok(reader)
    }

    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let reader = Self::from_json_str(&std::fs::read_to_string(path)?)?;
        info!(
            "📦 Loaded state fixture from {} ({} values, {} blocks)",
            path.display(),
            reader.values.len(),
            reader.blocks.len()
        );
        Ok(reader)
    }

    /// Record a value served at every block
    pub fn set(&mut self, contract: Address, accessor: Accessor, value: StateValue) -> &mut Self {
        self.values.insert((contract, accessor, None), value);
        self
    }

    /// Record a value served only at `block`
    pub fn set_at(&mut self, contract: Address, accessor: Accessor, block: u64, value: StateValue) -> &mut Self {
        self.values.insert((contract, accessor, Some(block)), value);
        self
    }

    pub fn set_uint(&mut self, contract: Address, accessor: Accessor, value: U256) -> &mut Self {
        self.set(contract, accessor, StateValue::Uint(value))
    }

    pub fn set_reward_rate(&mut self, bribe: Address, token: Address, epoch: u64, rewards: U256) -> &mut Self {
        self.set(
            bribe,
            Accessor::RewardData { token, epoch },
            StateValue::RewardData(RewardDataRecord {
                period_finish: U256::from(epoch),
                rewards_per_epoch: rewards,
                last_update_time: U256::from(epoch),
            }),
        )
    }

    pub fn set_token(&mut self, token: Address, symbol: &str, decimals: u8) -> &mut Self {
        self.set(token, Accessor::Symbol, StateValue::Text(symbol.to_string()));
        self.set_uint(token, Accessor::Decimals, U256::from(decimals))
    }

    /// Make every `accessor_name` read on `contract` fail with `kind`
    pub fn fail(&mut self, contract: Address, accessor_name: &str, kind: StateErrorKind) -> &mut Self {
        self.failures.insert((contract, accessor_name.to_string()), kind);
        self
    }

    pub fn set_block(&mut self, number: u64, timestamp: u64) -> &mut Self {
        self.blocks.insert(number, timestamp);
        self
    }

    /// Number of `read` calls served so far, failed ones included
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    fn lookup(&self, contract: Address, accessor: &Accessor, block: BlockPin) -> Result<StateValue, StateUnavailable> {
        let name = accessor.name();
        if let Some(kind) = self.failures.get(&(contract, name.to_string())) {
            return Err(StateUnavailable::new(contract, name, block, *kind, "injected failure"));
        }

        let pinned = match block {
            BlockPin::Number(n) => self.values.get(&(contract, accessor.clone(), Some(n))),
            BlockPin::Latest => None,
        };
        pinned
            .or_else(|| self.values.get(&(contract, accessor.clone(), None)))
            .cloned()
            .ok_or_else(|| {
                StateUnavailable::new(contract, name, block, StateErrorKind::Missing, "no fixture value")
            })
    }
}

impl ChainStateReader for FixtureStateReader {
    async fn read(
        &self,
        contract: Address,
        accessor: &Accessor,
        block: BlockPin,
    ) -> Result<StateValue, StateUnavailable> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.lookup(contract, accessor, block)
    }

    async fn latest_block(&self) -> Result<u64, StateUnavailable> {
        self.blocks.keys().next_back().copied().ok_or_else(|| {
            StateUnavailable::new(
                Address::ZERO,
                "eth_blockNumber",
                BlockPin::Latest,
                StateErrorKind::Missing,
                "fixture has no blocks",
            )
        })
    }

    /// Sparse block tables behave as a step function: a block between two
    /// recorded blocks reports the timestamp of the lower one
    async fn block_timestamp(&self, number: u64) -> Result<u64, StateUnavailable> {
        self.blocks.range(..=number).next_back().map(|(_, ts)| *ts).ok_or_else(|| {
            StateUnavailable::new(
                Address::ZERO,
                "eth_getBlockByNumber",
                BlockPin::Number(number),
                StateErrorKind::Missing,
                "block not in fixture",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pinned_value_preferred() {
        let bribe = Address::repeat_byte(0xbb);
        let acc = Accessor::TotalSupplyAt { epoch: 604_800 };
        let mut reader = FixtureStateReader::new();
        reader
            .set_uint(bribe, acc.clone(), U256::from(10))
            .set_at(bribe, acc.clone(), 99, StateValue::Uint(U256::from(7)));

        let pinned = reader.read_uint(bribe, &acc, BlockPin::Number(99)).await.unwrap();
        let other = reader.read_uint(bribe, &acc, BlockPin::Number(100)).await.unwrap();
        assert_eq!(pinned, U256::from(7));
        assert_eq!(other, U256::from(10));
        assert_eq!(reader.read_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let bribe = Address::repeat_byte(0xbb);
        let mut reader = FixtureStateReader::new();
        reader.fail(bribe, "rewardData", StateErrorKind::Reverted);

        let err = reader
            .read(bribe, &Accessor::RewardData { token: Address::ZERO, epoch: 0 }, BlockPin::Latest)
            .await
            .unwrap_err();
        assert!(err.is_revert());
        assert_eq!(err.accessor, "rewardData");
    }

    #[tokio::test]
    async fn test_from_json() {
        let raw = r#"{
            "values": [
                {
                    "contract": "0x1111111111111111111111111111111111111111",
                    "accessor": { "accessor": "decimals" },
                    "value": { "type": "uint", "value": "0x6" }
                }
            ],
            "failures": [
                {
                    "contract": "0x1111111111111111111111111111111111111111",
                    "accessor": "symbol",
                    "kind": "transport"
                }
            ],
            "blocks": { "100": 1700000000, "101": 1700000002 }
        }"#;
        let reader = FixtureStateReader::from_json_str(raw).unwrap();
        let token = Address::repeat_byte(0x11);
        let decimals = reader.read_uint(token, &Accessor::Decimals, BlockPin::Latest).await.unwrap();
        assert_eq!(decimals, U256::from(6));
        assert!(reader.read(token, &Accessor::Symbol, BlockPin::Latest).await.is_err());
        assert_eq!(reader.latest_block().await.unwrap(), 101);
        assert_eq!(reader.block_timestamp(100).await.unwrap(), 1_700_000_000);
        assert_eq!(reader.block_timestamp(150).await.unwrap(), 1_700_000_002);
        assert!(reader.block_timestamp(99).await.is_err());
    }
}

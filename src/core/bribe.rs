//! Reward contract state snapshots

use alloy_primitives::Address;
use std::sync::Arc;
use tracing::debug;

use crate::models::types::{BlockPin, BribeContractSnapshot, Epoch};
use crate::providers::chain::{Accessor, ChainStateReader, StateUnavailable};
use crate::utils::cache::{BribeSnapshotKey, SnapshotCache};

/// Reads a reward contract's epoch reward rate, eligible supply and the
/// delegatee's balance, all pinned to one block
pub struct BribeContractStateResolver<R> {
    reader: Arc<R>,
    cache: SnapshotCache<BribeSnapshotKey, BribeContractSnapshot>,
}

impl<R: ChainStateReader> BribeContractStateResolver<R> {
    pub fn new(reader: Arc<R>, cache_ttl_secs: Option<u64>) -> Self {
        Self {
            reader,
            cache: SnapshotCache::with_ttl("bribe_snapshot", cache_ttl_secs),
        }
    }

    pub async fn resolve(
        &self,
        bribe: Address,
        token: Address,
        delegatee: Address,
        calc_epoch: Epoch,
        block: BlockPin,
    ) -> Result<BribeContractSnapshot, StateUnavailable> {
        let key = BribeSnapshotKey {
            bribe,
            token,
            calc_epoch,
            delegatee,
            block,
        };
        self.cache
            .get_or_try_compute(key, || self.read_snapshot(bribe, token, delegatee, calc_epoch, block))
            .await
    }

    async fn read_snapshot(
        &self,
        bribe: Address,
        token: Address,
        delegatee: Address,
        calc_epoch: Epoch,
        block: BlockPin,
    ) -> Result<BribeContractSnapshot, StateUnavailable> {
        let epoch = calc_epoch.timestamp();
        let reward_data = self
            .reader
            .read_reward_data(bribe, &Accessor::RewardData { token, epoch }, block)
            .await?;
        let supply = self
            .reader
            .read_uint(bribe, &Accessor::TotalSupplyAt { epoch }, block)
            .await?;
        let balance = self
            .reader
            .read_uint(
                bribe,
                &Accessor::BalanceOfOwnerAt {
                    owner: delegatee,
                    epoch,
                },
                block,
            )
            .await?;

        debug!(
            "🎁 {} token {} @ {}: rewards={} supply={} balance={}",
            bribe, token, block, reward_data.rewards_per_epoch, supply, balance
        );
        Ok(BribeContractSnapshot {
            rewards_for_epoch_raw: reward_data.rewards_per_epoch,
            total_eligible_supply_raw: supply,
            delegatee_balance_raw: balance,
        })
    }

    /// Whether `token` is registered as a reward on `bribe`
    pub async fn is_reward(&self, bribe: Address, token: Address, block: BlockPin) -> Result<bool, StateUnavailable> {
        self.reader
            .read_bool(bribe, &Accessor::IsReward { token }, block)
            .await
    }

    pub fn cache(&self) -> &SnapshotCache<BribeSnapshotKey, BribeContractSnapshot> {
        &self.cache
    }
}

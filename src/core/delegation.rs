//! Voting escrow delegation snapshots

use alloy_primitives::{Address, U256};
use std::sync::Arc;
use tracing::debug;

use crate::models::types::{BlockPin, Epoch, VeDelegationSnapshot};
use crate::providers::chain::{Accessor, ChainStateReader, StateUnavailable};
use crate::utils::cache::{SnapshotCache, VeSnapshotKey};

/// Resolves who a position delegated to at an epoch and what share of the
/// delegatee's votes it carries
pub struct VeDelegationResolver<R> {
    reader: Arc<R>,
    ve: Address,
    weight_scale: U256,
    cache: SnapshotCache<VeSnapshotKey, VeDelegationSnapshot>,
}

impl<R: ChainStateReader> VeDelegationResolver<R> {
    pub fn new(reader: Arc<R>, ve: Address, weight_scale: U256, cache_ttl_secs: Option<u64>) -> Self {
        Self {
            reader,
            ve,
            weight_scale,
            cache: SnapshotCache::with_ttl("ve_snapshot", cache_ttl_secs),
        }
    }

    pub async fn resolve(
        &self,
        position_id: U256,
        calc_epoch: Epoch,
        block: BlockPin,
    ) -> Result<VeDelegationSnapshot, StateUnavailable> {
        let key = VeSnapshotKey {
            position_id,
            calc_epoch,
            block,
        };
        self.cache
            .get_or_try_compute(key, || self.read_snapshot(position_id, calc_epoch, block))
            .await
    }

    async fn read_snapshot(
        &self,
        position_id: U256,
        calc_epoch: Epoch,
        block: BlockPin,
    ) -> Result<VeDelegationSnapshot, StateUnavailable> {
        let epoch = calc_epoch.timestamp();
        let delegatee = self
            .reader
            .read_address(self.ve, &Accessor::Delegates { position_id, epoch }, block)
            .await?;
        if delegatee == Address::ZERO {
            debug!("🗳️ Position {} undelegated at {}", position_id, calc_epoch);
            return Ok(VeDelegationSnapshot::undelegated());
        }

        let power = self
            .reader
            .read_uint(self.ve, &Accessor::BalanceOfNftAt { position_id, epoch }, block)
            .await?;
        let total = self
            .reader
            .read_uint(
                self.ve,
                &Accessor::GetPastVotes {
                    account: delegatee,
                    epoch,
                },
                block,
            )
            .await?;

        let snapshot = VeDelegationSnapshot::new(delegatee, power, total, self.weight_scale);
        debug!(
            "🗳️ Position {} -> {} power={} total={} weight_raw={}",
            position_id, delegatee, power, total, snapshot.weight_raw
        );
        Ok(snapshot)
    }

    pub fn cache(&self) -> &SnapshotCache<VeSnapshotKey, VeDelegationSnapshot> {
        &self.cache
    }
}

//! Timestamp to block resolution for pre-boundary probes

use tracing::debug;

use crate::models::errors::{EngineError, EngineResult};
use crate::providers::chain::ChainStateReader;
use crate::utils::cache::SnapshotCache;

/// Finds the first block whose timestamp is at or after a target time.
///
/// Block timestamps are monotonic, so a binary search over `[floor, head]`
/// needs `O(log n)` header reads. Timestamps are memoized per block.
pub struct BlockLocator<'a, R> {
    reader: &'a R,
    floor: u64,
    timestamps: SnapshotCache<u64, u64>,
}

impl<'a, R: ChainStateReader> BlockLocator<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self {
            reader,
            floor: 0,
            timestamps: SnapshotCache::new("block_ts"),
        }
    }

    /// Lowest block the search may return
    pub fn with_floor(mut self, floor: u64) -> Self {
        self.floor = floor;
        self
    }

    async fn timestamp(&self, number: u64) -> EngineResult<u64> {
        let ts = self
            .timestamps
            .get_or_try_compute(number, || self.reader.block_timestamp(number))
            .await?;
        Ok(ts)
    }

    /// First block with `timestamp >= target`
    pub async fn block_at_or_after(&self, target: u64) -> EngineResult<u64> {
        let head = self.reader.latest_block().await?;
        if head < self.floor || self.timestamp(head).await? < target {
            return Err(EngineError::block_not_found(target));
        }

        let (mut lo, mut hi) = (self.floor, head);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.timestamp(mid).await? >= target {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        debug!("🔎 Block #{} is first at or after ts {}", lo, target);
        Ok(lo)
    }
}

//! Batch evaluation of one position's rows for a closed epoch
//!
//! Each row is estimated once at the latest block (final) and once per
//! pre-boundary probe (predictive). Rows fail independently; the batch never
//! aborts because of one row.

use alloy_primitives::{Address, U256};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::estimator::{EstimateRequest, RewardEstimator};
use crate::core::metadata::TokenMetadataStore;
use crate::core::reconcile::{PriceBook, ReconciliationReporter, ReconciliationRow, ReconciliationSummary};
use crate::models::config::EngineConfig;
use crate::models::errors::EngineResult;
use crate::models::types::{ActualReceived, BlockPin, BribeType, Epoch, ExpectedReward, Horizon, InsufficientData};
use crate::providers::blocks::BlockLocator;
use crate::providers::chain::{ChainStateReader, StateErrorKind};
use crate::utils::cache::CacheStats;

/// One (pool, reward contract, token) line of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRow {
    pub pool: String,
    pub bribe_type: BribeType,
    pub bribe_contract: Address,
    pub token: Address,
    #[serde(default)]
    pub fallback_amount: Option<f64>,
    #[serde(default)]
    pub legacy_pool_share: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub position_id: U256,
    /// Timestamp inside (or at the start of) the epoch whose votes are paid
    pub closed_epoch: u64,
    pub rows: Vec<BatchRow>,
    #[serde(default)]
    pub actual: Vec<ActualReceived>,
    /// USD price per token symbol
    #[serde(default)]
    pub prices: HashMap<String, f64>,
}

impl BatchJob {
    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Estimated,
    /// `isReward(token)` returned false on the reward contract
    NotRewardToken,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeBlock {
    pub label: String,
    pub seconds_before_boundary: u64,
    /// `None` when no block could be located
    pub block: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub label: String,
    pub block: Option<u64>,
    /// `None` when the probe could not be evaluated
    pub estimate: Option<ExpectedReward>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub pool: String,
    pub bribe_type: BribeType,
    pub token: Address,
    pub status: RowStatus,
    pub final_estimate: Option<ExpectedReward>,
    pub probes: Vec<ProbeOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCounts {
    /// Final estimates degraded by a reverted call
    pub reverted: usize,
    /// Final estimates degraded by a transport failure
    pub transport: usize,
    /// Final estimates degraded by missing or undecodable state
    pub other_state: usize,
    /// Rows that produced no estimate at all
    pub failed_rows: usize,
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub position_id: U256,
    pub calc_epoch: Epoch,
    pub probes: Vec<ProbeBlock>,
    pub rows: Vec<RowOutcome>,
    pub reconciliation: Vec<ReconciliationRow>,
    pub summary: ReconciliationSummary,
    pub failures: FailureCounts,
    pub cache: Vec<CacheStats>,
}

pub struct BatchRunner<R> {
    reader: Arc<R>,
    estimator: RewardEstimator<R>,
    config: Arc<EngineConfig>,
}

impl<R: ChainStateReader> BatchRunner<R> {
    pub fn new(reader: Arc<R>, store: Arc<dyn TokenMetadataStore>, config: Arc<EngineConfig>) -> EngineResult<Self> {
        let estimator = RewardEstimator::new(reader.clone(), store, config.clone())?;
        Ok(Self {
            reader,
            estimator,
            config,
        })
    }

    pub fn estimator(&self) -> &RewardEstimator<R> {
        &self.estimator
    }

    pub async fn run(&self, job: &BatchJob) -> EngineResult<BatchReport> {
        let calc_epoch = Epoch::align(job.closed_epoch, self.config.week);
        if calc_epoch.timestamp() != job.closed_epoch {
            debug!("📅 Aligned closed epoch {} down to {}", job.closed_epoch, calc_epoch);
        }
        info!(
            "🚀 Batch: position {} epoch {} ({} rows, {} probes)",
            job.position_id,
            calc_epoch,
            job.rows.len(),
            self.config.probes.len()
        );

        let probes = self.locate_probe_blocks(calc_epoch).await;

        let outcomes: Vec<RowOutcome> = stream::iter(job.rows.iter())
            .map(|row| self.run_row(job.position_id, calc_epoch, row, &probes))
            .buffered(self.config.max_concurrent_rows)
            .collect()
            .await;

        let expected: Vec<ExpectedReward> = outcomes
            .iter()
            .filter_map(|outcome| outcome.final_estimate.clone())
            .collect();
        let reporter = ReconciliationReporter::new(PriceBook::from(job.prices.clone()));
        let reconciliation = reporter.reconcile(&expected, &job.actual);
        let summary = reporter.summarize(&reconciliation);
        let failures = count_failures(&outcomes);

        if failures.failed_rows > 0 || failures.reverted + failures.transport + failures.other_state > 0 {
            warn!(
                "⚠️ Batch finished with {} failed rows, {} reverted, {} transport, {} other state",
                failures.failed_rows, failures.reverted, failures.transport, failures.other_state
            );
        }

        Ok(BatchReport {
            position_id: job.position_id,
            calc_epoch,
            probes,
            rows: outcomes,
            reconciliation,
            summary,
            failures,
            cache: self.estimator.cache_stats(),
        })
    }

    /// Pin each probe to the first block at or after `boundary - offset`
    async fn locate_probe_blocks(&self, calc_epoch: Epoch) -> Vec<ProbeBlock> {
        let boundary = calc_epoch.next(self.config.week).timestamp();
        let locator = BlockLocator::new(self.reader.as_ref());
        let mut located = Vec::with_capacity(self.config.probes.len());

        for probe in &self.config.probes {
            let target = boundary.saturating_sub(probe.seconds_before_boundary);
            let block = match locator.block_at_or_after(target).await {
                Ok(block) => Some(block),
                Err(e) => {
                    warn!("⚠️ No block for probe {} (ts {}): {}", probe.label, target, e);
                    None
                }
            };
            located.push(ProbeBlock {
                label: probe.label.clone(),
                seconds_before_boundary: probe.seconds_before_boundary,
                block,
            });
        }
        located
    }

    async fn run_row(
        &self,
        position_id: U256,
        calc_epoch: Epoch,
        row: &BatchRow,
        probes: &[ProbeBlock],
    ) -> RowOutcome {
        let mut outcome = RowOutcome {
            pool: row.pool.clone(),
            bribe_type: row.bribe_type,
            token: row.token,
            status: RowStatus::Estimated,
            final_estimate: None,
            probes: Vec::with_capacity(probes.len()),
            error: None,
        };

        match self
            .estimator
            .bribes()
            .is_reward(row.bribe_contract, row.token, BlockPin::Latest)
            .await
        {
            Ok(false) => {
                info!("⏭️ {} {}: {} is not a reward token", row.pool, row.bribe_type, row.token);
                outcome.status = RowStatus::NotRewardToken;
                return outcome;
            }
            Ok(true) => {}
            Err(e) => debug!("📭 isReward probe failed, assuming eligible: {}", e),
        }

        let request = |block: BlockPin, horizon: Horizon| EstimateRequest {
            position_id,
            pool: row.pool.clone(),
            bribe_type: row.bribe_type,
            bribe: row.bribe_contract,
            token: row.token,
            calc_epoch,
            block,
            horizon,
            fallback_amount: row.fallback_amount,
            legacy_pool_share: row.legacy_pool_share,
        };

        match self.estimator.estimate(&request(BlockPin::Latest, Horizon::Final)).await {
            Ok(estimate) => outcome.final_estimate = Some(estimate),
            Err(e) => {
                warn!("❌ {} {} token {}: {}", row.pool, row.bribe_type, row.token, e);
                outcome.status = RowStatus::Failed;
                outcome.error = Some(e.to_string());
                return outcome;
            }
        }

        for probe in probes {
            let estimate = match probe.block {
                Some(block) => {
                    match self
                        .estimator
                        .estimate(&request(BlockPin::Number(block), Horizon::Predictive))
                        .await
                    {
                        Ok(estimate) if estimate.hit_unavailable_state() => None,
                        Ok(estimate) => Some(estimate),
                        Err(e) => {
                            debug!("📭 Probe {} for {} failed: {}", probe.label, row.pool, e);
                            None
                        }
                    }
                }
                None => None,
            };
            outcome.probes.push(ProbeOutcome {
                label: probe.label.clone(),
                block: probe.block,
                estimate,
            });
        }

        outcome
    }
}

fn count_failures(outcomes: &[RowOutcome]) -> FailureCounts {
    let mut counts = FailureCounts::default();
    for outcome in outcomes {
        match outcome.status {
            RowStatus::Failed => counts.failed_rows += 1,
            RowStatus::NotRewardToken => counts.skipped_rows += 1,
            RowStatus::Estimated => {}
        }
        let shortfall = outcome.final_estimate.as_ref().and_then(|e| e.shortfall.as_ref());
        if let Some(InsufficientData::StateUnavailable { kind, .. }) = shortfall {
            match kind {
                StateErrorKind::Reverted => counts.reverted += 1,
                StateErrorKind::Transport => counts.transport += 1,
                StateErrorKind::Decode | StateErrorKind::Missing => counts.other_state += 1,
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_from_json() {
        let raw = r#"{
            "position_id": "0x4a9a",
            "closed_epoch": 1770854400,
            "rows": [
                {
                    "pool": "HYDX/USDC",
                    "bribe_type": "external",
                    "bribe_contract": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
                    "token": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
                    "fallback_amount": 120.5
                }
            ],
            "actual": [
                { "pool": "HYDX/USDC", "bribe_type": "external", "token": "USDC", "human_amount": 3.2 }
            ],
            "prices": { "USDC": 1.0 }
        }"#;
        let job = BatchJob::from_json_str(raw).unwrap();
        assert_eq!(job.position_id, U256::from(19_098));
        assert_eq!(job.rows[0].bribe_type, BribeType::External);
        assert_eq!(job.rows[0].legacy_pool_share, None);
        assert_eq!(job.actual.len(), 1);
    }

    #[test]
    fn test_count_failures() {
        let outcome = |status| RowOutcome {
            pool: "A".into(),
            bribe_type: BribeType::Internal,
            token: Address::ZERO,
            status,
            final_estimate: None,
            probes: vec![],
            error: None,
        };
        let counts = count_failures(&[
            outcome(RowStatus::Failed),
            outcome(RowStatus::NotRewardToken),
            outcome(RowStatus::Estimated),
        ]);
        assert_eq!(counts.failed_rows, 1);
        assert_eq!(counts.skipped_rows, 1);
        assert_eq!(counts.reverted, 0);
    }
}

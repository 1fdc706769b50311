//! Reward estimation
//!
//! Reproduces the reward contract's integer arithmetic exactly:
//!
//! ```text
//! rpu    = floor(rewards * SCALE / supply)      (supply == 0 -> rewards * SCALE)
//! reward = floor(rpu * balance / SCALE)
//! reward = floor(reward * weight / ONE_E18)
//! ```
//!
//! and degrades through two fallbacks when the contract formula has nothing
//! to work with:
//!   1. zero reward rate + recorded amount -> recorded amount becomes the rate
//!   2. no usable share + recorded amount + historical pool share -> amount * share
//!
//! The second fallback only covers a missing supply or balance, or state that
//! could not be read. A position read as undelegated or weightless is zero.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::bribe::BribeContractStateResolver;
use crate::core::delegation::VeDelegationResolver;
use crate::core::metadata::{TokenMetadataResolver, TokenMetadataStore};
use crate::models::config::EngineConfig;
use crate::models::errors::{EngineError, EngineResult};
use crate::models::types::{
    BlockPin, BribeContractSnapshot, BribeType, Epoch, ExpectedReward, Horizon, InsufficientData,
    RewardSource, TokenInfo, VeDelegationSnapshot,
};
use crate::providers::chain::{ChainStateReader, StateUnavailable};
use crate::utils::cache::CacheStats;
use crate::utils::constants::human_to_raw;

/// One (position, pool, reward contract, token, epoch, block) evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateRequest {
    pub position_id: U256,
    pub pool: String,
    pub bribe_type: BribeType,
    pub bribe: Address,
    pub token: Address,
    pub calc_epoch: Epoch,
    #[serde(default)]
    pub block: BlockPin,
    #[serde(default)]
    pub horizon: Horizon,
    /// Recorded bribe amount (human units) used when the reward rate is zero
    #[serde(default)]
    pub fallback_amount: Option<f64>,
    /// Historical share of the pool's votes, for the legacy estimator
    #[serde(default)]
    pub legacy_pool_share: Option<f64>,
}

/// Fixed-point contract formula. `None` if an intermediate overflows.
pub fn contract_formula(
    baseline_raw: U256,
    supply_raw: U256,
    balance_raw: U256,
    weight_raw: U256,
    reward_scale: U256,
    weight_scale: U256,
) -> Option<U256> {
    let scaled = baseline_raw.checked_mul(reward_scale)?;
    let reward_per_unit = if supply_raw.is_zero() {
        scaled
    } else {
        scaled / supply_raw
    };
    let reward = reward_per_unit.checked_mul(balance_raw)? / reward_scale;
    Some(reward.checked_mul(weight_raw)? / weight_scale)
}

/// Result of running the formula and fallbacks over resolved state
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub raw_amount: U256,
    pub human_amount: f64,
    pub source: RewardSource,
    pub shortfall: Option<InsufficientData>,
}

/// Pure evaluation over snapshots; no I/O.
///
/// `unavailable` names a read that failed while producing the snapshots, in
/// which case its snapshot arrives zeroed.
pub fn evaluate(
    token: &TokenInfo,
    ve: &VeDelegationSnapshot,
    bribe: &BribeContractSnapshot,
    fallback_amount: Option<f64>,
    legacy_pool_share: Option<f64>,
    unavailable: Option<&StateUnavailable>,
    config: &EngineConfig,
) -> Evaluation {
    let fallback_amount = fallback_amount.filter(|a| a.is_finite() && *a > 0.0);

    // a position read as carrying no weight earns nothing, whatever was recorded
    if unavailable.is_none() {
        if !ve.has_delegatee() {
            return zero(RewardSource::ContractFormula, InsufficientData::NoDelegation);
        }
        if ve.weight_raw.is_zero() {
            return zero(RewardSource::ContractFormula, InsufficientData::ZeroWeight);
        }
    }

    let mut source = RewardSource::ContractFormula;
    let mut baseline = bribe.rewards_for_epoch_raw;
    if baseline.is_zero() {
        if let Some(amount) = fallback_amount {
            baseline = human_to_raw(amount, token.decimals);
            source = RewardSource::DbFallback;
        }
    }

    let supply = bribe.total_eligible_supply_raw;
    let balance = bribe.delegatee_balance_raw;
    let weight = ve.weight_raw;
    let share_available = !supply.is_zero() && !balance.is_zero() && !weight.is_zero();

    if share_available {
        if baseline.is_zero() {
            return zero(source, InsufficientData::NoRewardRate);
        }
        return match contract_formula(baseline, supply, balance, weight, config.reward_scale, config.weight_scale) {
            Some(raw) => Evaluation {
                raw_amount: raw,
                human_amount: token.to_human(raw),
                source,
                shortfall: None,
            },
            None => zero(source, InsufficientData::Overflow),
        };
    }

    let reason = match unavailable {
        Some(err) => InsufficientData::StateUnavailable {
            accessor: err.accessor.to_string(),
            kind: err.kind,
        },
        None if !ve.has_delegatee() => InsufficientData::NoDelegation,
        None if weight.is_zero() => InsufficientData::ZeroWeight,
        None if supply.is_zero() => InsufficientData::ZeroSupply,
        None => InsufficientData::ZeroBalance,
    };

    match (fallback_amount, legacy_pool_share) {
        (Some(amount), Some(share)) if (0.0..=1.0).contains(&share) => {
            let human = amount * share;
            Evaluation {
                raw_amount: human_to_raw(human, token.decimals),
                human_amount: human,
                source: RewardSource::LegacyShareFallback,
                shortfall: Some(reason),
            }
        }
        _ => zero(source, reason),
    }
}

fn zero(source: RewardSource, reason: InsufficientData) -> Evaluation {
    Evaluation {
        raw_amount: U256::ZERO,
        human_amount: 0.0,
        source,
        shortfall: Some(reason),
    }
}

/// Combines the resolvers and evaluates requests against them
pub struct RewardEstimator<R> {
    config: Arc<EngineConfig>,
    metadata: TokenMetadataResolver<R>,
    delegation: VeDelegationResolver<R>,
    bribes: BribeContractStateResolver<R>,
}

impl<R: ChainStateReader> RewardEstimator<R> {
    pub fn new(reader: Arc<R>, store: Arc<dyn TokenMetadataStore>, config: Arc<EngineConfig>) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            metadata: TokenMetadataResolver::new(reader.clone(), store, config.clone()),
            delegation: VeDelegationResolver::new(
                reader.clone(),
                config.ve_address,
                config.weight_scale,
                config.cache_ttl_secs,
            ),
            bribes: BribeContractStateResolver::new(reader, config.cache_ttl_secs),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metadata(&self) -> &TokenMetadataResolver<R> {
        &self.metadata
    }

    pub fn bribes(&self) -> &BribeContractStateResolver<R> {
        &self.bribes
    }

    /// Estimate one request.
    ///
    /// State read failures degrade the result (recorded in `shortfall`); only
    /// a misaligned epoch or unresolvable token metadata is an error.
    pub async fn estimate(&self, request: &EstimateRequest) -> EngineResult<ExpectedReward> {
        if !request.calc_epoch.is_aligned(self.config.week) {
            return Err(EngineError::invalid_epoch(request.calc_epoch.timestamp(), self.config.week));
        }

        let token = self.metadata.resolve(request.token).await?;
        let mut unavailable = None;

        let ve = match self
            .delegation
            .resolve(request.position_id, request.calc_epoch, request.block)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("⚠️ Delegation state unavailable for position {}: {}", request.position_id, e);
                unavailable = Some(e);
                VeDelegationSnapshot::undelegated()
            }
        };

        // without weight nothing from the reward contract can change the outcome
        let bribe = if ve.weight_raw.is_zero() {
            BribeContractSnapshot::zeroed()
        } else {
            match self
                .bribes
                .resolve(request.bribe, request.token, ve.delegatee, request.calc_epoch, request.block)
                .await
            {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("⚠️ Reward contract state unavailable for {} {}: {}", request.pool, token.symbol, e);
                    unavailable = Some(e);
                    BribeContractSnapshot::zeroed()
                }
            }
        };

        let evaluation = evaluate(
            &token,
            &ve,
            &bribe,
            request.fallback_amount,
            request.legacy_pool_share,
            unavailable.as_ref(),
            &self.config,
        );

        if let Some(ref shortfall) = evaluation.shortfall {
            debug!(
                "📉 {} {} {} -> {} via {} ({:?})",
                request.pool, request.bribe_type, token.symbol, evaluation.human_amount, evaluation.source, shortfall
            );
        } else {
            debug!(
                "💰 {} {} {} -> {} via {}",
                request.pool, request.bribe_type, token.symbol, evaluation.human_amount, evaluation.source
            );
        }

        Ok(ExpectedReward {
            pool: request.pool.clone(),
            bribe_type: request.bribe_type,
            token,
            calc_epoch: request.calc_epoch,
            block: request.block,
            horizon: request.horizon,
            raw_amount: evaluation.raw_amount,
            human_amount: evaluation.human_amount,
            source: evaluation.source,
            shortfall: evaluation.shortfall,
        })
    }

    pub fn cache_stats(&self) -> Vec<CacheStats> {
        vec![
            self.metadata.memo().stats(),
            self.delegation.cache().stats(),
            self.bribes.cache().stats(),
        ]
    }

    /// Drop all memoized state
    pub fn clear_caches(&self) {
        self.metadata.memo().clear();
        self.delegation.cache().clear();
        self.bribes.cache().clear();
    }
}

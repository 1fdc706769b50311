//! Shared fixture builders for integration tests

#![allow(dead_code)]

use alloy_primitives::{Address, U256};
use std::sync::Arc;

use ve_bribe_engine::{
    Accessor, BribeType, EngineConfig, Epoch, EstimateRequest, FixtureStateReader, Horizon, BlockPin,
    InMemoryTokenStore, RewardEstimator, StateValue,
};

pub const EPOCH: u64 = 1_770_854_400;
pub const WEEK: u64 = 604_800;

pub fn position_id() -> U256 {
    U256::from(19_098)
}

pub fn delegatee() -> Address {
    Address::repeat_byte(0xd1)
}

pub fn bribe() -> Address {
    Address::repeat_byte(0xbb)
}

pub fn token() -> Address {
    Address::repeat_byte(0x70)
}

pub fn ve() -> Address {
    EngineConfig::default().ve_address
}

/// Position delegated to `delegatee()` with `power` of `total` votes
pub fn with_delegation(reader: &mut FixtureStateReader, power: u64, total: u64) {
    let position_id = position_id();
    reader
        .set(
            ve(),
            Accessor::Delegates { position_id, epoch: EPOCH },
            StateValue::Address(delegatee()),
        )
        .set_uint(ve(), Accessor::BalanceOfNftAt { position_id, epoch: EPOCH }, U256::from(power))
        .set_uint(
            ve(),
            Accessor::GetPastVotes { account: delegatee(), epoch: EPOCH },
            U256::from(total),
        );
}

/// Reward contract state for `token()` on `bribe()`
pub fn with_bribe_state(reader: &mut FixtureStateReader, rewards: U256, supply: u64, balance: u64) {
    reader
        .set_reward_rate(bribe(), token(), EPOCH, rewards)
        .set_uint(bribe(), Accessor::TotalSupplyAt { epoch: EPOCH }, U256::from(supply))
        .set_uint(
            bribe(),
            Accessor::BalanceOfOwnerAt { owner: delegatee(), epoch: EPOCH },
            U256::from(balance),
        )
        .set(bribe(), Accessor::IsReward { token: token() }, StateValue::Bool(true));
}

/// power 500 of 5000 votes, 1e9 raw rewards, balance 2000 of 10000 supply, 6 decimals
pub fn reference_chain() -> FixtureStateReader {
    let mut reader = FixtureStateReader::new();
    reader.set_token(token(), "TKN", 6);
    with_delegation(&mut reader, 500, 5_000);
    with_bribe_state(&mut reader, U256::from(1_000_000_000u64), 10_000, 2_000);
    reader
}

pub fn estimator(reader: Arc<FixtureStateReader>) -> RewardEstimator<FixtureStateReader> {
    RewardEstimator::new(
        reader,
        Arc::new(InMemoryTokenStore::new()),
        Arc::new(EngineConfig::default()),
    )
    .expect("default config is valid")
}

pub fn request() -> EstimateRequest {
    EstimateRequest {
        position_id: position_id(),
        pool: "HYDX/USDC".to_string(),
        bribe_type: BribeType::External,
        bribe: bribe(),
        token: token(),
        calc_epoch: Epoch::new(EPOCH, WEEK).expect("aligned"),
        block: BlockPin::Latest,
        horizon: Horizon::Final,
        fallback_amount: None,
        legacy_pool_share: None,
    }
}

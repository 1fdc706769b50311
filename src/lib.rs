//! ve-bribe-engine
//!
//! Off-chain estimator for vote-escrow bribe rewards. Reproduces the reward
//! contracts' fixed-point formula against historical state pinned to a block,
//! degrades to recorded-amount fallbacks when state is incomplete, and
//! reconciles expectations against amounts actually received.
//!
//! Module layout:
//! - `models`: configuration, errors and domain types
//! - `providers`: chain state readers (JSON-RPC, fixtures) and block location
//! - `core`: resolvers, estimator, reconciliation and batch runner
//! - `utils`: constants and the snapshot cache

pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use crate::core::{
    contract_formula, evaluate, BatchJob, BatchReport, BatchRow, BatchRunner, BribeContractStateResolver,
    CachedTokenMetadata, EstimateRequest, InMemoryTokenStore, PriceBook, ReconciliationReporter,
    ReconciliationRow, ReconciliationSummary, RewardEstimator, RowStatus, TokenMetadataResolver,
    TokenMetadataStore, VeDelegationResolver,
};
pub use models::{
    ActualReceived, BlockPin, BribeContractSnapshot, BribeType, EngineConfig, EngineError, EngineResult, Epoch,
    ErrorCode, ExpectedReward, Horizon, InsufficientData, RewardSource, RpcConfig, TokenInfo, TokenMetadataSource,
    VeDelegationSnapshot,
};
pub use providers::{
    Accessor, BlockLocator, ChainStateReader, FixtureStateReader, RpcProvider, RpcStateReader, StateErrorKind,
    StateUnavailable, StateValue,
};
pub use utils::{CacheStats, SnapshotCache};

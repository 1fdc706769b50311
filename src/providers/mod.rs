//! Providers Module - Chain state sources
//!
//! The `ChainStateReader` contract plus its RPC and fixture implementations.

pub mod blocks;
pub mod chain;
pub mod fixture;
pub mod rpc;

pub use blocks::*;
pub use chain::*;
pub use fixture::*;
pub use rpc::*;

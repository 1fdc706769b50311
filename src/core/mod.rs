//! Core Module - Estimation & Reconciliation Engine
//!
//! Resolvers turn chain state into pinned snapshots, the estimator runs the
//! contract formula over them, and the reporter joins results with receipts.

pub mod batch;
pub mod bribe;
pub mod delegation;
pub mod estimator;
pub mod metadata;
pub mod reconcile;

pub use batch::*;
pub use bribe::*;
pub use delegation::*;
pub use estimator::*;
pub use metadata::*;
pub use reconcile::*;

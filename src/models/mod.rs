//! Models Module - Data Structures & Configuration
//!
//! Value types shared by every resolver, the engine error type and the
//! immutable engine configuration.

pub mod config;
pub mod errors;
pub mod types;

pub use config::*;
pub use errors::*;
pub use types::*;

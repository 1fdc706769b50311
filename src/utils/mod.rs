//! Utils Module - Shared helpers

pub mod cache;
pub mod constants;

pub use cache::*;
pub use constants::*;

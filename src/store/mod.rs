//! Durable key-value storage for the router core.
//!
//! The router's only persistence need is the weight store and, optionally,
//! a cache snapshot — a single ACID key-value table is enough, so this
//! module keeps just the `durable` (redb) tier from the host engine's
//! tiered-storage design; the hot/warm in-memory tiers it used for
//! hyperdimensional vectors are unneeded here.

pub mod durable;

use crate::error::StoreError;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

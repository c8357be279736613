//! # cairn-store
//!
//! Tiered blob and metadata persistence for the Cairn storage engine.
//!
//! Three tiers, consulted in this order:
//! 1. [`cache::MemoryCache`]: volatile, in-process, byte-budgeted.
//! 2. [`transactional::TransactionalTier`]: SQLite, migrated on open.
//! 3. [`flat::FlatStore`]: one file per key under a directory, with a blob
//!    size ceiling.
//!
//! [`TieredStore`] ties them together.

pub mod cache;
pub mod database;
pub mod flat;
pub mod migrations;
pub mod records;
pub mod tiered;
pub mod transactional;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use tiered::{Tier, TierBlob, TierConfig, TierSet, TieredStore};

//! Shared key-value store contract.
//!
//! Cache entries and quota counters live in a store shared by every gateway
//! replica.  The gateway only ever touches that state through these
//! primitives; in particular quota admission relies on
//! [`SharedStore::incr_within`] being a single atomic step.

use crate::error::StoreError;
use async_trait::async_trait;
use std::time::Duration;

/// Outcome of an atomic increment-and-compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment {
    /// Whether the increment was applied.
    pub admitted: bool,
    /// Counter value after the operation (unchanged when not admitted).
    pub count: u64,
}

#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Fetch a value; expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store a value that expires `ttl` after insertion.
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration)
    -> Result<(), StoreError>;

    /// Atomically increment the counter at `key` unless that would take it
    /// past `ceiling`.
    ///
    /// - `ceiling = None` always increments.
    /// - When the counter is already `>= ceiling` it is left untouched and
    ///   `admitted` is `false`.
    /// - `ttl` is applied when the counter is first created.
    async fn incr_within(
        &self,
        key: &str,
        ceiling: Option<u64>,
        ttl: Duration,
    ) -> Result<Increment, StoreError>;

    /// Current counter value, `0` when absent or expired.
    async fn counter(&self, key: &str) -> Result<u64, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

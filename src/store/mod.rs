//! Shared counting store.
//!
//! The sliding-window counter only needs a handful of sorted-set operations.
//! [`WindowStore`] is that surface; [`RedisWindowStore`] talks to a real
//! Redis/Valkey server and [`MemoryWindowStore`] keeps everything in process.

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::ratelimit::Decision;

pub use self::memory::MemoryWindowStore;
pub use self::redis_store::RedisWindowStore;

/// Errors raised by a counting store.
///
/// None of these reach the caller of the gate; they all turn into a
/// fail-open verdict.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection refused, dropped or never established
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The round trip exceeded its budget
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// The store answered with an error
    #[error("store command failed: {0}")]
    Command(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Sorted-set operations the sliding-window counter runs against.
///
/// Scores are fractional epoch seconds. Implementations must be safe to call
/// concurrently from any number of tasks.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Remove every member of `key` scored within `[min, max]`.
    /// Returns the number removed.
    async fn remove_range_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<u64>;

    /// Number of members under `key`; zero when the key does not exist.
    async fn cardinality(&self, key: &str) -> StoreResult<u64>;

    /// Insert `member` under `key` with `score`.
    async fn add_scored(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;

    /// Reclaim the whole of `key` after `ttl` without further writes.
    async fn set_expiry(&self, key: &str, ttl: Duration) -> StoreResult<()>;

    /// Prune, count and conditionally insert as one indivisible operation.
    ///
    /// Members scored at or below `now - window` are dropped first. When the
    /// remaining count is below `limit`, `member` is inserted at `now` and the
    /// key expiry is refreshed to `window`.
    async fn admit_atomic(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        now: f64,
        member: &str,
    ) -> StoreResult<Decision>;

    /// Cheap liveness check.
    async fn ping(&self) -> StoreResult<()>;
}

/// Whole seconds a key should live for, never less than one.
pub(crate) fn expiry_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

//! Sliding-window log counter.
//!
//! Every admitted request is recorded in the window key's sorted set, scored
//! by its admission time. A request is admitted when fewer than `limit`
//! entries remain after dropping those scored at or below `now - window`, so
//! an admission at `t` stops counting at exactly `t + window`.
//!
//! In [`AdmitMode::Sequential`] the prune, count, insert and expiry steps are
//! separate round trips. Concurrent checks on the same key can then all see
//! `count < limit` and all insert, overshooting the limit by at most the
//! number of racing callers. If the expiry step fails after the insert landed
//! on a fresh key, that key keeps no TTL until the next admission on it
//! refreshes the expiry. [`AdmitMode::Atomic`] hands the whole sequence to the
//! store in one step, keeps the bound hard and cannot leave a key without a
//! TTL.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, trace};
use uuid::Uuid;

use super::key::WindowKey;
use crate::store::{StoreError, StoreResult, WindowStore};

/// Outcome of a single admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Recorded; `count` includes this request
    Allowed { count: u64 },
    /// Not recorded; `count` live entries already fill the window
    Denied { count: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn count(&self) -> u64 {
        match self {
            Decision::Allowed { count } | Decision::Denied { count } => *count,
        }
    }
}

/// How the prune/count/insert sequence reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmitMode {
    /// One store-side operation per check
    #[default]
    Atomic,
    /// One round trip per step; tolerates the overshoot race
    Sequential,
}

/// Sliding-window counter over a shared [`WindowStore`].
///
/// Holds no counts of its own; every call re-reads the store.
#[derive(Clone)]
pub struct SlidingWindowCounter {
    store: Arc<dyn WindowStore>,
    mode: AdmitMode,
    call_timeout: Duration,
}

impl SlidingWindowCounter {
    /// Counter over `store`. Every store call, or the whole script in
    /// atomic mode, is bounded by `call_timeout`.
    pub fn new(store: Arc<dyn WindowStore>, mode: AdmitMode, call_timeout: Duration) -> Self {
        Self {
            store,
            mode,
            call_timeout,
        }
    }

    /// Decide whether one more request fits in `key`'s trailing window.
    ///
    /// # Errors
    /// Any store failure, including a round trip that exceeds the call
    /// timeout. The window may be partially updated when a sequential check
    /// fails after pruning; that only ever removes already-stale entries.
    pub async fn admit(
        &self,
        key: &WindowKey,
        limit: u64,
        window: Duration,
        now: f64,
    ) -> StoreResult<Decision> {
        let member = format!("{:.6}-{}", now, Uuid::new_v4().simple());

        let decision = match self.mode {
            AdmitMode::Atomic => {
                self.bounded(
                    self.store
                        .admit_atomic(key.as_str(), limit, window, now, &member),
                )
                .await?
            }
            AdmitMode::Sequential => self.admit_sequential(key, limit, window, now, &member).await?,
        };

        trace!(key = %key, limit = limit, decision = ?decision, "Window checked");
        if !decision.is_allowed() {
            debug!(key = %key, count = decision.count(), limit = limit, "Window full");
        }
        Ok(decision)
    }

    async fn admit_sequential(
        &self,
        key: &WindowKey,
        limit: u64,
        window: Duration,
        now: f64,
        member: &str,
    ) -> StoreResult<Decision> {
        let key = key.as_str();
        let cutoff = now - window.as_secs_f64();

        self.bounded(self.store.remove_range_by_score(key, f64::NEG_INFINITY, cutoff))
            .await?;
        let count = self.bounded(self.store.cardinality(key)).await?;

        if count >= limit {
            return Ok(Decision::Denied { count });
        }

        self.bounded(self.store.add_scored(key, member, now)).await?;
        self.bounded(self.store.set_expiry(key, window)).await?;

        Ok(Decision::Allowed { count: count + 1 })
    }

    /// Ping the store within the call timeout.
    pub async fn ping(&self) -> StoreResult<()> {
        self.bounded(self.store.ping()).await
    }

    async fn bounded<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        timeout(self.call_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.call_timeout))?
    }
}

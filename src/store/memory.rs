//! In-process window store.
//!
//! Mirrors the Redis sorted-set semantics closely enough for tests and for
//! single-instance deployments. Keys expire lazily on access.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{expiry_secs, StoreError, StoreResult, WindowStore};
use crate::ratelimit::Decision;

#[derive(Debug, Default)]
struct ScoredSet {
    /// (score, member), kept sorted by score
    entries: Vec<(f64, String)>,
    expires_at: Option<Instant>,
}

impl ScoredSet {
    fn is_expired(&self, at: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= at)
    }

    fn remove_range(&mut self, min: f64, max: f64) -> u64 {
        let before = self.entries.len();
        self.entries
            .retain(|(score, _)| !(*score >= min && *score <= max));
        (before - self.entries.len()) as u64
    }

    fn insert(&mut self, member: &str, score: f64) {
        // ZADD on an existing member only moves its score.
        self.entries.retain(|(_, m)| m != member);
        let at = self.entries.partition_point(|(s, _)| *s <= score);
        self.entries.insert(at, (score, member.to_string()));
    }

    fn expire_in(&mut self, ttl: Duration) {
        self.expires_at = Some(Instant::now() + Duration::from_secs(expiry_secs(ttl)));
    }
}

/// Window store held entirely in process memory.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub struct MemoryWindowStore {
    sets: Arc<DashMap<String, ScoredSet>>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryWindowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWindowStore {
    /// Empty, available store.
    pub fn new() -> Self {
        Self {
            sets: Arc::new(DashMap::new()),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate an outage: while unavailable every call fails with
    /// [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub fn key_count(&self) -> usize {
        let now = Instant::now();
        self.sets.iter().filter(|s| !s.is_expired(now)).count()
    }

    /// Scores stored under `key`, lowest first.
    pub fn scores(&self, key: &str) -> Vec<f64> {
        let now = Instant::now();
        self.sets
            .get(key)
            .filter(|s| !s.is_expired(now))
            .map(|s| s.entries.iter().map(|(score, _)| *score).collect())
            .unwrap_or_default()
    }

    /// Remaining lifetime of `key`, if an expiry is set.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.sets
            .get(key)
            .and_then(|s| s.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        }
    }

    /// Drop `key` if its expiry has passed.
    fn purge_expired(&self, key: &str) {
        let now = Instant::now();
        self.sets.remove_if(key, |_, set| set.is_expired(now));
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn remove_range_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<u64> {
        self.ensure_available()?;
        self.purge_expired(key);
        Ok(self
            .sets
            .get_mut(key)
            .map(|mut set| set.remove_range(min, max))
            .unwrap_or(0))
    }

    async fn cardinality(&self, key: &str) -> StoreResult<u64> {
        self.ensure_available()?;
        self.purge_expired(key);
        Ok(self
            .sets
            .get(key)
            .map(|set| set.entries.len() as u64)
            .unwrap_or(0))
    }

    async fn add_scored(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        self.ensure_available()?;
        self.purge_expired(key);
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(member, score);
        Ok(())
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        self.ensure_available()?;
        self.purge_expired(key);
        if let Some(mut set) = self.sets.get_mut(key) {
            set.expire_in(ttl);
        }
        Ok(())
    }

    async fn admit_atomic(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        now: f64,
        member: &str,
    ) -> StoreResult<Decision> {
        self.ensure_available()?;
        self.purge_expired(key);

        // The entry guard holds the shard lock for the whole sequence.
        let mut set = self.sets.entry(key.to_string()).or_default();
        set.remove_range(f64::NEG_INFINITY, now - window.as_secs_f64());

        let count = set.entries.len() as u64;
        if count >= limit {
            return Ok(Decision::Denied { count });
        }

        set.insert(member, now);
        set.expire_in(window);
        Ok(Decision::Allowed { count: count + 1 })
    }

    async fn ping(&self) -> StoreResult<()> {
        self.ensure_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_and_count() {
        let store = MemoryWindowStore::new();
        store.add_scored("k", "a", 3.0).await.unwrap();
        store.add_scored("k", "b", 1.0).await.unwrap();
        store.add_scored("k", "c", 2.0).await.unwrap();

        assert_eq!(store.cardinality("k").await.unwrap(), 3);
        assert_eq!(store.scores("k"), vec![1.0, 2.0, 3.0]);
        assert_eq!(store.cardinality("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_member_is_not_duplicated() {
        let store = MemoryWindowStore::new();
        store.add_scored("k", "a", 1.0).await.unwrap();
        store.add_scored("k", "a", 5.0).await.unwrap();

        assert_eq!(store.scores("k"), vec![5.0]);
    }

    #[tokio::test]
    async fn test_remove_range_is_inclusive() {
        let store = MemoryWindowStore::new();
        for (member, score) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            store.add_scored("k", member, score).await.unwrap();
        }

        let removed = store
            .remove_range_by_score("k", f64::NEG_INFINITY, 2.0)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.scores("k"), vec![3.0]);
    }

    #[tokio::test]
    async fn test_set_expiry_on_missing_key_is_noop() {
        let store = MemoryWindowStore::new();
        store.set_expiry("k", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_set_expiry_records_ttl() {
        let store = MemoryWindowStore::new();
        store.add_scored("k", "a", 1.0).await.unwrap();
        assert!(store.ttl("k").is_none());

        store.set_expiry("k", Duration::from_secs(10)).await.unwrap();
        let ttl = store.ttl("k").unwrap();
        assert!(ttl <= Duration::from_secs(10));
        assert!(ttl > Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_admit_atomic_stops_at_limit() {
        let store = MemoryWindowStore::new();
        let window = Duration::from_secs(10);

        assert_eq!(
            store.admit_atomic("k", 2, window, 100.0, "m1").await.unwrap(),
            Decision::Allowed { count: 1 }
        );
        assert_eq!(
            store.admit_atomic("k", 2, window, 100.5, "m2").await.unwrap(),
            Decision::Allowed { count: 2 }
        );
        assert_eq!(
            store.admit_atomic("k", 2, window, 101.0, "m3").await.unwrap(),
            Decision::Denied { count: 2 }
        );
        assert_eq!(store.scores("k"), vec![100.0, 100.5]);

        // First entry falls out of the window exactly at its boundary.
        assert_eq!(
            store.admit_atomic("k", 2, window, 110.0, "m4").await.unwrap(),
            Decision::Allowed { count: 2 }
        );
        assert_eq!(store.scores("k"), vec![100.5, 110.0]);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = MemoryWindowStore::new();
        store.set_available(false);

        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        assert!(store.cardinality("k").await.is_err());
        assert!(store.add_scored("k", "a", 1.0).await.is_err());
        assert!(store
            .admit_atomic("k", 1, Duration::from_secs(1), 1.0, "a")
            .await
            .is_err());

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }
}

//! Integration tests for the Redis window store.
//!
//! These tests require a Redis instance at `127.0.0.1:6379`. They are
//! ignored by default - run with `cargo test --test redis_store -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use tiergate::config::{StoreConfig, TiergateConfig};
use tiergate::ratelimit::{AdmitMode, Decision, RateLimitGate, SlidingWindowCounter, Verdict, WindowKeyBuilder};
use tiergate::store::{RedisWindowStore, WindowStore};

fn store_config() -> StoreConfig {
    StoreConfig {
        host: "127.0.0.1".to_string(),
        ..StoreConfig::default()
    }
}

/// Connect, or `None` when no server is running.
async fn connect() -> Option<RedisWindowStore> {
    match RedisWindowStore::connect(&store_config()).await {
        Ok(store) => Some(store),
        Err(e) => {
            eprintln!("Skipping test: Redis not available ({})", e);
            None
        }
    }
}

/// Unique prefix per test run so parallel runs do not share windows.
fn prefix(test: &str) -> String {
    format!("tiergate-test:{}:{}", test, uuid::Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_primitives() {
    let Some(store) = connect().await else { return };
    let key = prefix("primitives");

    store.add_scored(&key, "a", 1.0).await.unwrap();
    store.add_scored(&key, "b", 2.5).await.unwrap();
    store.add_scored(&key, "c", 4.0).await.unwrap();
    assert_eq!(store.cardinality(&key).await.unwrap(), 3);

    let removed = store
        .remove_range_by_score(&key, f64::NEG_INFINITY, 2.5)
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.cardinality(&key).await.unwrap(), 1);

    store.set_expiry(&key, Duration::from_secs(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(store.cardinality(&key).await.unwrap(), 0);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_atomic_script() {
    let Some(store) = connect().await else { return };
    let key = prefix("script");
    let window = Duration::from_secs(10);

    assert_eq!(
        store.admit_atomic(&key, 2, window, 100.0, "m1").await.unwrap(),
        Decision::Allowed { count: 1 }
    );
    assert_eq!(
        store.admit_atomic(&key, 2, window, 101.0, "m2").await.unwrap(),
        Decision::Allowed { count: 2 }
    );
    assert_eq!(
        store.admit_atomic(&key, 2, window, 102.0, "m3").await.unwrap(),
        Decision::Denied { count: 2 }
    );
    assert_eq!(
        store.admit_atomic(&key, 2, window, 110.0, "m4").await.unwrap(),
        Decision::Allowed { count: 2 }
    );
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_atomic_bound_holds_across_tasks() {
    let Some(store) = connect().await else { return };
    let store: Arc<dyn WindowStore> = Arc::new(store);
    let counter = SlidingWindowCounter::new(store, AdmitMode::Atomic, Duration::from_secs(1));
    let key = WindowKeyBuilder::new(prefix("concurrency")).build("10.0.0.1", "FREE");

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let counter = counter.clone();
            let key = key.clone();
            tokio::spawn(async move { counter.admit(&key, 10, Duration::from_secs(10), 500.0).await })
        })
        .collect();

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_allowed() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 10);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_gate_free_tier_scenario() {
    let Some(store) = connect().await else { return };
    let mut config = TiergateConfig::default();
    config.store = store_config();
    config.store.key_prefix = prefix("gate");

    let gate = RateLimitGate::from_config(&config, Some(Arc::new(store))).unwrap();
    let now = 1_700_000_000.0;

    for i in 0..5 {
        let verdict = gate
            .check(Some("free_user_key_123"), "127.0.0.1", now + i as f64 * 0.1)
            .await;
        assert!(matches!(verdict, Verdict::Allow { .. }));
    }
    let verdict = gate.check(Some("free_user_key_123"), "127.0.0.1", now + 0.6).await;
    assert!(matches!(verdict, Verdict::Deny { ref reason, .. }
        if reason == "Rate limit for FREE tier exceeded. Try again later."));

    let verdict = gate.check(Some("pro_user_key_456"), "127.0.0.1", now + 0.7).await;
    assert_eq!(verdict.plan(), "PRO");
    assert!(verdict.is_allowed());
}

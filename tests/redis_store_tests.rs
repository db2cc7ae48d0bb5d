use chrono::{FixedOffset, TimeZone};
use codenexta_quota::{
    storage::RedisStore, KeyValueStore, ManualClock, QuotaSettings, QuotaTracker,
};
use std::env;
use std::sync::Arc;

// These tests need a running Redis: `cargo test -- --ignored`
fn setup_store(key: &str) -> RedisStore {
    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    let store = RedisStore::new(&redis_url).expect("Failed to connect to Redis");
    store.remove(key).expect("Failed to clean test key");
    store
}

#[test]
#[ignore]
fn test_compare_and_swap_on_absent_key() {
    let key = "codenexta-test:cas-absent";
    let store = setup_store(key);

    assert!(store.compare_and_swap(key, None, "first").unwrap());
    assert_eq!(store.get(key).unwrap().as_deref(), Some("first"));

    // Key now exists, so expecting absence must fail
    assert!(!store.compare_and_swap(key, None, "second").unwrap());
    assert_eq!(store.get(key).unwrap().as_deref(), Some("first"));

    store.remove(key).unwrap();
}

#[test]
#[ignore]
fn test_compare_and_swap_on_matching_value() {
    let key = "codenexta-test:cas-match";
    let store = setup_store(key);
    store.set(key, "v1").unwrap();

    assert!(store.compare_and_swap(key, Some("v1"), "v2").unwrap());
    assert_eq!(store.get(key).unwrap().as_deref(), Some("v2"));

    store.remove(key).unwrap();
}

#[test]
#[ignore]
fn test_compare_and_swap_rejects_mismatch() {
    let key = "codenexta-test:cas-mismatch";
    let store = setup_store(key);
    store.set(key, "current").unwrap();

    assert!(!store.compare_and_swap(key, Some("outdated"), "new").unwrap());
    assert_eq!(store.get(key).unwrap().as_deref(), Some("current"));

    // An empty expected value is not the same as an absent key
    assert!(!store.compare_and_swap(key, Some(""), "new").unwrap());

    store.remove(key).unwrap();
}

#[test]
#[ignore]
fn test_shared_redis_store_does_not_lose_updates() {
    let key = "codenexta-test:tracker";
    let store = Arc::new(setup_store(key));
    let offset = FixedOffset::east_opt(0).unwrap();
    let clock = Arc::new(ManualClock::new(offset.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()));
    let settings = QuotaSettings {
        storage_key: key.to_string(),
        daily_limit: 1_000,
        max_cas_retries: 10_000,
        ..QuotaSettings::default()
    };
    let trackers: Vec<_> = (0..4)
        .map(|_| QuotaTracker::new(store.clone(), clock.clone(), settings.clone()))
        .collect();

    std::thread::scope(|scope| {
        for tracker in &trackers {
            scope.spawn(move || {
                for _ in 0..25 {
                    tracker.record_usage().unwrap();
                }
            });
        }
    });

    assert_eq!(trackers[0].current_usage(), 100);

    store.remove(key).unwrap();
}

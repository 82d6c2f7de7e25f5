use resilient_fetch::cache::{CacheConfig, CacheKey, CacheStore, ResourceType};
use resilient_fetch::telemetry::{DiagnosticKind, Diagnostics, EvictReason, MemorySink};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn store(max_entries: usize) -> CacheStore {
    CacheStore::new(
        CacheConfig::new()
            .with_max_entries(max_entries)
            .with_sweep_probability(0.0),
    )
}

fn key(resource: ResourceType, id: &str) -> CacheKey {
    CacheKey::new(resource).push(id)
}

#[tokio::test(start_paused = true)]
async fn test_set_then_get_counts_hit() {
    let cache = store(100);
    cache.set(&key(ResourceType::Page, "p1"), &json!({"id": "X"}), None);

    let got: Option<Value> = cache.get(&key(ResourceType::Page, "p1")).await;
    assert_eq!(got, Some(json!({"id": "X"})));

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.size, 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_before_set_counts_miss() {
    let cache = store(100);
    let got: Option<Value> = cache.get(&key(ResourceType::Page, "p1")).await;
    assert!(got.is_none());
    assert_eq!(cache.stats().misses, 1);
    assert_eq!(cache.stats().hits, 0);
}

#[tokio::test(start_paused = true)]
async fn test_entry_lives_until_ttl_boundary() {
    let cache = store(100);
    let k = key(ResourceType::Search, "q");
    cache.set(&k, &"result", None);

    // search entries live 30s by default
    tokio::time::advance(Duration::from_millis(29_999)).await;
    assert_eq!(cache.get::<String>(&k).await.as_deref(), Some("result"));

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(cache.get::<String>(&k).await, None);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_global_default_ttl_governs_expiry() {
    let cache = CacheStore::new(
        CacheConfig::new()
            .with_default_ttl(Duration::from_secs(1))
            .with_sweep_probability(0.0),
    );
    let k = key(ResourceType::Page, "p1");
    cache.set(&k, &1, None);

    tokio::time::advance(Duration::from_millis(999)).await;
    assert_eq!(cache.get::<u32>(&k).await, Some(1));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(cache.get::<u32>(&k).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_capacity_evicts_oldest_entry() {
    let cache = store(3);
    for id in ["a", "b", "c"] {
        cache.set(&key(ResourceType::Block, id), &id, None);
        tokio::time::advance(Duration::from_millis(10)).await;
    }
    // reading "a" does not refresh it
    assert!(cache.get::<String>(&key(ResourceType::Block, "a")).await.is_some());

    cache.set(&key(ResourceType::Block, "d"), &"d", None);
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.stats().evictions, 1);
    assert!(cache.get::<String>(&key(ResourceType::Block, "a")).await.is_none());
    assert!(cache.get::<String>(&key(ResourceType::Block, "b")).await.is_some());
    assert!(cache.get::<String>(&key(ResourceType::Block, "d")).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_resource_only_touches_its_prefix() {
    let cache = store(100);
    cache.set(&key(ResourceType::Page, "1"), &1, None);
    cache.set(&key(ResourceType::Page, "2"), &2, None);
    cache.set(&CacheKey::new(ResourceType::Page), &0, None);
    cache.set(&key(ResourceType::Database, "1"), &3, None);
    cache.set(&key(ResourceType::DataSource, "1"), &4, None);

    assert_eq!(cache.invalidate_resource(ResourceType::Page), 3);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get::<i32>(&key(ResourceType::Database, "1")).await, Some(3));
    assert_eq!(cache.get::<i32>(&key(ResourceType::DataSource, "1")).await, Some(4));

    // "data_source:" does not start with "database:" and vice versa
    assert_eq!(cache.invalidate_resource(ResourceType::Database), 1);
    assert_eq!(cache.get::<i32>(&key(ResourceType::DataSource, "1")).await, Some(4));
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_single_key() {
    let cache = store(100);
    cache.set(&key(ResourceType::User, "u1"), &"alice", None);
    cache.set(&key(ResourceType::User, "u2"), &"bob", None);

    assert!(cache.invalidate(&key(ResourceType::User, "u1")));
    assert!(!cache.invalidate(&key(ResourceType::User, "u1")));
    assert_eq!(cache.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_clear_counts_evictions() {
    let cache = store(100);
    for i in 0..4 {
        cache.set(&key(ResourceType::Comment, &i.to_string()), &i, None);
    }
    assert_eq!(cache.clear(), 4);
    let stats = cache.stats();
    assert_eq!(stats.evictions, 4);
    assert_eq!(stats.size, 0);
    assert_eq!(stats.sets, 4);
}

#[tokio::test(start_paused = true)]
async fn test_configured_override_beats_type_default() {
    let cache = CacheStore::new(
        CacheConfig::new()
            .with_sweep_probability(0.0)
            .with_ttl_override(ResourceType::User, Duration::from_secs(5)),
    );
    let k = key(ResourceType::User, "u1");
    cache.set(&k, &"alice", None);
    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(cache.get::<String>(&k).await.is_none());

    // explicit ttl beats both
    cache.set(&k, &"alice", Some(Duration::from_secs(60)));
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(cache.get::<String>(&k).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_wrong_type_decodes_as_miss() {
    let cache = store(100);
    let k = key(ResourceType::Page, "p1");
    cache.set(&k, &json!({"id": "X"}), None);
    assert_eq!(cache.get::<u64>(&k).await, None);
    assert_eq!(cache.stats().misses, 1);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_removes_expired_entries_on_set() {
    let cache = CacheStore::new(CacheConfig::new().with_sweep_probability(1.0));
    cache.set(&key(ResourceType::Search, "old"), &1, None);
    tokio::time::advance(Duration::from_secs(31)).await;
    cache.set(&key(ResourceType::Page, "new"), &2, None);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_cache_is_inert() {
    let cache = CacheStore::new(CacheConfig::new().with_enabled(false));
    let k = key(ResourceType::Page, "p1");
    cache.set(&k, &1, None);
    assert_eq!(cache.get::<i32>(&k).await, None);
    assert_eq!(cache.stats(), Default::default());
}

#[tokio::test(start_paused = true)]
async fn test_diagnostics_only_when_verbose() {
    let sink = Arc::new(MemorySink::default());
    let cache = CacheStore::new(CacheConfig::new().with_max_entries(1).with_sweep_probability(0.0))
        .with_diagnostics(Diagnostics::new(true, sink.clone()));

    cache.set(&key(ResourceType::Page, "a"), &1, None);
    let _ = cache.get::<i32>(&key(ResourceType::Page, "a")).await;
    let _ = cache.get::<i32>(&key(ResourceType::Page, "zz")).await;
    cache.set(&key(ResourceType::Page, "b"), &2, None);

    assert_eq!(sink.named("cache_set").len(), 2);
    assert_eq!(sink.named("cache_hit").len(), 1);
    assert_eq!(sink.named("cache_miss").len(), 1);
    let evicted = sink.named("cache_evict");
    assert_eq!(evicted.len(), 1);
    match &evicted[0].kind {
        DiagnosticKind::CacheEvict { key, reason, evictions } => {
            assert_eq!(key, "page:a");
            assert_eq!(*reason, EvictReason::Capacity);
            assert_eq!(*evictions, 1);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let quiet_sink = Arc::new(MemorySink::default());
    let quiet = store(10).with_diagnostics(Diagnostics::new(false, quiet_sink.clone()));
    quiet.set(&key(ResourceType::Page, "a"), &1, None);
    assert!(quiet_sink.is_empty());
}

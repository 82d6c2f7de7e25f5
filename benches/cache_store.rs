//! Benchmarks for the cache hot paths
//!
//! This benchmark measures:
//! - Key rendering with canonical JSON identifiers
//! - `set` below capacity and at capacity (oldest-entry scan)
//! - `get` hits and misses

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use resilient_fetch::cache::{CacheConfig, CacheKey, CacheStore, ResourceType};
use serde_json::json;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_key_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_key");
    let filter = json!({"property": "Status", "select": {"equals": "Done"}, "and": [1, 2, 3]});

    group.bench_function("string_id", |b| {
        b.iter(|| CacheKey::new(ResourceType::Page).push(black_box("p1")))
    });
    group.bench_function("json_filter", |b| {
        b.iter(|| {
            CacheKey::new(ResourceType::Database)
                .push("db1")
                .push(black_box(&filter))
        })
    });
    group.finish();
}

fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_set");
    let value = json!({"id": "X", "title": "Roadmap", "tags": ["a", "b"]});

    for max_entries in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("at_capacity", max_entries),
            &max_entries,
            |b, &max_entries| {
                let cache = CacheStore::new(
                    CacheConfig::new()
                        .with_max_entries(max_entries)
                        .with_sweep_probability(0.0),
                );
                for i in 0..max_entries {
                    cache.set(&CacheKey::new(ResourceType::Page).push(&i), &value, None);
                }
                let mut i = max_entries;
                b.iter(|| {
                    i += 1;
                    cache.set(&CacheKey::new(ResourceType::Page).push(&i), black_box(&value), None);
                })
            },
        );
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("cache_get");
    let cache = CacheStore::new(CacheConfig::new().with_sweep_probability(0.0));
    let hit = CacheKey::new(ResourceType::User).push("u1");
    let miss = CacheKey::new(ResourceType::User).push("u2");
    cache.set(&hit, &json!({"name": "alice"}), None);

    group.bench_function("hit", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(cache.get::<serde_json::Value>(&hit).await) })
    });
    group.bench_function("miss", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(cache.get::<serde_json::Value>(&miss).await) })
    });
    group.finish();
}

criterion_group!(benches, bench_key_rendering, bench_set, bench_get);
criterion_main!(benches);

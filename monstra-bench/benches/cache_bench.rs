use criterion::{black_box, criterion_group, criterion_main, Criterion};
use monstra_cache::{CacheConfig, CacheEngine, CacheValue};

fn populate(capacity: i64) -> CacheEngine<u64, u64> {
    CacheEngine::new(CacheConfig::builder().capacity(capacity).build())
}

fn set_benchmark(c: &mut Criterion) {
    let cache = populate(10_000);
    let mut key = 0u64;

    c.bench_function("cache set (within capacity)", |b| {
        b.iter(|| {
            key = key.wrapping_add(1);
            cache.set(black_box(key % 10_000), CacheValue::Value(key), 0.0, None);
        });
    });
}

fn set_with_eviction_benchmark(c: &mut Criterion) {
    let cache = populate(1_000);
    let mut key = 0u64;

    c.bench_function("cache set (steady eviction churn)", |b| {
        b.iter(|| {
            key = key.wrapping_add(1);
            cache.set(black_box(key), CacheValue::Value(key), 0.0, None);
        });
    });
}

fn get_hit_benchmark(c: &mut Criterion) {
    let cache = populate(10_000);
    for key in 0..10_000u64 {
        cache.set(key, CacheValue::Value(key), 0.0, None);
    }

    c.bench_function("cache get (hit)", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key = (key + 1) % 10_000;
            black_box(cache.get_value(&key));
        });
    });
}

fn get_miss_benchmark(c: &mut Criterion) {
    let cache = populate(10_000);

    c.bench_function("cache get (miss)", |b| {
        let mut key = 10_000_000u64;
        b.iter(|| {
            key = key.wrapping_add(1);
            black_box(cache.get_value(&key));
        });
    });
}

criterion_group!(benches, set_benchmark, set_with_eviction_benchmark, get_hit_benchmark, get_miss_benchmark);
criterion_main!(benches);

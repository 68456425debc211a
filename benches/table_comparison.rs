use core::hint::black_box;

use criterion::BatchSize;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use double_hash::Hashtable;
use hashbrown::HashMap as HashbrownMap;
use rand::Rng;
use rand::SeedableRng;
use rand::TryRngCore;
use rand::rngs::OsRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use std::collections::HashMap as StdMap;

const SIZES: &[usize] = &[1 << 10, 1 << 14, 1 << 18];

fn random_keys(count: usize) -> Vec<u64> {
    let mut rng = SmallRng::seed_from_u64(OsRng.try_next_u64().unwrap_or(0x5eed));
    let mut keys: Vec<u64> = (0..count as u64).collect();
    keys.shuffle(&mut rng);
    keys
}

fn miss_keys(count: usize) -> Vec<u64> {
    let mut rng = SmallRng::seed_from_u64(OsRng.try_next_u64().unwrap_or(0x5eed));
    (0..count).map(|_| rng.random::<u64>() | (1 << 63)).collect()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_u64");
    for &size in SIZES {
        group.throughput(Throughput::Elements(size as u64));
        let keys = random_keys(size);

        group.bench_with_input(BenchmarkId::new("double-hash", size), &keys, |b, keys| {
            b.iter_batched(
                || Hashtable::with_capacity(0).unwrap(),
                |mut table| {
                    for &key in keys {
                        let _ = table.insert(black_box(key), key);
                    }
                    table
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("std", size), &keys, |b, keys| {
            b.iter_batched(
                StdMap::new,
                |mut map| {
                    for &key in keys {
                        map.insert(black_box(key), key);
                    }
                    map
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("hashbrown", size), &keys, |b, keys| {
            b.iter_batched(
                HashbrownMap::new,
                |mut map| {
                    for &key in keys {
                        map.insert(black_box(key), key);
                    }
                    map
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_lookup_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_hit_u64");
    for &size in SIZES {
        group.throughput(Throughput::Elements(size as u64));
        let keys = random_keys(size);

        let mut table = Hashtable::with_capacity(size).unwrap();
        let mut std_map = StdMap::with_capacity(size);
        let mut hashbrown_map = HashbrownMap::with_capacity(size);
        for &key in &keys {
            let _ = table.insert(key, key);
            std_map.insert(key, key);
            hashbrown_map.insert(key, key);
        }

        group.bench_with_input(BenchmarkId::new("double-hash", size), &keys, |b, keys| {
            b.iter(|| {
                for key in keys {
                    black_box(table.get(black_box(key)));
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("std", size), &keys, |b, keys| {
            b.iter(|| {
                for key in keys {
                    black_box(std_map.get(black_box(key)));
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("hashbrown", size), &keys, |b, keys| {
            b.iter(|| {
                for key in keys {
                    black_box(hashbrown_map.get(black_box(key)));
                }
            })
        });
    }
    group.finish();
}

fn bench_lookup_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_miss_u64");
    for &size in SIZES {
        group.throughput(Throughput::Elements(size as u64));
        let keys = random_keys(size);
        let misses = miss_keys(size);

        let mut table = Hashtable::with_capacity(size).unwrap();
        let mut std_map = StdMap::with_capacity(size);
        for &key in &keys {
            let _ = table.insert(key, key);
            std_map.insert(key, key);
        }

        group.bench_with_input(BenchmarkId::new("double-hash", size), &misses, |b, misses| {
            b.iter(|| {
                for key in misses {
                    black_box(table.get(black_box(key)));
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("std", size), &misses, |b, misses| {
            b.iter(|| {
                for key in misses {
                    black_box(std_map.get(black_box(key)));
                }
            })
        });
    }
    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn_u64");
    for &size in &[1usize << 10, 1 << 14] {
        group.throughput(Throughput::Elements(size as u64));
        let keys = random_keys(size);

        group.bench_with_input(BenchmarkId::new("double-hash", size), &keys, |b, keys| {
            b.iter_batched(
                || {
                    let mut table = Hashtable::with_capacity(size).unwrap();
                    for &key in keys {
                        let _ = table.insert(key, key);
                    }
                    table
                },
                |mut table| {
                    for &key in keys {
                        black_box(table.remove(&key));
                        let _ = table.insert(key, key + 1);
                    }
                    table
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_lookup_hit,
    bench_lookup_miss,
    bench_churn
);
criterion_main!(benches);

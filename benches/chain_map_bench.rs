use chain_hashmap::hashers::{direct_equal, direct_hash, str_equal, str_hash};
use chain_hashmap::ChainMap;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(n: u64) -> String {
    format!("k{:016x}", n)
}

fn string_map() -> ChainMap<String, u64> {
    ChainMap::new(str_hash, str_equal).unwrap()
}

fn bench_insert(c: &mut Criterion) {
    c.bench_function("chain_map_insert_10k", |b| {
        b.iter_batched(
            string_map,
            |mut m| {
                for (i, x) in lcg(1).take(10_000).enumerate() {
                    m.put(key(x), i as u64).unwrap();
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_get_hit(c: &mut Criterion) {
    c.bench_function("chain_map_get_hit", |b| {
        let mut m = string_map();
        let keys: Vec<_> = lcg(7).take(20_000).map(key).collect();
        for (i, k) in keys.iter().enumerate() {
            m.put(k.clone(), i as u64).unwrap();
        }
        let mut it = keys.iter().cycle();
        b.iter(|| {
            let k = it.next().unwrap();
            black_box(m.get(k));
        })
    });
}

fn bench_get_miss(c: &mut Criterion) {
    c.bench_function("chain_map_get_miss", |b| {
        let mut m = string_map();
        for (i, x) in lcg(11).take(10_000).enumerate() {
            m.put(key(x), i as u64).unwrap();
        }
        let mut miss = lcg(0xdead_beef);
        b.iter(|| {
            let k = key(miss.next().unwrap());
            black_box(m.get(&k));
        })
    });
}

// Remove then reinsert the same key; exercises tombstone reuse.
fn bench_remove_reinsert(c: &mut Criterion) {
    c.bench_function("chain_map_remove_reinsert", |b| {
        let mut m: ChainMap<usize, u64> = ChainMap::new(direct_hash, direct_equal).unwrap();
        for i in 0..10_000 {
            m.put(i, i as u64).unwrap();
        }
        let mut i = 0usize;
        b.iter(|| {
            let k = i % 10_000;
            black_box(m.remove(&k));
            m.put(k, 0).unwrap();
            i += 1;
        })
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(8))
        .warm_up_time(Duration::from_secs(2))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_insert, bench_get_hit, bench_get_miss, bench_remove_reinsert
}
criterion_main!(benches);

use bytestore::{Bytes, Runtime, Storage};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(rt: &Runtime, n: u64) -> Bytes {
    Bytes::new(rt, format!("k{:016x}", n).as_bytes()).unwrap()
}

fn bench_insert(c: &mut Criterion) {
    let rt = Runtime::system().unwrap();
    c.bench_function("storage_insert_10k", |b| {
        b.iter_batched(
            || {
                let keys: Vec<Bytes> = lcg(1).take(10_000).map(|x| key(&rt, x)).collect();
                (Storage::new(&rt).unwrap(), keys)
            },
            |(mut s, keys)| {
                // Growth runs inside the measured loop.
                for k in &keys {
                    s.set(k, k).unwrap();
                }
                black_box(s.count());
                drop(s);
                for k in keys {
                    k.release(&rt).unwrap();
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_get_hit(c: &mut Criterion) {
    let rt = Runtime::system().unwrap();
    c.bench_function("storage_get_hit", |b| {
        let mut s = Storage::new(&rt).unwrap();
        let keys: Vec<Bytes> = lcg(7).take(20_000).map(|x| key(&rt, x)).collect();
        for k in &keys {
            s.set(k, k).unwrap();
        }
        let mut it = keys.iter().cycle();
        b.iter(|| {
            let k = it.next().unwrap();
            let v = s.get(k).unwrap();
            black_box(&v);
            v.release(&rt).unwrap();
        })
    });
}

fn bench_get_miss(c: &mut Criterion) {
    let rt = Runtime::system().unwrap();
    c.bench_function("storage_get_miss", |b| {
        let mut s = Storage::new(&rt).unwrap();
        for x in lcg(11).take(10_000) {
            let k = key(&rt, x);
            s.set(&k, &k).unwrap();
            k.release(&rt).unwrap();
        }
        let misses: Vec<Bytes> = lcg(0xdead_beef).take(1024).map(|x| key(&rt, x)).collect();
        let mut it = misses.iter().cycle();
        b.iter(|| {
            let k = it.next().unwrap();
            black_box(s.get(k).is_err());
        })
    });
}

fn bench_copy_release(c: &mut Criterion) {
    let rt = Runtime::system().unwrap();
    c.bench_function("bytes_copy_release", |b| {
        let v = Bytes::new(&rt, &[7u8; 4096]).unwrap();
        b.iter(|| {
            let x = v.copy(&rt).unwrap();
            black_box(&x);
            x.release(&rt).unwrap();
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
    targets = bench_insert, bench_get_hit, bench_get_miss, bench_copy_release
}
criterion_main!(benches);

//! Benchmarks for tracked reads and batched flushes.
//!
//! Run with: cargo bench -p trellis-core

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use trellis_core::{Runtime, Target, Value};

fn record_of(width: usize) -> Target {
    Target::record((0..width).map(|i| (format!("f{i}"), Value::from(i as i64))))
}

// ---------------------------------------------------------------------------
// 1. Tracked reads inside an effect
// ---------------------------------------------------------------------------

fn bench_tracked_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracking/reads");

    for width in [10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(width as u64));
        let runtime = Runtime::new();
        let state = runtime.wrap(&record_of(width));
        let keys: Vec<String> = (0..width).map(|i| format!("f{i}")).collect();

        group.bench_with_input(BenchmarkId::new("effect", width), &(), |b, _| {
            b.iter(|| {
                let (s, keys) = (state.clone(), keys.clone());
                let effect = runtime
                    .effect(move || {
                        for key in &keys {
                            black_box(s.get(key.as_str())?);
                        }
                        Ok(())
                    })
                    .unwrap();
                effect.dispose();
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 2. Many writes, one flush
// ---------------------------------------------------------------------------

fn bench_batched_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracking/flush");

    for subscribers in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(subscribers as u64));
        let runtime = Runtime::new();
        let state = runtime.wrap(&record_of(4));
        let effects: Vec<_> = (0..subscribers)
            .map(|_| {
                let s = state.clone();
                runtime
                    .effect(move || {
                        black_box(s.get("f0")?);
                        black_box(s.get("f1")?);
                        Ok(())
                    })
                    .unwrap()
            })
            .collect();

        let mut n = 0i64;
        group.bench_with_input(BenchmarkId::new("writes", subscribers), &(), |b, _| {
            b.iter(|| {
                n += 1;
                state.set("f0", n).unwrap();
                state.set("f1", n).unwrap();
                runtime.run_until_idle().unwrap()
            });
        });

        for effect in effects {
            effect.dispose();
        }
    }

    group.finish();
}

criterion_group!(benches, bench_tracked_reads, bench_batched_flush);
criterion_main!(benches);

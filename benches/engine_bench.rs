//! Benchmarks for the three sort entry points on the CPU backend.
//!
//! Run with:  `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gpu_sort_engine::{EngineConfig, SortArray, SortEngine};

fn pseudo_random(n: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (state >> 40) as f32
        })
        .collect()
}

fn bench_batched_sort(c: &mut Criterion) {
    let engine = SortEngine::new(EngineConfig::default()).unwrap();
    let values = pseudo_random(1 << 18, 7);
    let mut group = c.benchmark_group("sort_array");
    for row_length in [64usize, 4096, 1 << 18] {
        let shape = [values.len() / row_length, row_length];
        group.bench_with_input(BenchmarkId::from_parameter(row_length), &shape, |b, shape| {
            b.iter(|| {
                let mut array = SortArray::Float32(values.clone());
                engine.sort_array(&mut array, black_box(shape)).unwrap();
                black_box(array);
            })
        });
    }
    group.finish();
}

fn bench_argsort(c: &mut Criterion) {
    let engine = SortEngine::new(EngineConfig::default()).unwrap();
    let data = SortArray::Float32(pseudo_random(1 << 18, 11));
    c.bench_function("argsort_256k_f32", |b| {
        b.iter(|| black_box(engine.argsort_array(black_box(&data)).unwrap()))
    });
}

fn bench_lexsort(c: &mut Criterion) {
    let engine = SortEngine::new(EngineConfig::default()).unwrap();
    let n = 1 << 16;
    let keys: Vec<i32> = pseudo_random(3 * n, 13)
        .into_iter()
        .map(|v| v as i32 % 16)
        .collect();
    let keys = SortArray::Int32(keys);
    c.bench_function("lexsort_3x64k_i32", |b| {
        b.iter(|| black_box(engine.lexsort_array(black_box(&keys), 3, n).unwrap()))
    });
}

criterion_group!(benches, bench_batched_sort, bench_argsort, bench_lexsort);
criterion_main!(benches);

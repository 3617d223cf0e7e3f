//! Allocation and collection throughput benchmarks.

use criterion::{criterion_group, criterion_main, Criterion};
use karst_gc::{with_stack_anchor, Heap};
use std::hint::black_box;

fn bench_small_allocation(c: &mut Criterion) {
    c.bench_function("allocate_64_bytes", |b| {
        with_stack_anchor(|| {
            let mut heap = Heap::new();
            b.iter(|| {
                black_box(heap.allocate(64));
            });
        });
    });
}

fn bench_large_allocation(c: &mut Criterion) {
    c.bench_function("allocate_16_kib", |b| {
        with_stack_anchor(|| {
            let mut heap = Heap::new();
            b.iter(|| {
                black_box(heap.allocate(16 * 1024));
            });
        });
    });
}

fn bench_collection_pause(c: &mut Criterion) {
    c.bench_function("collect_10k_garbage_objects", |b| {
        with_stack_anchor(|| {
            let mut heap = Heap::new();
            b.iter(|| {
                for _ in 0..10_000 {
                    black_box(heap.allocate(64));
                }
                heap.collect();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_small_allocation,
    bench_large_allocation,
    bench_collection_pause
);
criterion_main!(benches);

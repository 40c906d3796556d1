//! Benchmarks for snapshot resolution.
//!
//! Resolution walks a node's history chain, so the cost of reading an old
//! version grows with the number of rotations since then. These benchmarks
//! measure that walk and the commit-time cost of a rotation.

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use chronograph::models::{NodeId, PropertyValue, Range, Version};
use chronograph::storage::{GraphTransaction, GraphWrite};
use chronograph::VersionedGraph;

/// Builds a node rotated `length - 1` times, one version per rotation.
fn chain(length: u64) -> (VersionedGraph, NodeId) {
    let graph = VersionedGraph::in_memory().unwrap();
    let mut tx = graph.begin_tx().unwrap();
    let node = tx.create_node();
    tx.set_property(node.into(), "step", PropertyValue::from(0))
        .unwrap();
    tx.commit().unwrap();

    for step in 1..length {
        let mut tx = graph.begin_tx().unwrap();
        let step = i64::try_from(step).unwrap();
        tx.set_property(node.into(), "step", PropertyValue::from(step))
            .unwrap();
        tx.commit().unwrap();
    }
    (graph, node)
}

// ============================================================================
// Resolution Benchmarks
// ============================================================================

fn bench_resolve_oldest(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_oldest");
    for length in [1u64, 10, 100, 1000] {
        let (graph, node) = chain(length);
        let snapshot = graph.snapshot().unwrap();
        let context = graph.version_context(Version::new(1));
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, _| {
            b.iter(|| {
                let view = context.for_node(&*snapshot, black_box(node)).unwrap();
                black_box(view.property("step").unwrap())
            });
        });
    }
    group.finish();
}

fn bench_resolve_latest(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_latest");
    for length in [1u64, 100, 1000] {
        let (graph, node) = chain(length);
        let snapshot = graph.snapshot().unwrap();
        let context = graph.version_context(Version::new(length));
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, _| {
            b.iter(|| {
                let view = context.for_node(&*snapshot, black_box(node)).unwrap();
                black_box(view.property("step").unwrap())
            });
        });
    }
    group.finish();
}

fn bench_rotation_commit(c: &mut Criterion) {
    let (graph, node) = chain(1);
    let mut step = 0i64;
    c.bench_function("rotation_commit", |b| {
        b.iter(|| {
            step += 1;
            let mut tx = graph.begin_tx().unwrap();
            tx.set_property(node.into(), "step", PropertyValue::from(step))
                .unwrap();
            tx.commit().unwrap();
        });
    });
}

fn bench_compact(c: &mut Criterion) {
    let ranges: Vec<Range> = (0..256u64)
        .map(|i| Range::new(i * 3, i * 3 + 4).unwrap())
        .collect();
    c.bench_function("compact_256", |b| {
        b.iter(|| black_box(Range::compact(black_box(ranges.iter().copied()))));
    });
}

criterion_group!(
    benches,
    bench_resolve_oldest,
    bench_resolve_latest,
    bench_rotation_commit,
    bench_compact
);
criterion_main!(benches);

//! Benchmarks for the driver loop.

use async_effect::diagnostics::NoOpDiagnosticSink;
use async_effect::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use futures::executor::LocalPool;
use std::sync::Arc;

fn yields(n: usize) -> Steps<usize> {
    let mut steps = Steps::new();
    for _ in 0..n {
        steps = steps.then(|input| Ok(Step::Yield(input.value().unwrap_or(0) + 1)));
    }
    steps.then(|input| {
        black_box(input.value());
        Ok(Step::done())
    })
}

fn awaits(n: usize) -> Steps<usize> {
    let mut steps = Steps::new();
    for _ in 0..n {
        steps = steps.then(|input| Ok(Step::ready(input.value().unwrap_or(0) + 1)));
    }
    steps.then(|input| {
        black_box(input.value());
        Ok(Step::done())
    })
}

fn driver_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("driver");

    for n in [1, 16, 256] {
        group.bench_with_input(BenchmarkId::new("plain_yields", n), &n, |b, &n| {
            let pool = LocalPool::new();
            b.iter(|| {
                let mut effect: AsyncEffect<(), usize> =
                    AsyncEffect::new(pool.spawner()).with_sink(Arc::new(NoOpDiagnosticSink));
                effect.render(move |_| yields(n), ());
            });
        });

        group.bench_with_input(BenchmarkId::new("awaited_values", n), &n, |b, &n| {
            let mut pool = LocalPool::new();
            b.iter(|| {
                let mut effect: AsyncEffect<(), usize> =
                    AsyncEffect::new(pool.spawner()).with_sink(Arc::new(NoOpDiagnosticSink));
                effect.render(move |_| awaits(n), ());
                pool.run_until_stalled();
            });
        });
    }

    group.bench_function("rerender_unchanged_deps", |b| {
        let pool = LocalPool::new();
        let mut effect: AsyncEffect<u32, usize> =
            AsyncEffect::new(pool.spawner()).with_sink(Arc::new(NoOpDiagnosticSink));
        b.iter(|| effect.render(|_| yields(1), black_box(7)));
    });

    group.finish();
}

criterion_group!(benches, driver_benchmark);
criterion_main!(benches);

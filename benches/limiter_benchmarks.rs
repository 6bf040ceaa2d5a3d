use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nestfeed_core::{ClientCore, ConcurrencyLimiter, CoreConfig, CoreError, InMemoryRelationSource};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn benchmark_uncontended_execute(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let limiter = ConcurrencyLimiter::new("bench", 4).unwrap();

    c.bench_function("limiter_execute_uncontended", |b| {
        b.iter(|| {
            runtime.block_on(async {
                limiter
                    .execute(|| async { Ok::<_, CoreError>(black_box(1)) })
                    .await
            })
        })
    });
}

fn benchmark_batch_throughput(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("limiter_execute_all");

    for capacity in [1usize, 4, 16] {
        let limiter = ConcurrencyLimiter::new("bench", capacity).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, _| {
            b.iter(|| {
                runtime.block_on(async {
                    let tasks: Vec<_> = (0..64)
                        .map(|i| move || async move {
                            tokio::task::yield_now().await;
                            Ok::<_, CoreError>(i)
                        })
                        .collect();
                    black_box(limiter.execute_all(tasks).await)
                })
            })
        });
    }

    group.finish();
}

fn benchmark_cached_resolve(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let source = Arc::new(InMemoryRelationSource::new());
    source.set_owner("user-1", "space-1");
    let core = ClientCore::new(CoreConfig::for_test(), source).unwrap();
    runtime
        .block_on(core.identity_relations().resolve("user-1"))
        .unwrap();

    c.bench_function("identity_relation_cache_hit", |b| {
        b.iter(|| black_box(core.identity_relations().peek(black_box("user-1"))))
    });
}

criterion_group!(
    benches,
    benchmark_uncontended_execute,
    benchmark_batch_throughput,
    benchmark_cached_resolve
);
criterion_main!(benches);

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use batch_pool::{from_fn, Batch, Callable, Config, Signature, Strategy, WorkerPool};
use futures::StreamExt;
use std::hint::black_box;

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .unwrap()
}

// Benchmark 1: три стратегии на одном batch
fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategies");

    for size in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));

        for strategy in [Strategy::Ordered, Strategy::Unordered, Strategy::Futures] {
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), size),
                &size,
                |b, &size| {
                    let rt = create_runtime();
                    let pool = rt.block_on(async { WorkerPool::with_config(Config::default()).unwrap() });

                    b.to_async(&rt).iter(|| {
                        let pool = &pool;
                        async move {
                            let items: Vec<u64> = (0..size).collect();
                            let outcomes = pool
                                .submit(items, from_fn(|x: u64| black_box(x * 2)))
                                .collect_with(strategy)
                                .unwrap()
                                .collect()
                                .await;
                            black_box(outcomes);
                        }
                    });

                    rt.block_on(pool.shutdown());
                },
            );
        }
    }

    group.finish();
}

// Benchmark 2: масштабирование по числу воркеров
fn bench_worker_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker_scaling");
    group.sample_size(20);

    let tasks = 5000u64;
    group.throughput(Throughput::Elements(tasks));

    for workers in [1, 2, 4, 8, 16] {
        if workers > num_cpus::get() * 2 {
            continue;
        }
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &workers| {
            let rt = create_runtime();
            let pool = rt.block_on(async { WorkerPool::start(workers).unwrap() });

            b.to_async(&rt).iter(|| {
                let pool = &pool;
                async move {
                    let items: Vec<u64> = (0..tasks).collect();
                    let count = pool
                        .submit(items, from_fn(|x: u64| black_box(x.wrapping_mul(x))))
                        .ordered()
                        .unwrap()
                        .count()
                        .await;
                    black_box(count);
                }
            });

            rt.block_on(pool.shutdown());
        });
    }

    group.finish();
}

// Benchmark 3: overhead partial callable против обычного closure
fn bench_binding(c: &mut Criterion) {
    let mut group = c.benchmark_group("binding");
    let size = 1000u64;
    group.throughput(Throughput::Elements(size));

    let rt = create_runtime();
    let pool = rt.block_on(async { WorkerPool::with_config(Config::cpu_bound()).unwrap() });

    group.bench_function("plain_closure", |b| {
        b.to_async(&rt).iter(|| async {
            let items: Vec<(u64, u64)> = (0..size).map(|n| (n, 10)).collect();
            let outcomes = pool
                .submit(items, from_fn(|(n, m): (u64, u64)| black_box((n, m))))
                .futures()
                .unwrap()
                .join()
                .await;
            black_box(outcomes);
        });
    });

    group.bench_function("partial_callable", |b| {
        let f: Callable<u64, (u64, u64)> =
            Callable::new(Signature::new(["n", "m"]), |inv| black_box((*inv.arg(0), *inv.arg(1))));
        let partial = f.partial().kwarg("m", 10);

        b.to_async(&rt).iter(|| async {
            let outcomes = pool
                .submit(Batch::scalars(0..size), partial.clone())
                .futures()
                .unwrap()
                .join()
                .await;
            black_box(outcomes);
        });
    });

    rt.block_on(pool.shutdown());
    group.finish();
}

criterion_group!(
    benches,
    bench_strategies,
    bench_worker_scaling,
    bench_binding,
);
criterion_main!(benches);

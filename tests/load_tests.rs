#[cfg(test)]
mod tests {
    use batch_pool::{
        from_fn, Batch, Callable, Config, Signature, Strategy, TaskOutcome, WorkerPool,
    };
    use futures::StreamExt;
    use std::{
        future::Future,
        thread,
        time::{Duration, Instant},
    };

    async fn measure<F, Fut, T>(name: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let start = Instant::now();
        let result = f().await;
        let elapsed = start.elapsed();
        println!("✓ {}: {:?}", name, elapsed);
        result
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_1_small_fast_tasks() {
        println!("\n=== LOAD TEST 1: 10k instant tasks, unordered ===");
        let pool = WorkerPool::with_config(Config::io_bound()).unwrap();

        let items: Vec<u64> = (0..10_000).collect();
        let results: Vec<TaskOutcome<u64>> = measure("10k tasks", || async {
            pool.submit(items, from_fn(|x: u64| x * 2))
                .unordered()
                .unwrap()
                .collect()
                .await
        })
        .await;

        assert_eq!(results.len(), 10_000);
        let total: u64 = results.iter().map(|o| *o.value.as_ref().unwrap()).sum();
        assert_eq!(total, 2 * (0..10_000u64).sum::<u64>());

        pool.shutdown().await;
        let metrics = pool.metrics();
        println!("  Completed: {}/{}", metrics.completed_tasks, results.len());
        assert_eq!(metrics.completed_tasks, 10_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_2_ordered_with_jitter() {
        println!("\n=== LOAD TEST 2: 2k tasks with jitter, ordered ===");
        let pool = WorkerPool::start(16).unwrap();

        let items: Vec<u32> = (0..2_000).collect();
        let results: Vec<_> = measure("2k tasks @ 0-1ms", || async {
            pool.submit(items, from_fn(|x: u32| {
                thread::sleep(Duration::from_micros(fastrand::u64(0..1_000)));
                x
            }))
            .ordered()
            .unwrap()
            .collect()
            .await
        })
        .await;

        for (expected, outcome) in results.iter().enumerate() {
            assert_eq!(outcome.task_id, expected);
            assert_eq!(outcome.value, Ok(expected as u32));
        }

        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_3_parallel_speedup() {
        println!("\n=== LOAD TEST 3: 40 tasks @ 20ms on 10 workers ===");
        let pool = WorkerPool::start(10).unwrap();

        let start = Instant::now();
        let results = pool
            .submit((0..40).collect::<Vec<u32>>(), from_fn(|x: u32| {
                thread::sleep(Duration::from_millis(20));
                x
            }))
            .futures()
            .unwrap()
            .join()
            .await;
        let elapsed = start.elapsed();
        println!("  elapsed: {:?}", elapsed);

        assert_eq!(results.len(), 40);
        // Последовательно было бы 800ms
        assert!(elapsed < Duration::from_millis(600), "no parallelism: {:?}", elapsed);

        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_4_workers_reused_across_batches() {
        println!("\n=== LOAD TEST 4: 50 batches on one pool ===");
        let pool = WorkerPool::start(4).unwrap();
        let f: Callable<u64, (u64, u64)> = Callable::new(
            Signature::new(["n", "m"]).with_var_keywords(),
            |inv| (*inv.arg(0), *inv.arg(1)),
        );
        let partial = f.partial().kwarg("m", 10).kwarg("x", 1);

        measure("50 batches x 100 tasks", || async {
            for round in 0..50u64 {
                let strategy = match round % 3 {
                    0 => Strategy::Ordered,
                    1 => Strategy::Unordered,
                    _ => Strategy::Futures,
                };
                let inputs: Vec<u64> = (0..100).map(|i| round * 1000 + i).collect();
                let mut outcomes = pool
                    .submit(Batch::scalars(inputs.clone()), partial.clone())
                    .collect_with(strategy)
                    .unwrap()
                    .collect()
                    .await;
                outcomes.sort_by_key(|o| o.task_id);

                let got: Vec<_> = outcomes.into_iter().map(|o| o.value.unwrap()).collect();
                let want: Vec<_> = inputs.iter().map(|&n| (n, 10)).collect();
                assert_eq!(got, want, "round {} ({})", round, strategy);
            }
        })
        .await;

        pool.shutdown().await;
        let metrics = pool.metrics();
        assert_eq!(metrics.total_submitted, 5_000);
        assert_eq!(metrics.completed_tasks, 5_000);
        assert_eq!(metrics.failed_tasks, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_5_many_concurrent_submissions() {
        println!("\n=== LOAD TEST 5: 20 concurrent submissions ===");
        let pool = WorkerPool::start(8).unwrap();

        let streams: Vec<_> = (0..20u32)
            .map(|batch| {
                pool.submit((0..200u32).collect::<Vec<_>>(), from_fn(move |x: u32| batch * 1_000 + x))
                    .ordered()
                    .unwrap()
            })
            .collect();

        let all = measure("20 x 200 ordered", || async {
            futures::future::join_all(streams.into_iter().map(|s| s.collect::<Vec<_>>())).await
        })
        .await;

        for (batch, outcomes) in all.into_iter().enumerate() {
            let got: Vec<_> = outcomes.into_iter().map(|o| o.value.unwrap()).collect();
            let want: Vec<_> = (0..200u32).map(|x| batch as u32 * 1_000 + x).collect();
            assert_eq!(got, want);
        }

        pool.shutdown().await;
    }
}

use anyhow::{bail, ensure, Result};
use batch_pool::{
    Batch, Callable, Config, LogProgress, Signature, Strategy, TaskFactory, TaskOutcome, WorkerPool,
    Argument,
};
use clap::Parser;
use std::{
    fmt::Debug,
    thread,
    time::{Duration, Instant},
};
use tokio::runtime::Builder;
use tracing::info;
use tracing_subscriber::EnvFilter;

const STRATEGIES: [Strategy; 3] = [Strategy::Ordered, Strategy::Unordered, Strategy::Futures];

/// Демо: batch через пул воркеров под каждой стратегией
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Количество воркеров
    #[arg(short, long, default_value_t = 10)]
    workers: usize,

    /// Задач в batch
    #[arg(short, long, default_value_t = 100)]
    jobs: usize,

    /// Seed для входных данных
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Имитация работы задачи, мс
    #[arg(long, default_value_t = 50)]
    delay_ms: u64,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let rt = Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(run(args))
}

fn single_argument(delay: Duration) -> Callable<u64, u64> {
    Callable::new(Signature::new(["n"]), move |inv| {
        thread::sleep(delay);
        *inv.arg(0)
    })
}

fn multiple_argument(delay: Duration) -> Callable<u64, (u64, u64)> {
    let signature = Signature::new(["n", "m"])
        .with_var_positional()
        .with_var_keywords();
    Callable::new(signature, move |inv| {
        thread::sleep(delay);
        (*inv.arg(0), *inv.arg(1))
    })
}

async fn run(args: Args) -> Result<()> {
    let delay = Duration::from_millis(args.delay_ms);
    let mut rng = fastrand::Rng::with_seed(args.seed);
    let inputs: Vec<u64> = (0..args.jobs).map(|_| rng.u64(0..=100)).collect();
    let pairs: Vec<(u64, u64)> = (0..args.jobs)
        .map(|_| (rng.u64(0..=100), rng.u64(0..=100)))
        .collect();
    let now = Instant::now();

    WorkerPool::scope(Config::with_workers(args.workers), |pool| async move {
        let scalars = || Batch::scalars(inputs.clone());
        let tuples = || Batch::tuples(pairs.iter().map(|&(a, b)| [a, b]));

        for strategy in STRATEGIES {
            let label = format!("single argument, {}", strategy);
            let outcomes = drain(&pool, scalars(), single_argument(delay), strategy, &label).await?;
            check(&label, strategy, outcomes, &inputs)?;
        }

        let with_m: Vec<(u64, u64)> = inputs.iter().map(|&n| (n, 10)).collect();
        for strategy in STRATEGIES {
            let label = format!("partial m=10, {}", strategy);
            let factory = multiple_argument(delay).partial().kwarg("m", 10);
            let outcomes = drain(&pool, scalars(), factory, strategy, &label).await?;
            check(&label, strategy, outcomes, &with_m)?;
        }

        for strategy in STRATEGIES {
            let label = format!("tuple arguments, {}", strategy);
            let outcomes = drain(&pool, tuples(), multiple_argument(delay), strategy, &label).await?;
            check(&label, strategy, outcomes, &pairs)?;
        }

        for strategy in STRATEGIES {
            let label = format!("tuple arguments with x, y, z, {}", strategy);
            let factory = multiple_argument(delay)
                .partial()
                .kwarg("x", 1)
                .kwarg("y", 2)
                .kwarg("z", 3);
            let outcomes = drain(&pool, tuples(), factory, strategy, &label).await?;
            check(&label, strategy, outcomes, &pairs)?;
        }

        let metrics = pool.metrics();
        info!(
            submitted = metrics.total_submitted,
            completed = metrics.completed_tasks,
            failed = metrics.failed_tasks,
            "pool totals"
        );
        Ok::<(), anyhow::Error>(())
    })
    .await??;

    info!(elapsed = ?now.elapsed(), "all scenarios passed");
    Ok(())
}

async fn drain<F>(
    pool: &batch_pool::Pool,
    batch: Batch<Argument<u64>>,
    factory: F,
    strategy: Strategy,
    label: &str,
) -> Result<Vec<TaskOutcome<F::Output>>>
where
    F: TaskFactory<Argument<u64>>,
{
    info!("running {} ...", label);
    let step = (batch.len() / 10).max(1);
    let source = pool
        .submit(batch, factory)
        .with_progress(LogProgress::new(label).every(step))
        .collect_with(strategy)?;
    Ok(source.collect().await)
}

fn check<T>(label: &str, strategy: Strategy, mut outcomes: Vec<TaskOutcome<T>>, expected: &[T]) -> Result<()>
where
    T: PartialEq + Debug,
{
    ensure!(
        outcomes.len() == expected.len(),
        "{}: expected {} results, got {}",
        label,
        expected.len(),
        outcomes.len()
    );
    if strategy == Strategy::Unordered {
        outcomes.sort_by_key(|o| o.task_id);
    }
    for (position, (outcome, want)) in outcomes.iter().zip(expected).enumerate() {
        ensure!(outcome.task_id == position, "{}: result {} out of place", label, outcome.task_id);
        match &outcome.value {
            Ok(value) => ensure!(value == want, "{}: task {} gave {:?}, want {:?}", label, position, value, want),
            Err(err) => bail!("{}: task {} failed: {}", label, position, err),
        }
    }
    Ok(())
}

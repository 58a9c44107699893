use super::{
    collector::{self, FutureSet, OrderedStream, ResultSource, UnorderedStream},
    errors::PoolError,
    model::{PoolMetrics, Strategy},
    progress::{Progress, ProgressTracker},
    task::{Batch, TaskFactory},
};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
};
use crossbeam::deque::{Injector, Steal};
use tokio::{
    runtime::Handle,
    sync::Notify,
    task::JoinHandle,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};


/// Задача в общей очереди, возвращает успех
pub(crate) type Job = Box<dyn FnOnce() -> bool + Send + 'static>;

/// Конфигурация пула
#[derive(Debug, Clone)]
pub struct Config {
    pub num_workers: usize,
    /// Окно упорядоченного потока, по умолчанию `num_workers`
    pub reorder_window: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
            reorder_window: None,
        }
    }
}

impl Config {
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    pub fn cpu_bound() -> Self {
        Self::with_workers(num_cpus::get())
    }

    pub fn io_bound() -> Self {
        Self::with_workers(num_cpus::get() * 2)
    }

    pub fn reorder_window(mut self, window: usize) -> Self {
        self.reorder_window = Some(window);
        self
    }

    fn validate(&self) -> Result<(), PoolError> {
        if self.num_workers == 0 {
            return Err(PoolError::Config("need at least 1 worker".into()));
        }
        if self.reorder_window == Some(0) {
            return Err(PoolError::Config("reorder window must be at least 1".into()));
        }
        Ok(())
    }

    #[inline]
    fn window(&self) -> usize {
        self.reorder_window.unwrap_or(self.num_workers)
    }
}


pub type Pool = Arc<WorkerPool>;

/// Фиксированный набор воркеров с одной общей очередью.
/// Воркеры живут до [`shutdown`](WorkerPool::shutdown) и переиспользуются всеми batch.
pub struct WorkerPool {
    inject: Injector<Job>,
    work_available: Notify,
    drained: Notify,
    shutdown_token: CancellationToken,
    accepting: RwLock<bool>,
    active_tasks: AtomicUsize,
    running_tasks: AtomicUsize,
    idle_workers: AtomicUsize,
    queued_tasks: AtomicUsize,
    total_submitted: AtomicUsize,
    completed_tasks: AtomicUsize,
    failed_tasks: AtomicUsize,
    submissions: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: Config,
}

impl WorkerPool {
    /// Запускает `num_workers` воркеров на текущем runtime
    pub fn start(num_workers: usize) -> Result<Pool, PoolError> {
        Self::with_config(Config::with_workers(num_workers))
    }

    pub fn with_config(config: Config) -> Result<Pool, PoolError> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| PoolError::Config(format!("no tokio runtime: {}", e)))?;

        let num_workers = config.num_workers;
        let pool = Arc::new(WorkerPool {
            inject: Injector::new(),
            work_available: Notify::new(),
            drained: Notify::new(),
            shutdown_token: CancellationToken::new(),
            accepting: RwLock::new(true),
            active_tasks: AtomicUsize::new(0),
            running_tasks: AtomicUsize::new(0),
            idle_workers: AtomicUsize::new(0),
            queued_tasks: AtomicUsize::new(0),
            total_submitted: AtomicUsize::new(0),
            completed_tasks: AtomicUsize::new(0),
            failed_tasks: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
            workers: Mutex::new(Vec::with_capacity(num_workers)),
            config,
        });

        let handles: Vec<_> = (0..num_workers)
            .map(|worker_id| runtime.spawn(Arc::clone(&pool).worker_loop(worker_id)))
            .collect();
        *pool.workers.lock().unwrap_or_else(PoisonError::into_inner) = handles;

        info!(workers = num_workers, "worker pool started");
        Ok(pool)
    }

    /// Пул на время `f`, shutdown в конце. При панике воркеры тоже останавливаются
    pub async fn scope<T, F, Fut>(config: Config, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(Pool) -> Fut,
        Fut: Future<Output = T>,
    {
        let pool = Self::with_config(config)?;
        let guard = pool.shutdown_token.clone().drop_guard();
        let out = f(Arc::clone(&pool)).await;
        pool.shutdown().await;
        let _ = guard.disarm();
        Ok(out)
    }

    /// Стратегия выбирается на [`Submission`]
    pub fn submit<A, F>(self: &Arc<Self>, batch: impl Into<Batch<A>>, factory: F) -> Submission<'_, A, F>
    where
        A: Send + 'static,
        F: TaskFactory<A>,
    {
        Submission {
            pool: self,
            items: batch.into().into_items(),
            factory,
            progress: None,
        }
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        !*self.accepting.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Постановка нового submission, ошибка после shutdown
    pub(crate) fn enqueue<I>(&self, jobs: I) -> Result<usize, PoolError>
    where
        I: IntoIterator<Item = Job>,
    {
        // Держим lock на весь push, иначе shutdown проскочит между проверкой и push
        let accepting = self.accepting.read().unwrap_or_else(PoisonError::into_inner);
        if !*accepting {
            return Err(PoolError::ShutDown);
        }
        let mut pushed = 0;
        for job in jobs {
            self.push_job(job);
            pushed += 1;
        }
        Ok(pushed)
    }

    #[inline(always)]
    pub(crate) fn push_job(&self, job: Job) {
        self.active_tasks.fetch_add(1, Ordering::AcqRel);
        self.total_submitted.fetch_add(1, Ordering::Relaxed);
        self.queued_tasks.fetch_add(1, Ordering::Relaxed);
        self.inject.push(job);
        self.work_available.notify_one();
    }

    fn claim(&self) -> Option<Job> {
        loop {
            match self.inject.steal() {
                Steal::Success(job) => {
                    self.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                    return Some(job);
                }
                Steal::Empty => return None,
                Steal::Retry => std::hint::spin_loop(),
            }
        }
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        debug!(worker_id, "worker started");
        loop {
            if let Some(job) = self.claim() {
                // Будим следующего воркера, пока очередь не пуста
                if !self.inject.is_empty() {
                    self.work_available.notify_one();
                }
                self.run(worker_id, job).await;
                continue;
            }

            if self.shutdown_token.is_cancelled() {
                break;
            }

            self.idle_workers.fetch_add(1, Ordering::AcqRel);
            if !self.inject.is_empty() {
                self.idle_workers.fetch_sub(1, Ordering::AcqRel);
                continue;
            }
            tokio::select! {
                _ = self.work_available.notified() => {}
                _ = self.shutdown_token.cancelled() => {}
            }
            self.idle_workers.fetch_sub(1, Ordering::AcqRel);
        }
        debug!(worker_id, "worker stopped");
    }

    async fn run(&self, worker_id: usize, job: Job) {
        self.running_tasks.fetch_add(1, Ordering::AcqRel);
        // Callable синхронный и может блокировать
        let succeeded = match tokio::task::spawn_blocking(job).await {
            Ok(succeeded) => succeeded,
            Err(err) => {
                warn!(worker_id, error = %err, "task execution context lost");
                false
            }
        };
        self.running_tasks.fetch_sub(1, Ordering::AcqRel);

        if succeeded {
            self.completed_tasks.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_tasks.fetch_add(1, Ordering::Relaxed);
            trace!(worker_id, "task finished with error");
        }

        if self.active_tasks.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            num_workers: self.config.num_workers,
            running_tasks: self.running_tasks.load(Ordering::Relaxed),
            idle_workers: self.idle_workers.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            total_submitted: self.total_submitted.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
        }
    }

    /// Ждем завершения всех задач
    pub async fn join_all(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active_tasks.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Закрываем прием, дожидаемся задач и останавливаем воркеров.
    /// Повторный вызов безопасен
    pub async fn shutdown(&self) {
        let first = {
            let mut accepting = self.accepting.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *accepting, false)
        };
        if first {
            info!(workers = self.config.num_workers, "shutting down worker pool");
        }

        self.join_all().await;
        self.shutdown_token.cancel();

        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "worker exited abnormally");
            }
        }

        if first {
            info!("worker pool shut down");
        }
    }

    /// Периодический snapshot метрик в callback
    /// Остановка: token.cancel() или shutdown пула
    pub fn start_monitoring<F>(self: &Arc<Self>, interval: Duration, callback: F) -> CancellationToken
    where
        F: Fn(PoolMetrics) + Send + 'static,
    {
        let pool = Arc::clone(self);
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        callback(pool.metrics());
                    }
                    _ = token_clone.cancelled() => break,
                    _ = pool.shutdown_token.cancelled() => break,
                }
            }
        });

        token
    }

    pub fn stop_monitoring(token: CancellationToken) {
        token.cancel();
    }
}


/// Batch, ожидающий выбора стратегии
pub struct Submission<'p, A, F> {
    pool: &'p Pool,
    items: Vec<A>,
    factory: F,
    progress: Option<Arc<dyn Progress>>,
}

impl<'p, A, F> Submission<'p, A, F>
where
    A: Send + 'static,
    F: TaskFactory<A>,
{
    pub fn with_progress<P: Progress + 'static>(mut self, progress: P) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn ordered(self) -> Result<OrderedStream<F::Output>, PoolError> {
        let (pool, items, factory, tracker) = self.prepare(Strategy::Ordered);
        collector::ordered(pool, items, factory, pool.config.window(), tracker)
    }

    pub fn unordered(self) -> Result<UnorderedStream<F::Output>, PoolError> {
        let (pool, items, factory, tracker) = self.prepare(Strategy::Unordered);
        collector::unordered(pool, items, factory, tracker)
    }

    /// Handles возвращаются сразу, без ожидания задач
    pub fn futures(self) -> Result<FutureSet<F::Output>, PoolError> {
        let (pool, items, factory, tracker) = self.prepare(Strategy::Futures);
        collector::futures(pool, items, factory, tracker)
    }

    pub fn collect_with(self, strategy: Strategy) -> Result<ResultSource<F::Output>, PoolError> {
        Ok(match strategy {
            Strategy::Ordered => ResultSource::Ordered(self.ordered()?),
            Strategy::Unordered => ResultSource::Unordered(self.unordered()?),
            Strategy::Futures => ResultSource::Futures(self.futures()?),
        })
    }

    fn prepare(self, strategy: Strategy) -> (&'p Pool, Vec<A>, F, ProgressTracker) {
        let submission = self.pool.submissions.fetch_add(1, Ordering::Relaxed);
        debug!(submission, tasks = self.items.len(), %strategy, "batch submitted");
        let tracker = ProgressTracker::new(self.progress, self.items.len());
        (self.pool, self.items, self.factory, tracker)
    }
}

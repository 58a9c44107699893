//! Стратегии доставки результатов.
//!
//! У каждого submission свой collector, результаты разных batch не смешиваются.

use super::{
    errors::PoolError,
    handle::TaskHandle,
    model::Strategy,
    pool::{Job, WorkerPool},
    progress::ProgressTracker,
    result::{TaskOutcome, TaskResult},
    task::{Task, TaskFactory, TaskId},
};
use futures::{Stream, StreamExt};
use std::{
    collections::BTreeMap,
    iter::Enumerate,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    task::{Context, Poll},
    vec,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};


struct ReorderState<A, T> {
    next_expected: TaskId,
    next_dispatch: TaskId,
    backlog: Enumerate<vec::IntoIter<A>>,
    pending: BTreeMap<TaskId, TaskResult<T>>,
}

impl<A, T> ReorderState<A, T> {
    /// Задачи из backlog, попадающие в окно от курсора
    fn take_dispatchable(&mut self, window: usize) -> Vec<(TaskId, A)> {
        let limit = self.next_expected.saturating_add(window);
        let mut ready = Vec::new();
        while self.next_dispatch < limit {
            match self.backlog.next() {
                Some((id, arg)) => {
                    self.next_dispatch = id + 1;
                    ready.push((id, arg));
                }
                None => break,
            }
        }
        ready
    }
}

/// Сторона воркеров для [`OrderedStream`].
///
/// В пул уходят только задачи в пределах `window` от курсора, поэтому
/// `pending` держит не больше `window - 1` результатов.
struct OrderedCollector<A, F: TaskFactory<A>> {
    pool: Weak<WorkerPool>,
    factory: Arc<F>,
    window: usize,
    progress: ProgressTracker,
    released: mpsc::UnboundedSender<TaskOutcome<F::Output>>,
    state: Mutex<ReorderState<A, F::Output>>,
}

impl<A, F> OrderedCollector<A, F>
where
    A: Send + 'static,
    F: TaskFactory<A>,
{
    fn lock_state(&self) -> MutexGuard<'_, ReorderState<A, F::Output>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn job(self: &Arc<Self>, id: TaskId, arg: A) -> Job {
        let collector = Arc::clone(self);
        Box::new(move || {
            let outcome = Task::new(id, arg, Arc::clone(&collector.factory)).invoke();
            let succeeded = outcome.is_ok();
            collector.publish(outcome);
            succeeded
        })
    }

    fn publish(self: &Arc<Self>, outcome: TaskOutcome<F::Output>) {
        self.progress.record();

        let ready = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            state.pending.insert(outcome.task_id, outcome.value);
            // Отправка под lock сохраняет порядок
            while let Some(value) = state.pending.remove(&state.next_expected) {
                trace!(task_id = state.next_expected, "released");
                let _ = self.released.send(TaskOutcome::new(state.next_expected, value));
                state.next_expected += 1;
            }
            state.take_dispatchable(self.window)
        };

        if ready.is_empty() {
            return;
        }
        match self.pool.upgrade() {
            Some(pool) => {
                for (id, arg) in ready {
                    pool.push_job(self.job(id, arg));
                }
            }
            None => warn!(dropped = ready.len(), "worker pool gone, ordered tasks not dispatched"),
        }
    }
}

pub(crate) fn ordered<A, F>(
    pool: &Arc<WorkerPool>,
    items: Vec<A>,
    factory: F,
    window: usize,
    progress: ProgressTracker,
) -> Result<OrderedStream<F::Output>, PoolError>
where
    A: Send + 'static,
    F: TaskFactory<A>,
{
    let total = items.len();
    let (released, rx) = mpsc::unbounded_channel();
    let collector = Arc::new(OrderedCollector {
        pool: Arc::downgrade(pool),
        factory: Arc::new(factory),
        window,
        progress,
        released,
        state: Mutex::new(ReorderState {
            next_expected: 0,
            next_dispatch: 0,
            backlog: items.into_iter().enumerate(),
            pending: BTreeMap::new(),
        }),
    });

    let ready = collector.lock_state().take_dispatchable(window);
    pool.enqueue(ready.into_iter().map(|(id, arg)| collector.job(id, arg)))?;
    Ok(OrderedStream::new(rx, total))
}

pub(crate) fn unordered<A, F>(
    pool: &Arc<WorkerPool>,
    items: Vec<A>,
    factory: F,
    progress: ProgressTracker,
) -> Result<UnorderedStream<F::Output>, PoolError>
where
    A: Send + 'static,
    F: TaskFactory<A>,
{
    let total = items.len();
    let (completed, rx) = mpsc::unbounded_channel();
    let factory = Arc::new(factory);
    let progress = Arc::new(progress);

    let jobs = items.into_iter().enumerate().map(|(id, arg)| {
        let factory = Arc::clone(&factory);
        let progress = Arc::clone(&progress);
        let completed = completed.clone();
        Box::new(move || {
            let outcome = Task::new(id, arg, factory).invoke();
            let succeeded = outcome.is_ok();
            progress.record();
            let _ = completed.send(outcome);
            succeeded
        }) as Job
    });
    pool.enqueue(jobs)?;
    Ok(UnorderedStream::new(rx, total))
}

pub(crate) fn futures<A, F>(
    pool: &Arc<WorkerPool>,
    items: Vec<A>,
    factory: F,
    progress: ProgressTracker,
) -> Result<FutureSet<F::Output>, PoolError>
where
    A: Send + 'static,
    F: TaskFactory<A>,
{
    let factory = Arc::new(factory);
    let progress = Arc::new(progress);
    let mut handles = Vec::with_capacity(items.len());
    let mut jobs: Vec<Job> = Vec::with_capacity(items.len());

    for (id, arg) in items.into_iter().enumerate() {
        let (tx, rx) = oneshot::channel();
        handles.push(TaskHandle::new(id, rx));

        let factory = Arc::clone(&factory);
        let progress = Arc::clone(&progress);
        jobs.push(Box::new(move || {
            let outcome = Task::new(id, arg, factory).invoke();
            let succeeded = outcome.is_ok();
            progress.record();
            let _ = tx.send(outcome.value);
            succeeded
        }));
    }

    pool.enqueue(jobs)?;
    Ok(FutureSet { handles })
}


/// Результаты строго по возрастанию task id
pub struct OrderedStream<T> {
    rx: mpsc::UnboundedReceiver<TaskOutcome<T>>,
    next: TaskId,
    total: usize,
}

impl<T> Unpin for OrderedStream<T> {}

impl<T> OrderedStream<T> {
    fn new(rx: mpsc::UnboundedReceiver<TaskOutcome<T>>, total: usize) -> Self {
        Self { rx, next: 0, total }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.total - self.next
    }
}

impl<T> Stream for OrderedStream<T> {
    type Item = TaskOutcome<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.next >= this.total {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(outcome)) => {
                debug_assert_eq!(outcome.task_id, this.next);
                this.next += 1;
                Poll::Ready(Some(outcome))
            }
            // Все senders дропнуты, оставшиеся задачи потеряны
            Poll::Ready(None) => {
                let lost = TaskOutcome::lost(this.next);
                this.next += 1;
                Poll::Ready(Some(lost))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}


/// Результаты в порядке завершения
pub struct UnorderedStream<T> {
    rx: mpsc::UnboundedReceiver<TaskOutcome<T>>,
    seen: Vec<bool>,
    emitted: usize,
    lost: Option<vec::IntoIter<TaskId>>,
}

impl<T> Unpin for UnorderedStream<T> {}

impl<T> UnorderedStream<T> {
    fn new(rx: mpsc::UnboundedReceiver<TaskOutcome<T>>, total: usize) -> Self {
        Self {
            rx,
            seen: vec![false; total],
            emitted: 0,
            lost: None,
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.seen.len() - self.emitted
    }
}

impl<T> Stream for UnorderedStream<T> {
    type Item = TaskOutcome<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.emitted == this.seen.len() {
                return Poll::Ready(None);
            }
            if let Some(lost) = &mut this.lost {
                let next = lost.next().map(|id| {
                    this.emitted += 1;
                    TaskOutcome::lost(id)
                });
                return Poll::Ready(next);
            }
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(outcome)) => {
                    this.seen[outcome.task_id] = true;
                    this.emitted += 1;
                    return Poll::Ready(Some(outcome));
                }
                Poll::Ready(None) => {
                    let missing: Vec<TaskId> = this
                        .seen
                        .iter()
                        .enumerate()
                        .filter(|(_, seen)| !**seen)
                        .map(|(id, _)| id)
                        .collect();
                    this.lost = Some(missing.into_iter());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}


/// Независимый handle на каждый элемент batch
pub struct FutureSet<T> {
    handles: Vec<TaskHandle<T>>,
}

impl<T> FutureSet<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn into_handles(self) -> Vec<TaskHandle<T>> {
        self.handles
    }

    /// Результаты в порядке batch
    pub async fn join(self) -> Vec<TaskResult<T>> {
        let mut results = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            results.push(handle.get().await);
        }
        results
    }

    pub async fn into_outcomes(self) -> Vec<TaskOutcome<T>> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            let task_id = handle.task_id();
            outcomes.push(TaskOutcome::new(task_id, handle.get().await));
        }
        outcomes
    }
}

impl<T> IntoIterator for FutureSet<T> {
    type Item = TaskHandle<T>;
    type IntoIter = vec::IntoIter<TaskHandle<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.handles.into_iter()
    }
}


/// Источник результатов любой стратегии
pub enum ResultSource<T> {
    Ordered(OrderedStream<T>),
    Unordered(UnorderedStream<T>),
    Futures(FutureSet<T>),
}

impl<T> ResultSource<T> {
    pub fn strategy(&self) -> Strategy {
        match self {
            ResultSource::Ordered(_) => Strategy::Ordered,
            ResultSource::Unordered(_) => Strategy::Unordered,
            ResultSource::Futures(_) => Strategy::Futures,
        }
    }

    /// Собирает все результаты. Unordered в порядке завершения
    pub async fn collect(self) -> Vec<TaskOutcome<T>> {
        match self {
            ResultSource::Ordered(stream) => stream.collect().await,
            ResultSource::Unordered(stream) => stream.collect().await,
            ResultSource::Futures(set) => set.into_outcomes().await,
        }
    }
}

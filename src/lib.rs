//! Пул воркеров фиксированного размера для batch независимых задач
//!
//! # Features
//! - Воркеры переиспользуются между batch, одна общая очередь
//! - Три стратегии: упорядоченный поток, поток по завершению, handle на задачу
//! - Partial binding callable со скалярными или tuple аргументами
//! - Ошибки и паники изолированы внутри задачи
//! - Прогресс, метрики и явный shutdown

pub mod binding;
pub mod collector;
pub mod errors;
pub mod handle;
pub mod model;
pub mod pool;
pub mod progress;
pub mod result;
pub mod task;

pub use binding::{Argument, BindingShape, Callable, Invocation, Partial, Signature};
pub use collector::{FutureSet, OrderedStream, ResultSource, UnorderedStream};
pub use errors::{ArityError, PoolError, TaskError};
pub use handle::TaskHandle;
pub use model::{PoolMetrics, Strategy};
pub use pool::{Config, Pool, Submission, WorkerPool};
pub use progress::{LogProgress, Progress};
pub use result::{TaskOutcome, TaskResult};
pub use task::{from_fn, try_from_fn, Batch, Task, TaskFactory, TaskId};

use super::task::panic_message;
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tracing::{info, warn};

/// Получает `(completed, total)` после каждой завершенной задачи.
/// Вызывается из воркера, поэтому должен быть дешевым.
pub trait Progress: Send + Sync {
    fn update(&self, completed: usize, total: usize);
}

impl<F> Progress for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    #[inline]
    fn update(&self, completed: usize, total: usize) {
        self(completed, total)
    }
}

/// Прогресс в лог каждые `step` задач и на последней
#[derive(Debug, Clone)]
pub struct LogProgress {
    label: String,
    step: usize,
}

impl LogProgress {
    pub fn new<S: Into<String>>(label: S) -> Self {
        Self {
            label: label.into(),
            step: 10,
        }
    }

    pub fn every(mut self, step: usize) -> Self {
        self.step = step.max(1);
        self
    }
}

impl Progress for LogProgress {
    fn update(&self, completed: usize, total: usize) {
        if completed % self.step == 0 || completed == total {
            let percent = if total == 0 { 100.0 } else { completed as f64 * 100.0 / total as f64 };
            info!(label = %self.label, completed, total, "{:.0}%", percent);
        }
    }
}

/// Счетчик завершений одного submission
pub(crate) struct ProgressTracker {
    sink: Option<Arc<dyn Progress>>,
    completed: AtomicUsize,
    total: usize,
}

impl ProgressTracker {
    pub(crate) fn new(sink: Option<Arc<dyn Progress>>, total: usize) -> Self {
        Self {
            sink,
            completed: AtomicUsize::new(0),
            total,
        }
    }

    pub(crate) fn record(&self) {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(sink) = &self.sink {
            // Паника в callback не должна терять результат задачи
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| sink.update(completed, self.total))) {
                let message = panic_message(payload.as_ref());
                warn!(completed, total = self.total, %message, "progress callback panicked");
            }
        }
    }
}

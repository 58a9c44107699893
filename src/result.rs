use super::{errors::TaskError, task::TaskId};

pub type TaskResult<T> = Result<T, TaskError>;

/// Результат с позицией задачи в batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome<T> {
    pub task_id: TaskId,
    pub value: TaskResult<T>,
}

impl<T> TaskOutcome<T> {
    pub fn new(task_id: TaskId, value: TaskResult<T>) -> Self {
        Self { task_id, value }
    }

    /// Задача потеряна до отправки результата
    pub(crate) fn lost(task_id: TaskId) -> Self {
        Self::new(task_id, Err(TaskError::ChannelClosed))
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.value.is_ok()
    }

    pub fn into_value(self) -> TaskResult<T> {
        self.value
    }
}

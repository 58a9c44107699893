use super::{
    errors::TaskError,
    result::TaskResult,
    task::TaskId,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot::{self, error::TryRecvError};


/// Handle на результат одной задачи [`FutureSet`](crate::collector::FutureSet)
pub struct TaskHandle<T> {
    task_id: TaskId,
    receiver: oneshot::Receiver<TaskResult<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(task_id: TaskId, receiver: oneshot::Receiver<TaskResult<T>>) -> Self {
        Self {
            task_id,
            receiver,
        }
    }

    #[inline]
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    #[inline(always)]
    pub async fn get(self) -> TaskResult<T> {
        self.await
    }

    /// Блокирующее ожидание. Не вызывать внутри async контекста
    pub fn blocking_get(self) -> TaskResult<T> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(TaskError::ChannelClosed))
    }

    /// Результат, если задача уже завершилась
    pub fn try_get(&mut self) -> Option<TaskResult<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(TaskError::ChannelClosed)),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = TaskResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(res) => Poll::Ready(res.unwrap_or(Err(TaskError::ChannelClosed))),
            Poll::Pending => Poll::Pending,
        }
    }
}

use super::{
    errors::TaskError,
    result::{TaskOutcome, TaskResult},
};
use std::{
    any::Any,
    fmt::Display,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};
use tracing::warn;

/// Позиция задачи в batch
pub type TaskId = usize;

/// Превращает элемент batch в результат.
/// Одна фабрика на все задачи submission
pub trait TaskFactory<A>: Send + Sync + 'static {
    type Output: Send + 'static;

    fn invoke(&self, arg: A) -> TaskResult<Self::Output>;
}

#[derive(Clone)]
pub struct FromFn<F>(F);

#[derive(Clone)]
pub struct TryFromFn<F>(F);

/// Элемент batch передается в `f` единственным аргументом
pub fn from_fn<A, R, F>(f: F) -> FromFn<F>
where
    F: Fn(A) -> R + Send + Sync + 'static,
    R: Send + 'static,
{
    FromFn(f)
}

/// Как [`from_fn`], `Err` становится [`TaskError::Failed`]
pub fn try_from_fn<A, R, E, F>(f: F) -> TryFromFn<F>
where
    F: Fn(A) -> Result<R, E> + Send + Sync + 'static,
    R: Send + 'static,
    E: Display,
{
    TryFromFn(f)
}

impl<A, R, F> TaskFactory<A> for FromFn<F>
where
    F: Fn(A) -> R + Send + Sync + 'static,
    R: Send + 'static,
{
    type Output = R;

    #[inline]
    fn invoke(&self, arg: A) -> TaskResult<R> {
        Ok((self.0)(arg))
    }
}

impl<A, R, E, F> TaskFactory<A> for TryFromFn<F>
where
    F: Fn(A) -> Result<R, E> + Send + Sync + 'static,
    R: Send + 'static,
    E: Display,
{
    type Output = R;

    #[inline]
    fn invoke(&self, arg: A) -> TaskResult<R> {
        (self.0)(arg).map_err(|e| TaskError::Failed(e.to_string()))
    }
}

pub struct Task<A, F> {
    id: TaskId,
    arg: A,
    factory: Arc<F>,
}

impl<A, F> Task<A, F>
where
    F: TaskFactory<A>,
{
    pub fn new(id: TaskId, arg: A, factory: Arc<F>) -> Self {
        Self { id, arg, factory }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Паники ловятся и становятся [`TaskError::Panic`]
    pub fn invoke(self) -> TaskOutcome<F::Output> {
        let Task { id, arg, factory } = self;
        let value = catch_unwind(AssertUnwindSafe(move || factory.invoke(arg))).unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            warn!(task_id = id, %message, "task panicked");
            Err(TaskError::Panic(message))
        });
        TaskOutcome::new(id, value)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Упорядоченный набор аргументов
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<A> {
    items: Vec<A>,
}

impl<A> Batch<A> {
    pub fn new(items: Vec<A>) -> Self {
        Self { items }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, A> {
        self.items.iter()
    }

    pub fn into_items(self) -> Vec<A> {
        self.items
    }
}

impl<A> From<Vec<A>> for Batch<A> {
    fn from(items: Vec<A>) -> Self {
        Self::new(items)
    }
}

impl<A> FromIterator<A> for Batch<A> {
    fn from_iter<I: IntoIterator<Item = A>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<A> IntoIterator for Batch<A> {
    type Item = A;
    type IntoIter = std::vec::IntoIter<A>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panics_become_task_errors() {
        let factory = Arc::new(from_fn(|x: u32| {
            if x == 3 {
                panic!("boom at {}", x);
            }
            x
        }));

        let task = Task::new(0, 1, factory.clone());
        assert_eq!(task.id(), 0);
        let ok = task.invoke();
        assert_eq!(ok, TaskOutcome::new(0, Ok(1)));

        let failed = Task::new(1, 3, factory).invoke();
        assert_eq!(failed.task_id, 1);
        assert_eq!(failed.value, Err(TaskError::Panic("boom at 3".into())));
    }

    #[test]
    fn try_from_fn_maps_errors() {
        let factory = try_from_fn(|x: i32| if x < 0 { Err("negative") } else { Ok(x) });
        assert_eq!(factory.invoke(4), Ok(4));
        assert_eq!(factory.invoke(-1), Err(TaskError::failed("negative")));
    }
}

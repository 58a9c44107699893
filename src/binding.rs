//! Динамическое связывание аргументов для callable, общего на весь batch.
//!
//! [`Partial`] фиксирует часть аргументов один раз, каждая задача добавляет
//! свой [`Argument`]: одно значение или tuple, распакованный позиционно.
//! Связывание происходит при запуске задачи, ошибка падает только этой
//! задаче как [`ArityError`].

use super::{
    errors::{ArityError, TaskError},
    result::TaskResult,
    task::{Batch, TaskFactory},
};
use std::{collections::BTreeMap, fmt::Display, sync::Arc};

/// Аргумент одной задачи
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument<V> {
    Scalar(V),
    Tuple(Vec<V>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingShape {
    Scalar,
    Tuple,
}

impl<V> Argument<V> {
    #[inline]
    pub fn shape(&self) -> BindingShape {
        match self {
            Argument::Scalar(_) => BindingShape::Scalar,
            Argument::Tuple(_) => BindingShape::Tuple,
        }
    }

    fn into_values(self) -> Vec<V> {
        match self {
            Argument::Scalar(v) => vec![v],
            Argument::Tuple(vs) => vs,
        }
    }
}

impl<V> Batch<Argument<V>> {
    /// Каждая задача получает одно позиционное значение
    pub fn scalars<I: IntoIterator<Item = V>>(values: I) -> Self {
        values.into_iter().map(Argument::Scalar).collect()
    }

    /// Tuple каждой задачи распаковывается в позиционные аргументы
    pub fn tuples<I, T>(tuples: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoIterator<Item = V>,
    {
        tuples
            .into_iter()
            .map(|t| Argument::Tuple(t.into_iter().collect()))
            .collect()
    }

    /// Общая форма всех элементов, `None` для пустого или смешанного batch.
    /// Элементы смешанного batch связываются по одному, каждый по своей форме.
    pub fn shape(&self) -> Option<BindingShape> {
        let mut shapes = self.iter().map(Argument::shape);
        let first = shapes.next()?;
        shapes.all(|s| s == first).then_some(first)
    }
}

/// Список параметров callable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<String>,
    var_positional: bool,
    var_keywords: bool,
}

impl Signature {
    pub fn new<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            var_positional: false,
            var_keywords: false,
        }
    }

    /// Принимать лишние позиционные значения (`*args`)
    pub fn with_var_positional(mut self) -> Self {
        self.var_positional = true;
        self
    }

    /// Принимать лишние keyword значения (`**kwargs`)
    pub fn with_var_keywords(mut self) -> Self {
        self.var_keywords = true;
        self
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p == name)
    }

    fn bind<V: Clone>(
        self: &Arc<Self>,
        bound_positional: &[V],
        bound_keywords: &BTreeMap<String, V>,
        arg: Argument<V>,
    ) -> Result<Invocation<V>, ArityError> {
        let dynamic = arg.into_values();
        let given = bound_positional.len() + dynamic.len();
        if given > self.params.len() && !self.var_positional {
            return Err(ArityError::TooManyPositional {
                expected: self.params.len(),
                got: given,
            });
        }

        let mut slots: Vec<Option<V>> = Vec::with_capacity(self.params.len());
        slots.resize_with(self.params.len(), || None);
        let mut rest = Vec::new();
        let positional = bound_positional.iter().cloned().chain(dynamic);
        for (i, value) in positional.enumerate() {
            match slots.get_mut(i) {
                Some(slot) => *slot = Some(value),
                None => rest.push(value),
            }
        }

        let mut keywords = BTreeMap::new();
        for (name, value) in bound_keywords {
            match self.position(name) {
                Some(i) if slots[i].is_some() => return Err(ArityError::Duplicate(name.clone())),
                Some(i) => slots[i] = Some(value.clone()),
                None if self.var_keywords => {
                    keywords.insert(name.clone(), value.clone());
                }
                None => return Err(ArityError::UnexpectedKeyword(name.clone())),
            }
        }

        let mut args = Vec::with_capacity(slots.len());
        for (slot, name) in slots.into_iter().zip(&self.params) {
            args.push(slot.ok_or_else(|| ArityError::Missing(name.clone()))?);
        }

        Ok(Invocation {
            signature: Arc::clone(self),
            args,
            rest,
            keywords,
        })
    }
}

/// Связанные аргументы для тела callable.
///
/// `args` содержит ровно одно значение на каждый именованный параметр.
#[derive(Debug, Clone)]
pub struct Invocation<V> {
    signature: Arc<Signature>,
    args: Vec<V>,
    rest: Vec<V>,
    keywords: BTreeMap<String, V>,
}

impl<V> Invocation<V> {
    pub fn arg(&self, index: usize) -> &V {
        &self.args[index]
    }

    pub fn param(&self, name: &str) -> Option<&V> {
        self.signature.position(name).map(|i| &self.args[i])
    }

    pub fn args(&self) -> &[V] {
        &self.args
    }

    pub fn rest(&self) -> &[V] {
        &self.rest
    }

    pub fn keywords(&self) -> &BTreeMap<String, V> {
        &self.keywords
    }

    pub fn into_args(self) -> Vec<V> {
        self.args
    }
}

type Body<V, R> = dyn Fn(Invocation<V>) -> TaskResult<R> + Send + Sync;

/// Функция с объявленной [`Signature`]
pub struct Callable<V, R> {
    signature: Arc<Signature>,
    body: Box<Body<V, R>>,
}

impl<V, R> Callable<V, R>
where
    V: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    pub fn new<F>(signature: Signature, body: F) -> Self
    where
        F: Fn(Invocation<V>) -> R + Send + Sync + 'static,
    {
        Self {
            signature: Arc::new(signature),
            body: Box::new(move |inv| Ok(body(inv))),
        }
    }

    /// Ошибки тела становятся [`TaskError::Failed`]
    pub fn try_new<F, E>(signature: Signature, body: F) -> Self
    where
        F: Fn(Invocation<V>) -> Result<R, E> + Send + Sync + 'static,
        E: Display,
    {
        Self {
            signature: Arc::new(signature),
            body: Box::new(move |inv| body(inv).map_err(|e| TaskError::Failed(e.to_string()))),
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn partial(self) -> Partial<V, R> {
        Partial::new(self)
    }

    pub fn call(&self, arg: Argument<V>) -> TaskResult<R> {
        self.call_bound(&[], &BTreeMap::new(), arg)
    }

    fn call_bound(
        &self,
        positional: &[V],
        keywords: &BTreeMap<String, V>,
        arg: Argument<V>,
    ) -> TaskResult<R> {
        let invocation = self.signature.bind(positional, keywords, arg)?;
        (self.body)(invocation)
    }
}

/// Callable с частью аргументов, зафиксированных на весь batch.
///
/// Фиксированные позиционные идут перед аргументами задачи.
pub struct Partial<V, R> {
    callable: Arc<Callable<V, R>>,
    positional: Vec<V>,
    keywords: BTreeMap<String, V>,
}

impl<V, R> Partial<V, R>
where
    V: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    pub fn new(callable: Callable<V, R>) -> Self {
        Self {
            callable: Arc::new(callable),
            positional: Vec::new(),
            keywords: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, value: V) -> Self {
        self.positional.push(value);
        self
    }

    pub fn kwarg<S: Into<String>>(mut self, name: S, value: V) -> Self {
        self.keywords.insert(name.into(), value);
        self
    }

    pub fn call(&self, arg: Argument<V>) -> TaskResult<R> {
        self.callable.call_bound(&self.positional, &self.keywords, arg)
    }
}

impl<V: Clone, R> Clone for Partial<V, R> {
    fn clone(&self) -> Self {
        Self {
            callable: Arc::clone(&self.callable),
            positional: self.positional.clone(),
            keywords: self.keywords.clone(),
        }
    }
}

impl<V, R> TaskFactory<Argument<V>> for Callable<V, R>
where
    V: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn invoke(&self, arg: Argument<V>) -> TaskResult<R> {
        self.call(arg)
    }
}

impl<V, R> TaskFactory<Argument<V>> for Partial<V, R>
where
    V: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn invoke(&self, arg: Argument<V>) -> TaskResult<R> {
        self.call(arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Callable<i64, (i64, i64)> {
        Callable::new(Signature::new(["n", "m"]), |inv| (*inv.arg(0), *inv.arg(1)))
    }

    #[test]
    fn scalar_and_tuple_shapes() {
        assert_eq!(Batch::scalars([1, 2]).shape(), Some(BindingShape::Scalar));
        assert_eq!(Batch::tuples([[1, 2], [3, 4]]).shape(), Some(BindingShape::Tuple));
        assert_eq!(Batch::<Argument<i32>>::scalars([]).shape(), None);

        let mixed: Batch<Argument<i32>> =
            vec![Argument::Scalar(1), Argument::Tuple(vec![1, 2])].into();
        assert_eq!(mixed.shape(), None);
    }

    #[test]
    fn tuple_is_unpacked_positionally() {
        assert_eq!(pair().call(Argument::Tuple(vec![1, 2])), Ok((1, 2)));
    }

    #[test]
    fn keyword_binding_fills_by_name() {
        let partial = pair().partial().kwarg("m", 10);
        assert_eq!(partial.call(Argument::Scalar(3)), Ok((3, 10)));
    }

    #[test]
    fn fixed_positional_comes_first() {
        let partial = pair().partial().arg(7);
        assert_eq!(partial.call(Argument::Scalar(8)), Ok((7, 8)));
    }

    #[test]
    fn arity_mismatches_are_reported() {
        let f = pair();
        assert_eq!(
            f.call(Argument::Scalar(1)),
            Err(ArityError::Missing("m".into()).into())
        );
        assert_eq!(
            f.call(Argument::Tuple(vec![1, 2, 3])),
            Err(ArityError::TooManyPositional { expected: 2, got: 3 }.into())
        );

        let dup = pair().partial().kwarg("n", 0);
        assert_eq!(
            dup.call(Argument::Scalar(1)),
            Err(ArityError::Duplicate("n".into()).into())
        );

        let unknown = pair().partial().kwarg("x", 0);
        assert_eq!(
            unknown.call(Argument::Tuple(vec![1, 2])),
            Err(ArityError::UnexpectedKeyword("x".into()).into())
        );
    }

    #[test]
    fn variadic_signature_collects_extras() {
        let f: Callable<i64, (i64, i64, usize, usize)> = Callable::new(
            Signature::new(["n", "m"]).with_var_positional().with_var_keywords(),
            |inv| (*inv.arg(0), *inv.arg(1), inv.rest().len(), inv.keywords().len()),
        );
        let partial = f.partial().kwarg("x", 1).kwarg("y", 2).kwarg("z", 3);

        assert_eq!(partial.call(Argument::Tuple(vec![4, 5])), Ok((4, 5, 0, 3)));
        assert_eq!(partial.call(Argument::Tuple(vec![4, 5, 6])), Ok((4, 5, 1, 3)));
    }

    #[test]
    fn param_lookup_by_name() {
        let f: Callable<i64, Option<i64>> =
            Callable::new(Signature::new(["a", "b"]), |inv| inv.param("b").copied());
        assert_eq!(f.call(Argument::Tuple(vec![1, 2])), Ok(Some(2)));
        assert_eq!(f.signature().arity(), 2);
        assert_eq!(f.signature().params(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn invocation_exposes_bound_values() {
        let sum: Callable<i64, i64> =
            Callable::new(Signature::new(["a", "b", "c"]), |inv| inv.args().iter().sum());
        assert_eq!(sum.partial().arg(1).call(Argument::Tuple(vec![2, 3])), Ok(6));

        let collect: Callable<i64, Vec<i64>> = Callable::new(
            Signature::new(["a"]).with_var_positional(),
            |inv| inv.into_args(),
        );
        assert_eq!(collect.call(Argument::Tuple(vec![7, 8, 9])), Ok(vec![7]));
    }

    #[test]
    fn try_new_reports_failures() {
        let f: Callable<i64, i64> = Callable::try_new(Signature::new(["n"]), |inv| {
            let n = *inv.arg(0);
            if n < 0 {
                Err(format!("negative input {}", n))
            } else {
                Ok(n)
            }
        });
        assert_eq!(f.call(Argument::Scalar(-2)), Err(TaskError::failed("negative input -2")));
    }
}

use thiserror::Error;

/// Ошибки самого пула, не задач
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PoolError {
    #[error("config error: {0}")]
    Config(String),

    #[error("worker pool is shut down")]
    ShutDown,
}

/// Несоответствие сигнатуры и аргументов одной задачи
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ArityError {
    #[error("takes {expected} positional arguments but {got} were given")]
    TooManyPositional { expected: usize, got: usize },

    #[error("missing required argument `{0}`")]
    Missing(String),

    #[error("got multiple values for argument `{0}`")]
    Duplicate(String),

    #[error("got an unexpected keyword argument `{0}`")]
    UnexpectedKeyword(String),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TaskError {
    #[error("arity error: {0}")]
    Arity(#[from] ArityError),

    #[error("task failed: {0}")]
    Failed(String),

    #[error("task panicked: {0}")]
    Panic(String),

    #[error("result channel closed before the task reported")]
    ChannelClosed,
}

impl TaskError {
    pub fn failed<S: Into<String>>(msg: S) -> Self {
        TaskError::Failed(msg.into())
    }

    pub fn is_arity(&self) -> bool {
        matches!(self, TaskError::Arity(_))
    }
}

use extract::ExtractError;
use thiserror::Error;

use crate::task::{TaskId, TaskKind, TaskStatus};

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A handler was given a task of a kind it does not process.
    #[error("{actual} task sent to the {expected} handler")]
    UnsupportedTaskType { expected: TaskKind, actual: TaskKind },

    #[error("no handler registered for {0} tasks")]
    NoHandler(TaskKind),

    #[error(transparent)]
    Backend(#[from] ExtractError),

    #[error("could not read input: {0}")]
    Input(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("task handler panicked")]
    HandlerPanicked,

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {id} is already {status}")]
    TaskFinished { id: TaskId, status: TaskStatus },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

use std::panic::{self, AssertUnwindSafe};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Failure raised by a single task invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskError {
    pub message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A pure function that can run in this process or in a worker process.
///
/// `NAME` is how a worker's [TaskRegistry](super::worker::TaskRegistry) finds
/// the same function; inputs and outputs cross the process boundary as JSON.
pub trait Task: Sync {
    type Input: Serialize + DeserializeOwned + Sync;
    type Output: Serialize + DeserializeOwned + Send;

    const NAME: &'static str;

    fn run(&self, input: &Self::Input) -> Result<Self::Output, TaskError>;
}

/// Run `task` once; a panic inside it becomes a [TaskError] like any other failure.
pub fn run_guarded<T: Task>(task: &T, input: &T::Input) -> Result<T::Output, TaskError> {
    panic::catch_unwind(AssertUnwindSafe(|| task.run(input))).unwrap_or_else(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(TaskError::new(format!("task '{}' panicked: {detail}", T::NAME)))
    })
}

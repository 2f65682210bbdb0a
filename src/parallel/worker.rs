//! Worker side of the distributed pool: a JSON-lines request/reply loop.
//!
//! The parent writes one [WorkerRequest] per line to the worker's stdin and
//! closes it; the worker answers each with one [WorkerReply] line on stdout.
//! A worker stops at its first failed task.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::task::{run_guarded, Task, TaskError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub task: String,
    pub index: usize,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerReply {
    Done { index: usize, output: Value },
    Failed { index: usize, message: String },
}

/// Serialize one request line (without the trailing newline).
pub fn encode_request<I: Serialize>(
    task: &str,
    index: usize,
    input: &I,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&WorkerRequest {
        task: task.to_string(),
        index,
        input: serde_json::to_value(input)?,
    })
}

type Handler = Box<dyn Fn(Value) -> Result<Value, TaskError> + Send + Sync>;

/// Tasks a worker process knows how to run, keyed by [Task::NAME].
#[derive(Default)]
pub struct TaskRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, task: T) -> &mut Self
    where
        T: Task + Send + 'static,
    {
        self.handlers.insert(
            T::NAME,
            Box::new(move |input| {
                let input: T::Input = serde_json::from_value(input)
                    .map_err(|err| TaskError::new(format!("invalid input for '{}': {err}", T::NAME)))?;
                let output = run_guarded(&task, &input)?;
                serde_json::to_value(output)
                    .map_err(|err| TaskError::new(format!("unencodable output from '{}': {err}", T::NAME)))
            }),
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn dispatch(&self, request: WorkerRequest) -> WorkerReply {
        let index = request.index;
        let Some(handler) = self.handlers.get(request.task.as_str()) else {
            return WorkerReply::Failed {
                index,
                message: format!("unknown task '{}'", request.task),
            };
        };
        match handler(request.input) {
            Ok(output) => WorkerReply::Done { index, output },
            Err(err) => WorkerReply::Failed {
                index,
                message: err.message,
            },
        }
    }
}

/// Answer requests from `input` until EOF or the first failed task.
/// Returns the number of replies written.
pub fn serve<R: BufRead, W: Write>(
    registry: &TaskRegistry,
    input: R,
    mut output: W,
) -> io::Result<usize> {
    let mut answered = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: WorkerRequest = serde_json::from_str(&line)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        debug!(task = %request.task, index = request.index, "running task");

        let reply = registry.dispatch(request);
        let failed = matches!(reply, WorkerReply::Failed { .. });
        serde_json::to_writer(&mut output, &reply)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        output.write_all(b"\n")?;
        output.flush()?;
        answered += 1;

        if failed {
            warn!("task failed; worker stopping");
            break;
        }
    }
    Ok(answered)
}

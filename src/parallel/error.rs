use thiserror::Error;

/// Why a distributed batch did not produce a full result sequence.
#[derive(Debug, Error)]
pub enum DistributeError {
    #[error("no tasks to distribute")]
    NoTasks,
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,
    #[error("distributed environment not available: ${var} is not set")]
    MissingCoordinator { var: String },
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("failed to spawn worker '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("worker {worker} I/O failed: {source}")]
    WorkerIo {
        worker: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("worker {worker} exited with {status}")]
    WorkerExited { worker: usize, status: String },
    #[error("worker {worker} thread panicked")]
    WorkerPanicked { worker: usize },
    #[error("worker protocol error: {0}")]
    Protocol(String),
    #[error("failed to encode or decode task payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("no result delivered for task {index}")]
    MissingResult { index: usize },
    #[error("task {index} failed: {message}")]
    TaskFailed { index: usize, message: String },
}

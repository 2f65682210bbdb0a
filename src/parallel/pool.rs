//! Worker pools for embarrassingly-parallel task batches.
//!
//! [LocalPool] runs tasks on a rayon thread pool sized for the batch.
//! [DistributedPool] runs them in child worker processes that speak the
//! JSON-lines protocol in [super::worker]. Both are created per batch and torn
//! down before the call returns.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::str::FromStr;
use std::thread;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde_json::Value;
use tracing::{debug, info};

use super::batch::{batch_ranges, effective_workers};
use super::error::DistributeError;
use super::task::{run_guarded, Task};
use super::worker::{encode_request, WorkerReply};

/// Coordination marker that a multi-host launcher (mpiexec and friends) exports.
pub const DEFAULT_COORDINATOR_VAR: &str = "PMI_SIZE";
/// Set on every distributed worker to its position in the pool.
pub const WORKER_RANK_VAR: &str = "SCALEBENCH_WORKER_RANK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Local,
    Distributed,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "local" => Ok(Self::Local),
            "distributed" => Ok(Self::Distributed),
            other => Err(format!("unknown execution mode '{other}'")),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Distributed => "distributed",
        })
    }
}

/// Map a task over inputs and return one result per input, in input order.
pub trait ParallelMap {
    /// Requested worker count; the effective count is clamped per batch.
    fn workers(&self) -> usize;

    fn map<T: Task>(&self, task: &T, inputs: &[T::Input]) -> Result<Vec<T::Output>, DistributeError>;
}

/// Same-machine pool with a fixed number of worker threads.
#[derive(Debug, Clone, Copy)]
pub struct LocalPool {
    pub workers: usize,
}

impl LocalPool {
    pub fn with_workers(n: usize) -> Self {
        Self { workers: n }
    }

    /// Run a closure on a temporary pool with exactly [workers](LocalPool::workers) threads.
    pub fn install<F, R>(&self, f: F) -> Result<R, DistributeError>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        if self.workers == 0 {
            return Err(DistributeError::InvalidWorkerCount);
        }
        let pool = ThreadPoolBuilder::new().num_threads(self.workers).build()?;
        Ok(pool.install(f))
    }
}

impl ParallelMap for LocalPool {
    fn workers(&self) -> usize {
        self.workers
    }

    fn map<T: Task>(&self, task: &T, inputs: &[T::Input]) -> Result<Vec<T::Output>, DistributeError> {
        let workers = effective_workers(self.workers, inputs.len())?;
        debug!(task = T::NAME, tasks = inputs.len(), workers, "local batch");
        LocalPool::with_workers(workers).install(|| {
            inputs
                .par_iter()
                .enumerate()
                .map(|(index, input)| {
                    run_guarded(task, input).map_err(|err| DistributeError::TaskFailed {
                        index,
                        message: err.message,
                    })
                })
                .collect::<Result<Vec<_>, DistributeError>>()
        })?
    }
}

/// How distributed workers are located and launched.
#[derive(Debug, Clone)]
pub struct DistributedConfig {
    /// Variable whose presence marks a multi-host coordination environment.
    pub marker: String,
    /// Worker executable; it must serve the worker loop on stdin/stdout.
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment handed to every worker at spawn time.
    pub envs: BTreeMap<String, String>,
}

impl DistributedConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            marker: DEFAULT_COORDINATOR_VAR.to_string(),
            program: program.into(),
            args: vec!["worker".to_string()],
            envs: BTreeMap::new(),
        }
    }

    /// Workers re-launch the running executable with the `worker` subcommand.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }
}

/// Pool of worker processes, possibly spread across hosts by the launcher.
#[derive(Debug, Clone)]
pub struct DistributedPool {
    workers: usize,
    config: DistributedConfig,
}

impl DistributedPool {
    /// Fails with [DistributeError::MissingCoordinator] unless the marker
    /// variable is present. Nothing is spawned until [ParallelMap::map].
    pub fn connect(workers: usize, config: &DistributedConfig) -> Result<Self, DistributeError> {
        if std::env::var_os(&config.marker).is_none() {
            return Err(DistributeError::MissingCoordinator {
                var: config.marker.clone(),
            });
        }
        Ok(Self {
            workers,
            config: config.clone(),
        })
    }

    fn spawn_worker(&self, worker: usize) -> Result<Child, DistributeError> {
        Command::new(&self.config.program)
            .args(&self.config.args)
            .envs(&self.config.envs)
            .env(WORKER_RANK_VAR, worker.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| DistributeError::Spawn {
                program: self.config.program.display().to_string(),
                source,
            })
    }

    /// Drive one worker process through its batch of encoded requests.
    fn run_worker(&self, worker: usize, requests: &[String]) -> Result<Vec<WorkerReply>, DistributeError> {
        let mut child = self.spawn_worker(worker)?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DistributeError::Protocol(format!(
                "worker {worker} started without piped stdio"
            )));
        };

        let exchanged = thread::scope(|scope| {
            let writer = scope.spawn(move || write_requests(stdin, requests));
            let replies = read_replies(worker, stdout);
            let written = writer
                .join()
                .map_err(|_| DistributeError::WorkerPanicked { worker })?;
            // A worker that stops at a failed task closes its stdin early.
            if let Err(source) = written {
                if source.kind() != io::ErrorKind::BrokenPipe {
                    return Err(DistributeError::WorkerIo { worker, source });
                }
            }
            replies
        });

        let replies = match exchanged {
            Ok(replies) => replies,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
        };

        let status = child
            .wait()
            .map_err(|source| DistributeError::WorkerIo { worker, source })?;
        if !status.success() {
            return Err(DistributeError::WorkerExited {
                worker,
                status: status.to_string(),
            });
        }
        Ok(replies)
    }
}

fn write_requests(stdin: ChildStdin, requests: &[String]) -> io::Result<()> {
    let mut stdin = BufWriter::new(stdin);
    for line in requests {
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
    }
    stdin.flush()
}

/// Reads until EOF even after a bad line so the worker never blocks on a full pipe.
fn read_replies(worker: usize, stdout: ChildStdout) -> Result<Vec<WorkerReply>, DistributeError> {
    let mut replies = Vec::new();
    let mut undecodable = None;
    for line in BufReader::new(stdout).lines() {
        let line = line.map_err(|source| DistributeError::WorkerIo { worker, source })?;
        if line.trim().is_empty() || undecodable.is_some() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(reply) => replies.push(reply),
            Err(err) => {
                undecodable = Some(DistributeError::Protocol(format!(
                    "worker {worker} sent an undecodable reply: {err}"
                )))
            }
        }
    }
    match undecodable {
        Some(err) => Err(err),
        None => Ok(replies),
    }
}

impl ParallelMap for DistributedPool {
    fn workers(&self) -> usize {
        self.workers
    }

    fn map<T: Task>(&self, _task: &T, inputs: &[T::Input]) -> Result<Vec<T::Output>, DistributeError> {
        let workers = effective_workers(self.workers, inputs.len())?;
        let requests = inputs
            .iter()
            .enumerate()
            .map(|(index, input)| encode_request(T::NAME, index, input))
            .collect::<Result<Vec<_>, _>>()?;
        let ranges = batch_ranges(inputs.len(), workers);
        debug!(task = T::NAME, tasks = inputs.len(), workers, "distributed batch");

        let outcomes: Vec<Result<Vec<WorkerReply>, DistributeError>> = thread::scope(|scope| {
            let handles: Vec<_> = ranges
                .iter()
                .enumerate()
                .map(|(worker, &(start, end))| {
                    let batch = &requests[start..end];
                    (worker, scope.spawn(move || self.run_worker(worker, batch)))
                })
                .collect();
            handles
                .into_iter()
                .map(|(worker, handle)| {
                    handle
                        .join()
                        .unwrap_or(Err(DistributeError::WorkerPanicked { worker }))
                })
                .collect()
        });

        let mut slots: Vec<Option<Value>> = vec![None; inputs.len()];
        let mut first_failure: Option<(usize, String)> = None;
        let mut first_worker_error = None;
        for outcome in outcomes {
            let replies = match outcome {
                Ok(replies) => replies,
                Err(err) => {
                    first_worker_error.get_or_insert(err);
                    continue;
                }
            };
            for reply in replies {
                match reply {
                    WorkerReply::Done { index, output } => {
                        let slot = slots.get_mut(index).ok_or_else(|| {
                            DistributeError::Protocol(format!("reply for unknown task index {index}"))
                        })?;
                        *slot = Some(output);
                    }
                    WorkerReply::Failed { index, message } => {
                        if first_failure.as_ref().map_or(true, |(seen, _)| index < *seen) {
                            first_failure = Some((index, message));
                        }
                    }
                }
            }
        }

        if let Some((index, message)) = first_failure {
            return Err(DistributeError::TaskFailed { index, message });
        }
        if let Some(err) = first_worker_error {
            return Err(err);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| -> Result<T::Output, DistributeError> {
                let value = slot.ok_or(DistributeError::MissingResult { index })?;
                Ok(serde_json::from_value(value)?)
            })
            .collect()
    }
}

/// The closed set of pool backends, selected by [ExecutionMode].
#[derive(Debug, Clone)]
pub enum Executor {
    Local(LocalPool),
    Distributed(DistributedPool),
}

impl Executor {
    pub fn new(
        mode: ExecutionMode,
        workers: usize,
        distributed: &DistributedConfig,
    ) -> Result<Self, DistributeError> {
        match mode {
            ExecutionMode::Local => Ok(Self::Local(LocalPool::with_workers(workers))),
            ExecutionMode::Distributed => {
                Ok(Self::Distributed(DistributedPool::connect(workers, distributed)?))
            }
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        match self {
            Self::Local(_) => ExecutionMode::Local,
            Self::Distributed(_) => ExecutionMode::Distributed,
        }
    }
}

impl ParallelMap for Executor {
    fn workers(&self) -> usize {
        match self {
            Self::Local(pool) => pool.workers(),
            Self::Distributed(pool) => pool.workers(),
        }
    }

    fn map<T: Task>(&self, task: &T, inputs: &[T::Input]) -> Result<Vec<T::Output>, DistributeError> {
        match self {
            Self::Local(pool) => pool.map(task, inputs),
            Self::Distributed(pool) => pool.map(task, inputs),
        }
    }
}

/// Run `task` once per input on `workers` workers and return results in input order.
///
/// Effective worker count is `min(workers, inputs.len())`. Any failed task fails
/// the batch. Distributed mode checks for the coordination marker before
/// spawning anything.
pub fn distribute_tasks<T: Task>(
    task: &T,
    inputs: &[T::Input],
    workers: usize,
    mode: ExecutionMode,
    distributed: &DistributedConfig,
) -> Result<Vec<T::Output>, DistributeError> {
    let effective = effective_workers(workers, inputs.len())?;
    let executor = Executor::new(mode, effective, distributed)?;
    info!(
        task = T::NAME,
        %mode,
        tasks = inputs.len(),
        workers = effective,
        "distributing tasks"
    );
    executor.map(task, inputs)
}

//! Tasks every `scalebench worker` process can run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::parallel::{Task, TaskError, TaskRegistry, WORKER_RANK_VAR};
use crate::solver::{full_solution, load_inputs, time_full_solution, Solution, SolverError, SolverInputs};

impl From<SolverError> for TaskError {
    fn from(err: SolverError) -> Self {
        TaskError::new(err.to_string())
    }
}

/// Benchmark replica: load sliced inputs once, then time `iterations` solver calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimedSolve;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedSolveInput {
    pub input_path: PathBuf,
    pub iterations: usize,
}

impl Task for TimedSolve {
    type Input = TimedSolveInput;
    /// Microseconds per call.
    type Output = Vec<u64>;
    const NAME: &'static str = "timed-solve";

    fn run(&self, input: &TimedSolveInput) -> Result<Vec<u64>, TaskError> {
        let inputs = load_inputs(&input.input_path)?;
        Ok(time_full_solution(&inputs, input.iterations)?)
    }
}

/// Solve one period.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolvePeriod;

impl Task for SolvePeriod {
    type Input = SolverInputs;
    type Output = Solution;
    const NAME: &'static str = "solve";

    fn run(&self, input: &SolverInputs) -> Result<Solution, TaskError> {
        Ok(full_solution(input)?)
    }
}

/// Diagnostic task: reports which process ran it. `fail` forces an error so
/// batch-failure handling can be checked on a real cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct Probe;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeInput {
    pub token: u64,
    #[serde(default)]
    pub fail: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub token: u64,
    pub pid: u32,
    /// Worker rank when run inside a distributed worker.
    pub rank: Option<usize>,
}

impl Task for Probe {
    type Input = ProbeInput;
    type Output = ProbeReport;
    const NAME: &'static str = "probe";

    fn run(&self, input: &ProbeInput) -> Result<ProbeReport, TaskError> {
        if input.fail {
            return Err(TaskError::new(format!("probe {} asked to fail", input.token)));
        }
        Ok(ProbeReport {
            token: input.token,
            pid: std::process::id(),
            rank: std::env::var(WORKER_RANK_VAR)
                .ok()
                .and_then(|rank| rank.parse().ok()),
        })
    }
}

pub fn builtin_registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry.register(TimedSolve).register(SolvePeriod).register(Probe);
    registry
}

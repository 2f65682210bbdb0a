//! Resource-count sweep: one separate process per resource count, run in order.
//!
//! [run_sweep] is the orchestrator. It slices the configured period out of the
//! input bundle, then launches `exec <axis> <r>` for every pending count and
//! waits for each before starting the next. [run_step] is what such a process
//! does: time the benchmark, write its column, record the step.

use std::path::PathBuf;
use std::process::Command;

use chrono::Utc;
use tracing::{info, warn};

use super::error::HarnessError;
use super::status::{StepRecord, SweepState, SweepStatus};
use super::thread_cap::{snapshot, ThreadCap};
use super::timing::TimingTable;
use crate::config::{Axis, HarnessConfig, CONFIG_PATH_VAR};
use crate::parallel::{distribute_tasks, DistributedConfig, ExecutionMode};
use crate::persist::RemoveOnDrop;
use crate::solver::{load_inputs, slice_period, time_full_solution};
use crate::tasks::{TimedSolve, TimedSolveInput};

/// How the orchestrator re-invokes itself for a single sweep step.
#[derive(Debug, Clone)]
pub struct StepLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl StepLauncher {
    /// `program <args..> exec <axis> <r>`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, Vec::new()))
    }

    fn command(&self, config: &HarnessConfig, axis: Axis, resource_count: usize) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(["exec", axis.as_str(), resource_count.to_string().as_str()]);
        if let Some(source) = &config.source {
            command.env(CONFIG_PATH_VAR, source);
        }
        if axis == Axis::Threads {
            ThreadCap::new(resource_count, &config.thread_env_vars).apply(&mut command);
        }
        command
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Every resource count was already recorded; nothing was rewritten.
    Skipped,
    Completed { steps_run: Vec<usize> },
}

pub fn run_sweep(
    config: &HarnessConfig,
    axis: Axis,
    launcher: &StepLauncher,
) -> Result<SweepOutcome, HarnessError> {
    refuse_unrecorded_table(config, axis)?;
    let max = config.axis(axis).max;
    let status = SweepStatus::load_or_new(&config.status_path(axis), axis, max)?;
    match status.state() {
        SweepState::Complete => {
            let table = config.timing_table_path(axis);
            info!(
                %axis,
                max,
                table = %table.display(),
                "data set already available; move, rename or delete it to create a new one"
            );
            return Ok(SweepOutcome::Skipped);
        }
        SweepState::Sweeping { next } => info!(%axis, max, next, "resuming sweep"),
        SweepState::NotStarted => info!(%axis, max, "starting sweep"),
    }

    let sliced = config.sliced_input_path();
    slice_period(&config.input_data, config.period, &sliced)?;
    let _cleanup = RemoveOnDrop(&sliced);

    let mut steps_run = Vec::new();
    for resource_count in status.pending() {
        info!(%axis, resource_count, "launching sweep step");
        let exit = launcher
            .command(config, axis, resource_count)
            .status()
            .map_err(|source| HarnessError::Launch {
                axis,
                resource_count,
                source,
            })?;
        if !exit.success() {
            return Err(HarnessError::StepFailed {
                axis,
                resource_count,
                status: exit.to_string(),
            });
        }
        steps_run.push(resource_count);
    }
    Ok(SweepOutcome::Completed { steps_run })
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub axis: Axis,
    pub resource_count: usize,
    pub samples: usize,
    pub table: PathBuf,
}

/// Measure one resource count and record it. Runs inside the step's own process.
pub fn run_step(
    config: &HarnessConfig,
    axis: Axis,
    resource_count: usize,
    distributed: &DistributedConfig,
) -> Result<StepReport, HarnessError> {
    let settings = config.axis(axis);
    if resource_count == 0 || resource_count > settings.max {
        return Err(HarnessError::ResourceOutOfRange {
            axis,
            resource_count,
            max: settings.max,
        });
    }

    refuse_unrecorded_table(config, axis)?;

    let thread_env = snapshot(&config.thread_env_vars);
    info!(%axis, resource_count, ?thread_env, "benchmark environment");

    let input_path = config.sliced_input_path();
    let samples = match axis {
        Axis::Threads => {
            let inputs = load_inputs(&input_path)?;
            time_full_solution(&inputs, settings.iterations)?
        }
        Axis::Processes => {
            let replicas = vec![
                TimedSolveInput {
                    input_path,
                    iterations: settings.iterations,
                };
                resource_count
            ];
            let per_worker = distribute_tasks(
                &TimedSolve,
                &replicas,
                resource_count,
                ExecutionMode::Distributed,
                distributed,
            )?;
            mean_across_replicas(&per_worker)
        }
    };

    let status_path = config.status_path(axis);
    let mut status = SweepStatus::load_or_new(&status_path, axis, settings.max)?;
    let table_path = config.timing_table_path(axis);
    let mut table = if status.steps.is_empty() {
        TimingTable::new()
    } else {
        TimingTable::load_or_empty(&table_path)?
    };
    let sample_count = samples.len();
    table.set_column(resource_count, samples);
    table.save(&table_path)?;

    status.mark_complete(
        resource_count,
        StepRecord {
            completed_at: Utc::now().to_rfc3339(),
            iterations: settings.iterations,
            thread_env,
        },
    );
    status.save(&status_path)?;
    info!(%axis, resource_count, samples = sample_count, "sweep step recorded");

    Ok(StepReport {
        axis,
        resource_count,
        samples: sample_count,
        table: table_path,
    })
}

/// A timing table on disk with no status record is never replaced.
fn refuse_unrecorded_table(config: &HarnessConfig, axis: Axis) -> Result<(), HarnessError> {
    let table = config.timing_table_path(axis);
    if table.exists() && !config.status_path(axis).exists() {
        return Err(HarnessError::UnrecordedTable {
            path: table.display().to_string(),
        });
    }
    Ok(())
}

/// Row `i` is the mean of every replica's `i`-th sample, rounded to the
/// nearest microsecond. Rows beyond the shortest replica are dropped.
pub fn mean_across_replicas(per_worker: &[Vec<u64>]) -> Vec<u64> {
    let rows = per_worker.iter().map(Vec::len).min().unwrap_or(0);
    if per_worker.iter().any(|samples| samples.len() != rows) {
        warn!(rows, "replicas returned different sample counts; truncating");
    }
    (0..rows)
        .map(|row| {
            let total: u64 = per_worker.iter().map(|samples| samples[row]).sum();
            let replicas = per_worker.len() as u64;
            (total + replicas / 2) / replicas
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::ffi::OsStr;
    use std::fs;

    use super::*;
    use crate::config::AxisConfig;
    use crate::solver::{generate_bundle, save_bundle, BundleShape};

    fn small_config(dir: &std::path::Path) -> HarnessConfig {
        let config = HarnessConfig {
            resources_dir: dir.join("resources"),
            input_data: dir.join("inputs.json"),
            threads: AxisConfig { max: 3, iterations: 2 },
            ..HarnessConfig::default()
        };
        let shape = BundleShape {
            periods: 1,
            states: 4,
            choices: 3,
            wage_choices: 1,
            draws: 5,
        };
        save_bundle(&config.input_data, &generate_bundle(shape, 9)).unwrap();
        config
    }

    fn step_record() -> StepRecord {
        StepRecord {
            completed_at: "2026-01-01T00:00:00+00:00".to_string(),
            iterations: 2,
            thread_env: BTreeMap::new(),
        }
    }

    #[test]
    fn replicas_are_averaged_row_by_row() {
        let per_worker = vec![vec![100, 10, 12], vec![200, 20, 13]];
        assert_eq!(mean_across_replicas(&per_worker), vec![150, 15, 13]);
    }

    #[test]
    fn replicas_truncate_to_shortest() {
        let per_worker = vec![vec![1, 2, 3], vec![5]];
        assert_eq!(mean_across_replicas(&per_worker), vec![3]);
        assert!(mean_across_replicas(&[]).is_empty());
    }

    #[test]
    fn thread_steps_are_launched_with_caps_and_config_path() {
        let config = HarnessConfig {
            source: Some(PathBuf::from("bench.yaml")),
            ..HarnessConfig::default()
        };
        let launcher = StepLauncher::new("scalebench", Vec::new());

        let command = launcher.command(&config, Axis::Threads, 4);
        let args: Vec<&OsStr> = command.get_args().collect();
        assert_eq!(args, vec!["exec", "threads", "4"]);

        let envs: BTreeMap<&OsStr, Option<&OsStr>> = command.get_envs().collect();
        assert_eq!(envs.get(OsStr::new("OMP_NUM_THREADS")), Some(&Some(OsStr::new("4"))));
        assert_eq!(envs.get(OsStr::new("RAYON_NUM_THREADS")), Some(&Some(OsStr::new("4"))));
        assert_eq!(
            envs.get(OsStr::new(CONFIG_PATH_VAR)),
            Some(&Some(OsStr::new("bench.yaml")))
        );
    }

    #[test]
    fn process_steps_do_not_cap_threads() {
        let launcher = StepLauncher::new("scalebench", vec!["--".to_string()]);
        let command = launcher.command(&HarnessConfig::default(), Axis::Processes, 2);
        assert!(command
            .get_envs()
            .all(|(key, _)| key != OsStr::new("OMP_NUM_THREADS")));
        let args: Vec<&OsStr> = command.get_args().collect();
        assert_eq!(args, vec!["--", "exec", "processes", "2"]);
    }

    #[test]
    fn out_of_range_resource_count_is_rejected() {
        let config = HarnessConfig::default();
        let distributed = DistributedConfig::new("scalebench");
        for count in [0, config.threads.max + 1] {
            let err = run_step(&config, Axis::Threads, count, &distributed).unwrap_err();
            assert!(matches!(err, HarnessError::ResourceOutOfRange { .. }));
        }
    }

    #[test]
    fn table_without_status_is_never_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        let table_path = config.timing_table_path(Axis::Threads);
        let mut table = TimingTable::new();
        table.set_column(1, vec![999, 999]);
        table.set_column(2, vec![999, 999]);
        table.save(&table_path).unwrap();
        let before = fs::read(&table_path).unwrap();

        let err = run_sweep(&config, Axis::Threads, &StepLauncher::new("true", Vec::new())).unwrap_err();
        assert!(matches!(err, HarnessError::UnrecordedTable { .. }));
        assert!(err.to_string().contains("move, rename or delete"));

        let err = run_step(&config, Axis::Threads, 1, &DistributedConfig::new("scalebench")).unwrap_err();
        assert!(matches!(err, HarnessError::UnrecordedTable { .. }));
        assert_eq!(fs::read(&table_path).unwrap(), before);
    }

    #[cfg(unix)]
    #[test]
    fn partial_sweep_launches_only_pending_counts() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        let mut status = SweepStatus::new(Axis::Threads, 3);
        status.mark_complete(1, step_record());
        status.save(&config.status_path(Axis::Threads)).unwrap();

        let outcome = run_sweep(&config, Axis::Threads, &StepLauncher::new("true", Vec::new())).unwrap();

        assert_eq!(outcome, SweepOutcome::Completed { steps_run: vec![2, 3] });
        assert!(!config.sliced_input_path().exists());
    }

    #[test]
    fn fresh_status_starts_a_fresh_table() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        SweepStatus::new(Axis::Threads, 3)
            .save(&config.status_path(Axis::Threads))
            .unwrap();
        let mut stale = TimingTable::new();
        for count in 1..=3 {
            stale.set_column(count, vec![1, 1, 1, 1]);
        }
        stale.save(&config.timing_table_path(Axis::Threads)).unwrap();
        slice_period(&config.input_data, 0, &config.sliced_input_path()).unwrap();

        let report = run_step(&config, Axis::Threads, 1, &DistributedConfig::new("scalebench")).unwrap();

        assert_eq!(report.samples, 2);
        let table = TimingTable::load(&config.timing_table_path(Axis::Threads)).unwrap();
        assert_eq!(table.resource_counts(), vec![1]);
        assert_eq!(table.column(1).map(<[u64]>::len), Some(2));
        let status = SweepStatus::load(&config.status_path(Axis::Threads)).unwrap().unwrap();
        assert!(status.is_step_complete(1));
    }
}

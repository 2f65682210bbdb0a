use std::collections::BTreeSet;

use scalebench::parallel::{distribute_tasks, DistributeError, DistributedConfig, ExecutionMode};
use scalebench::tasks::{Probe, ProbeInput};

fn worker_config() -> DistributedConfig {
    // PATH stands in for the coordinator marker: always present, never mutated here.
    DistributedConfig::new(env!("CARGO_BIN_EXE_scalebench")).with_marker("PATH")
}

fn probes(count: u64) -> Vec<ProbeInput> {
    (0..count)
        .map(|token| ProbeInput { token, fail: false })
        .collect()
}

#[test]
fn distributed_results_follow_input_order() {
    let reports = distribute_tasks(
        &Probe,
        &probes(7),
        3,
        ExecutionMode::Distributed,
        &worker_config(),
    )
    .expect("distributed probe batch should succeed");

    let tokens: Vec<u64> = reports.iter().map(|report| report.token).collect();
    assert_eq!(tokens, (0..7).collect::<Vec<_>>());

    // Contiguous batches: 7 tasks over 3 workers are split 3/2/2.
    let ranks: Vec<Option<usize>> = reports.iter().map(|report| report.rank).collect();
    assert_eq!(
        ranks,
        vec![Some(0), Some(0), Some(0), Some(1), Some(1), Some(2), Some(2)]
    );

    let pids: BTreeSet<u32> = reports.iter().map(|report| report.pid).collect();
    assert_eq!(pids.len(), 3);
    assert!(!pids.contains(&std::process::id()));
}

#[test]
fn distributed_workers_are_clamped_to_task_count() {
    let reports = distribute_tasks(
        &Probe,
        &probes(2),
        8,
        ExecutionMode::Distributed,
        &worker_config(),
    )
    .expect("distributed probe batch should succeed");

    let ranks: BTreeSet<Option<usize>> = reports.iter().map(|report| report.rank).collect();
    assert_eq!(ranks, BTreeSet::from([Some(0), Some(1)]));
}

#[test]
fn distributed_failure_reports_lowest_failing_index() {
    let mut inputs = probes(7);
    inputs[2].fail = true;
    inputs[5].fail = true;

    let err = distribute_tasks(
        &Probe,
        &inputs,
        3,
        ExecutionMode::Distributed,
        &worker_config(),
    )
    .expect_err("a failed probe should fail the batch");

    match err {
        DistributeError::TaskFailed { index, message } => {
            assert_eq!(index, 2);
            assert!(message.contains("probe 2"), "unexpected message: {message}");
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
}

#[test]
fn distributed_mode_requires_coordinator_marker() {
    let config = DistributedConfig::new(env!("CARGO_BIN_EXE_scalebench"))
        .with_marker("SCALEBENCH_TEST_MARKER_NEVER_SET");

    let err = distribute_tasks(&Probe, &probes(3), 2, ExecutionMode::Distributed, &config)
        .expect_err("missing marker should be rejected");
    assert!(matches!(
        err,
        DistributeError::MissingCoordinator { ref var } if var == "SCALEBENCH_TEST_MARKER_NEVER_SET"
    ));
}

#[test]
fn local_mode_runs_in_process() {
    let reports = distribute_tasks(
        &Probe,
        &probes(5),
        2,
        ExecutionMode::Local,
        &worker_config(),
    )
    .expect("local probe batch should succeed");

    assert_eq!(reports.len(), 5);
    assert!(reports.iter().all(|report| report.pid == std::process::id()));
    assert!(reports.iter().all(|report| report.rank.is_none()));
}

#[test]
fn empty_batches_and_zero_workers_are_rejected() {
    let config = worker_config();
    assert!(matches!(
        distribute_tasks(&Probe, &[], 2, ExecutionMode::Local, &config),
        Err(DistributeError::NoTasks)
    ));
    assert!(matches!(
        distribute_tasks(&Probe, &probes(2), 0, ExecutionMode::Distributed, &config),
        Err(DistributeError::InvalidWorkerCount)
    ));
}

#[cfg(unix)]
fn shell_worker(script: &str) -> DistributedConfig {
    let mut config = DistributedConfig::new("sh").with_marker("PATH");
    config.args = vec!["-c".to_string(), script.to_string()];
    config
}

#[cfg(unix)]
#[test]
fn worker_exiting_non_zero_fails_the_batch() {
    let err = distribute_tasks(&Probe, &probes(1), 1, ExecutionMode::Distributed, &shell_worker("exit 3"))
        .expect_err("a crashed worker should fail the batch");
    match err {
        DistributeError::WorkerExited { worker, status } => {
            assert_eq!(worker, 0);
            assert!(status.contains('3'), "unexpected status: {status}");
        }
        other => panic!("expected WorkerExited, got {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn undecodable_reply_fails_the_batch() {
    let err = distribute_tasks(
        &Probe,
        &probes(1),
        1,
        ExecutionMode::Distributed,
        &shell_worker("cat > /dev/null; echo garbage"),
    )
    .expect_err("garbage on stdout should fail the batch");
    assert!(
        matches!(err, DistributeError::Protocol(ref message) if message.contains("undecodable")),
        "unexpected error: {err:?}"
    );
}

#[cfg(unix)]
#[test]
fn silent_worker_leaves_results_missing() {
    let err = distribute_tasks(
        &Probe,
        &probes(2),
        1,
        ExecutionMode::Distributed,
        &shell_worker("cat > /dev/null"),
    )
    .expect_err("a worker that never replies should fail the batch");
    assert!(matches!(err, DistributeError::MissingResult { index: 0 }));
}

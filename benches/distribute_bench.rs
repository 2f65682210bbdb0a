//! Compare one worker thread against every available thread for a batch of
//! period solves.
//!
//! Run with: `cargo bench --bench distribute`
//! Or quick comparison: `cargo run --bin benchmark_parallel_speedup` (see src/bin)

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use scalebench::parallel::{distribute_tasks, DistributedConfig, ExecutionMode};
use scalebench::solver::{generate_bundle, BundleShape, SolverInputs};
use scalebench::tasks::SolvePeriod;

fn period_inputs(periods: u32) -> Vec<SolverInputs> {
    let shape = BundleShape {
        periods,
        states: 128,
        draws: 100,
        ..BundleShape::default()
    };
    generate_bundle(shape, 42).periods.into_values().collect()
}

fn bench_local_distribution(c: &mut Criterion) {
    let inputs = period_inputs(16);
    let all = std::thread::available_parallelism().map_or(1, usize::from);
    // Local mode never launches worker processes.
    let distributed = DistributedConfig::new("scalebench");

    let mut group = c.benchmark_group("distribute_tasks");
    group.sample_size(20);
    group.measurement_time(std::time::Duration::from_secs(10));

    let mut counts = vec![1];
    if all > 1 {
        counts.push(all);
    }
    for workers in counts {
        group.bench_function(format!("local_{workers}_workers"), |b| {
            b.iter(|| {
                black_box(distribute_tasks(
                    &SolvePeriod,
                    &inputs,
                    workers,
                    ExecutionMode::Local,
                    &distributed,
                ))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_local_distribution);
criterion_main!(benches);

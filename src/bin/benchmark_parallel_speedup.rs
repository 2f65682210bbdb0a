//! Solve every period of a generated bundle once on one worker thread and once
//! on all available threads, then print timings and speedup.
//!
//! Usage: cargo run --release --bin benchmark_parallel_speedup [workers] [periods]

use std::time::Instant;

use scalebench::parallel::{LocalPool, ParallelMap};
use scalebench::solver::{generate_bundle, BundleShape, SolverInputs};
use scalebench::tasks::SolvePeriod;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let available = std::thread::available_parallelism().map_or(1, usize::from);
    let workers = args
        .get(1)
        .and_then(|raw| raw.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(available);
    let periods = args
        .get(2)
        .and_then(|raw| raw.parse::<u32>().ok())
        .unwrap_or(16);

    let shape = BundleShape {
        periods,
        ..BundleShape::default()
    };
    let bundle = generate_bundle(shape, 12345);
    let inputs: Vec<SolverInputs> = bundle.periods.into_values().collect();
    let n = inputs.len();

    println!(
        "Full solution: {} periods × {} states × {} draws",
        n, shape.states, shape.draws
    );
    println!();

    let sequential = LocalPool::with_workers(1);
    let t0 = Instant::now();
    let results_seq = match sequential.map(&SolvePeriod, &inputs) {
        Ok(results) => results,
        Err(err) => {
            eprintln!("sequential run failed: {err}");
            std::process::exit(1);
        }
    };
    let seq_ms = t0.elapsed().as_secs_f64() * 1000.0;
    println!("Sequential ({:>2} worker):  {:.2} ms", 1, seq_ms);

    let parallel = LocalPool::with_workers(workers);
    let t0 = Instant::now();
    let results_par = match parallel.map(&SolvePeriod, &inputs) {
        Ok(results) => results,
        Err(err) => {
            eprintln!("parallel run failed: {err}");
            std::process::exit(1);
        }
    };
    let par_ms = t0.elapsed().as_secs_f64() * 1000.0;
    println!("Parallel   ({:>2} workers): {:.2} ms", parallel.workers, par_ms);

    println!();
    println!("Speedup:     {:.2}x", seq_ms / par_ms);

    assert_eq!(results_seq.len(), results_par.len());
    for (i, (a, b)) in results_seq.iter().zip(results_par.iter()).enumerate() {
        for (x, y) in a.emax.iter().zip(b.emax.iter()) {
            assert!((x - y).abs() < 1e-9, "period {} emax mismatch", i);
        }
    }
    println!("(Results match sequential vs parallel)");
}

use std::io;
use std::path::PathBuf;

use tracing::info;

use crate::config::{Axis, HarnessConfig};
use crate::parallel::{distribute_tasks, serve, DistributedConfig, ExecutionMode};
use crate::scaling::{plot, run_step, run_sweep, OutputMode, PlotOutcome, StepLauncher, SweepOutcome};
use crate::solver::{generate_bundle, save_bundle, BundleShape};
use crate::tasks::{builtin_registry, Probe, ProbeInput};

const USAGE: &str =
    "usage: scalebench <sweep|exec|plot|worker|generate-inputs|probe> [args...]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Sweep,
    Exec,
    Plot,
    Worker,
    GenerateInputs,
    Probe,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("sweep") => Some(Command::Sweep),
        Some("exec") => Some(Command::Exec),
        Some("plot") => Some(Command::Plot),
        Some("worker") => Some(Command::Worker),
        Some("generate-inputs") => Some(Command::GenerateInputs),
        Some("probe") => Some(Command::Probe),
        _ => None,
    }
}

pub fn run_with_args(args: &[String]) -> i32 {
    match parse_command(args) {
        Some(Command::Sweep) => handle_sweep(args),
        Some(Command::Exec) => handle_exec(args),
        Some(Command::Plot) => handle_plot(args),
        Some(Command::Worker) => handle_worker(),
        Some(Command::GenerateInputs) => handle_generate(args),
        Some(Command::Probe) => handle_probe(args),
        None => {
            eprintln!("{USAGE}");
            2
        }
    }
}

/// Axis and output mode may appear anywhere after the command, e.g. `sweep processes save`.
fn axis_and_mode(args: &[String]) -> (Axis, OutputMode) {
    let rest = args.get(2..).unwrap_or_default();
    let axis = rest
        .iter()
        .find_map(|arg| arg.parse::<Axis>().ok())
        .unwrap_or(Axis::Threads);
    let mode = rest
        .iter()
        .find_map(|arg| arg.parse::<OutputMode>().ok())
        .unwrap_or(OutputMode::Save);
    (axis, mode)
}

fn load_config() -> Option<HarnessConfig> {
    match HarnessConfig::load() {
        Ok(config) => Some(config),
        Err(err) => {
            eprintln!("config error: {err}");
            None
        }
    }
}

fn distributed_config(config: &HarnessConfig) -> io::Result<DistributedConfig> {
    Ok(DistributedConfig::current_exe()?.with_marker(config.distributed_marker.clone()))
}

fn handle_sweep(args: &[String]) -> i32 {
    let (axis, mode) = axis_and_mode(args);
    let Some(config) = load_config() else {
        return 1;
    };
    let launcher = match StepLauncher::current_exe() {
        Ok(launcher) => launcher,
        Err(err) => {
            eprintln!("cannot locate scalebench executable: {err}");
            return 1;
        }
    };

    match run_sweep(&config, axis, &launcher) {
        Ok(SweepOutcome::Skipped) => println!(
            "data set already available: {}",
            config.timing_table_path(axis).display()
        ),
        Ok(SweepOutcome::Completed { steps_run }) => {
            info!(%axis, steps = steps_run.len(), "sweep complete")
        }
        Err(err) => {
            eprintln!("sweep failed: {err}");
            return 1;
        }
    }
    emit_plot(&config, axis, mode)
}

fn handle_exec(args: &[String]) -> i32 {
    let (Some(axis), Some(resource_count)) = (
        args.get(2).and_then(|raw| raw.parse::<Axis>().ok()),
        args.get(3).and_then(|raw| raw.parse::<usize>().ok()),
    ) else {
        eprintln!("usage: scalebench exec <threads|processes> <resource-count>");
        return 2;
    };
    let Some(config) = load_config() else {
        return 1;
    };
    let distributed = match distributed_config(&config) {
        Ok(distributed) => distributed,
        Err(err) => {
            eprintln!("cannot locate scalebench executable: {err}");
            return 1;
        }
    };

    match run_step(&config, axis, resource_count, &distributed) {
        Ok(report) => {
            println!(
                "recorded {} samples for {} {} in {}",
                report.samples,
                report.resource_count,
                report.axis,
                report.table.display()
            );
            0
        }
        Err(err) => {
            eprintln!("sweep step failed: {err}");
            1
        }
    }
}

fn handle_plot(args: &[String]) -> i32 {
    let (axis, mode) = axis_and_mode(args);
    let Some(config) = load_config() else {
        return 1;
    };
    emit_plot(&config, axis, mode)
}

fn emit_plot(config: &HarnessConfig, axis: Axis, mode: OutputMode) -> i32 {
    match plot(config, axis, mode) {
        Ok(PlotOutcome::Saved(path)) => {
            println!("figure written to {}", path.display());
            0
        }
        Ok(PlotOutcome::Shown(table)) => {
            print!("{table}");
            0
        }
        Err(err) => {
            eprintln!("plot failed: {err}");
            1
        }
    }
}

fn handle_worker() -> i32 {
    let registry = builtin_registry();
    let stdin = io::stdin();
    let stdout = io::stdout();
    match serve(&registry, stdin.lock(), stdout.lock()) {
        Ok(answered) => {
            info!(answered, "worker finished");
            0
        }
        Err(err) => {
            eprintln!("worker error: {err}");
            1
        }
    }
}

fn handle_generate(args: &[String]) -> i32 {
    let path = match args.get(2) {
        Some(path) => PathBuf::from(path),
        None => match load_config() {
            Some(config) => config.input_data,
            None => return 1,
        },
    };
    let defaults = BundleShape::default();
    let shape = BundleShape {
        periods: parse_arg(args.get(3), "periods", defaults.periods),
        ..defaults
    };
    let seed = parse_arg(args.get(4), "seed", 42u64);

    match save_bundle(&path, &generate_bundle(shape, seed)) {
        Ok(()) => {
            println!(
                "wrote {} period(s) of solver inputs to {}",
                shape.periods,
                path.display()
            );
            0
        }
        Err(err) => {
            eprintln!("generate failed: {err}");
            1
        }
    }
}

fn handle_probe(args: &[String]) -> i32 {
    let tasks = parse_arg(args.get(2), "tasks", 4usize);
    let workers = parse_arg(args.get(3), "workers", 2usize);
    let mode = match args.get(4).map(|raw| raw.parse::<ExecutionMode>()) {
        None => ExecutionMode::Local,
        Some(Ok(mode)) => mode,
        Some(Err(err)) => {
            eprintln!("{err}");
            return 2;
        }
    };
    let marker = match load_config() {
        Some(config) => config.distributed_marker,
        None => return 1,
    };
    let distributed = match DistributedConfig::current_exe() {
        Ok(config) => config.with_marker(marker),
        Err(err) => {
            eprintln!("cannot locate scalebench executable: {err}");
            return 1;
        }
    };

    let inputs: Vec<ProbeInput> = (0..tasks as u64)
        .map(|token| ProbeInput { token, fail: false })
        .collect();
    match distribute_tasks(&Probe, &inputs, workers, mode, &distributed) {
        Ok(reports) => match serde_json::to_string_pretty(&reports) {
            Ok(payload) => {
                println!("{payload}");
                0
            }
            Err(err) => {
                eprintln!("failed to serialize probe reports: {err}");
                1
            }
        },
        Err(err) => {
            eprintln!("probe failed: {err}");
            1
        }
    }
}

fn parse_arg<T: std::str::FromStr + std::fmt::Display + Copy>(
    raw: Option<&String>,
    name: &str,
    default: T,
) -> T {
    raw.and_then(|value| value.parse::<T>().ok())
        .unwrap_or_else(|| {
            if let Some(value) = raw {
                eprintln!("invalid {name} '{value}', defaulting to {default}");
            }
            default
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_known_commands() {
        assert_eq!(parse_command(&args(&["scalebench", "sweep"])), Some(Command::Sweep));
        assert_eq!(parse_command(&args(&["scalebench", "generate-inputs"])), Some(Command::GenerateInputs));
        assert_eq!(parse_command(&args(&["scalebench", "bogus"])), None);
        assert_eq!(parse_command(&args(&["scalebench"])), None);
    }

    #[test]
    fn axis_and_mode_default_to_threads_and_save() {
        assert_eq!(
            axis_and_mode(&args(&["scalebench", "sweep"])),
            (Axis::Threads, OutputMode::Save)
        );
        assert_eq!(
            axis_and_mode(&args(&["scalebench", "plot", "show", "processes"])),
            (Axis::Processes, OutputMode::Show)
        );
    }

    #[test]
    fn invalid_numeric_args_fall_back_to_defaults() {
        assert_eq!(parse_arg(Some(&"12".to_string()), "tasks", 4usize), 12);
        assert_eq!(parse_arg(Some(&"many".to_string()), "tasks", 4usize), 4);
        assert_eq!(parse_arg::<u64>(None, "seed", 42), 42);
    }
}

use std::env;
use std::process;

use scalebench::cli;
use tracing_subscriber::EnvFilter;

fn main() {
    // stdout carries worker replies and command output; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    process::exit(cli::run_with_args(&args));
}

use thiserror::Error;

use super::plot::ChartError;
use super::status::StatusError;
use super::timing::TableError;
use crate::config::{Axis, ConfigError};
use crate::parallel::DistributeError;
use crate::solver::SolverError;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Distribute(#[from] DistributeError),
    #[error(transparent)]
    Chart(#[from] ChartError),
    #[error(
        "data set already available at {path} but no sweep status records it; \
         move, rename or delete it to create a new one"
    )]
    UnrecordedTable { path: String },
    #[error("resource count {resource_count} outside 1..={max} for {axis}")]
    ResourceOutOfRange {
        axis: Axis,
        resource_count: usize,
        max: usize,
    },
    #[error("failed to launch {axis} step {resource_count}: {source}")]
    Launch {
        axis: Axis,
        resource_count: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("{axis} step {resource_count} exited with {status}")]
    StepFailed {
        axis: Axis,
        resource_count: usize,
        status: String,
    },
    #[error("failed to write figure {path}: {source}")]
    Figure {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

//! Harness configuration, read from `scalebench.yaml` (or `$SCALEBENCH_CONFIG`).
//!
//! Every field has a default, so a missing default config file is not an
//! error. `$SCALEBENCH_RESOURCES` overrides where tables and figures live.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parallel::DEFAULT_COORDINATOR_VAR;

pub const DEFAULT_CONFIG_PATH: &str = "scalebench.yaml";
pub const CONFIG_PATH_VAR: &str = "SCALEBENCH_CONFIG";
pub const RESOURCES_DIR_VAR: &str = "SCALEBENCH_RESOURCES";
pub const SLICED_INPUT_FILE: &str = "sliced_input_params.json";

/// Thread-pool size variables of the numeric libraries a benchmark may load.
/// `RAYON_NUM_THREADS` caps the built-in solver.
pub const DEFAULT_THREAD_ENV_VARS: [&str; 6] = [
    "NUMBA_NUM_THREADS",
    "MKL_NUM_THREADS",
    "OMP_NUM_THREADS",
    "OPENBLAS_NUM_THREADS",
    "NUMEXPR_NUM_THREADS",
    "RAYON_NUM_THREADS",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Resource being varied in a scalability sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Threads,
    Processes,
}

impl Axis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threads => "threads",
            Self::Processes => "processes",
        }
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "threads" => Ok(Self::Threads),
            "processes" => Ok(Self::Processes),
            other => Err(format!("unknown axis '{other}' (expected threads or processes)")),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Sweep covers resource counts `1..=max`.
    pub max: usize,
    /// Benchmark calls (timing samples) per resource count.
    pub iterations: usize,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            max: 9,
            iterations: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub resources_dir: PathBuf,
    /// Input bundle keyed by period.
    pub input_data: PathBuf,
    pub period: u32,
    pub threads: AxisConfig,
    pub processes: AxisConfig,
    pub thread_env_vars: Vec<String>,
    pub distributed_marker: String,
    /// File this config was read from, handed down to sweep steps.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            resources_dir: PathBuf::from("resources"),
            input_data: PathBuf::from("resources/solver_inputs.json"),
            period: 0,
            threads: AxisConfig::default(),
            processes: AxisConfig::default(),
            thread_env_vars: DEFAULT_THREAD_ENV_VARS.iter().map(|v| v.to_string()).collect(),
            distributed_marker: DEFAULT_COORDINATOR_VAR.to_string(),
            source: None,
        }
    }
}

impl HarnessConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.source = Some(path.to_path_buf());
        config.validate()?;
        Ok(config)
    }

    /// Load from `$SCALEBENCH_CONFIG`, else `scalebench.yaml` if present, else defaults;
    /// then apply `$SCALEBENCH_RESOURCES`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var_os(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        if let Some(dir) = env::var_os(RESOURCES_DIR_VAR) {
            config.resources_dir = PathBuf::from(dir);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for axis in [Axis::Threads, Axis::Processes] {
            let settings = self.axis(axis);
            if settings.max == 0 {
                return Err(ConfigError::Invalid(format!("{axis}.max must be at least 1")));
            }
            if settings.iterations == 0 {
                return Err(ConfigError::Invalid(format!("{axis}.iterations must be at least 1")));
            }
        }
        if self.distributed_marker.trim().is_empty() {
            return Err(ConfigError::Invalid("distributed_marker must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn axis(&self, axis: Axis) -> &AxisConfig {
        match axis {
            Axis::Threads => &self.threads,
            Axis::Processes => &self.processes,
        }
    }

    fn file_stem(&self, axis: Axis) -> String {
        format!("{}{}_{}", self.axis(axis).max, axis, self.period)
    }

    pub fn timing_table_path(&self, axis: Axis) -> PathBuf {
        self.resources_dir
            .join(format!("times_df_{}.csv", self.file_stem(axis)))
    }

    pub fn status_path(&self, axis: Axis) -> PathBuf {
        self.resources_dir
            .join(format!("times_df_{}.status.json", self.file_stem(axis)))
    }

    pub fn figure_path(&self, axis: Axis) -> PathBuf {
        self.resources_dir
            .join(format!("figure_time_{}.svg", self.file_stem(axis)))
    }

    pub fn sliced_input_path(&self) -> PathBuf {
        self.resources_dir.join(SLICED_INPUT_FILE)
    }
}

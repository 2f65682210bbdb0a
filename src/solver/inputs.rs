//! Solver input files: a bundle keyed by period, and the per-period slice the
//! benchmark steps load.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{OptimParas, SolverError, SolverInputs};
use crate::persist::write_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBundle {
    pub periods: BTreeMap<u32, SolverInputs>,
}

/// Dimensions of a synthetic bundle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BundleShape {
    pub periods: u32,
    pub states: usize,
    pub choices: usize,
    pub wage_choices: usize,
    pub draws: usize,
}

impl Default for BundleShape {
    fn default() -> Self {
        Self {
            periods: 4,
            states: 256,
            choices: 4,
            wage_choices: 2,
            draws: 200,
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, SolverError> {
    let raw = fs::read_to_string(path).map_err(|source| SolverError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| SolverError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SolverError> {
    let payload = serde_json::to_vec(value).map_err(|source| SolverError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    write_atomic(path, &payload).map_err(|source| SolverError::Write {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_bundle(path: &Path) -> Result<InputBundle, SolverError> {
    read_json(path)
}

pub fn save_bundle(path: &Path, bundle: &InputBundle) -> Result<(), SolverError> {
    write_json(path, bundle)
}

/// Load a single-period input file written by [slice_period].
pub fn load_inputs(path: &Path) -> Result<SolverInputs, SolverError> {
    read_json(path)
}

/// Copy one period out of a bundle into its own file and return it.
pub fn slice_period(bundle_path: &Path, period: u32, out_path: &Path) -> Result<SolverInputs, SolverError> {
    let mut bundle = load_bundle(bundle_path)?;
    let inputs = bundle
        .periods
        .remove(&period)
        .ok_or_else(|| SolverError::MissingPeriod {
            path: bundle_path.display().to_string(),
            period,
        })?;
    inputs.validate()?;
    write_json(out_path, &inputs)?;
    Ok(inputs)
}

/// Deterministic synthetic inputs for benchmarking without model estimates.
pub fn generate_bundle(shape: BundleShape, seed: u64) -> InputBundle {
    let mut rng = StdRng::seed_from_u64(seed);
    let wage_choices = shape.wage_choices.min(shape.choices);
    let periods = (0..shape.periods)
        .map(|period| {
            let wages: Vec<Vec<f64>> = (0..shape.states)
                .map(|_| {
                    (0..shape.choices)
                        .map(|choice| {
                            if choice < wage_choices {
                                rng.gen_range(5.0..40.0)
                            } else {
                                0.0
                            }
                        })
                        .collect::<Vec<_>>()
                })
                .collect();
            let nonpecs: Vec<Vec<f64>> = (0..shape.states)
                .map(|_| (0..shape.choices).map(|_| rng.gen_range(-5.0..5.0)).collect::<Vec<_>>())
                .collect();
            let continuation_values: Vec<Vec<f64>> = (0..shape.states)
                .map(|_| (0..shape.choices).map(|_| rng.gen_range(0.0..100.0)).collect::<Vec<_>>())
                .collect();
            let period_draws_emax_risk: Vec<Vec<f64>> = (0..shape.draws)
                .map(|_| {
                    (0..shape.choices)
                        .map(|_| 0.2 * rng.sample::<f64, _>(StandardNormal))
                        .collect::<Vec<_>>()
                })
                .collect();
            let inputs = SolverInputs {
                wages,
                nonpecs,
                continuation_values,
                period_draws_emax_risk,
                optim_paras: OptimParas {
                    delta: 0.95,
                    n_wage_choices: wage_choices,
                },
            };
            (period, inputs)
        })
        .collect();
    InputBundle { periods }
}

//! One-period "full solution" kernel of a discrete-choice dynamic program.
//!
//! For every state the kernel integrates over the Monte Carlo shock draws and
//! averages the maximum over choices of flow utility plus discounted
//! continuation value. The harness only ever observes its latency.

use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod inputs;

pub use inputs::{
    generate_bundle, load_bundle, load_inputs, save_bundle, slice_period, BundleShape, InputBundle,
};

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("failed to read solver input {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse solver input {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write solver input {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("period {period} not present in input bundle {path}")]
    MissingPeriod { path: String, period: u32 },
    #[error("invalid solver input: {0}")]
    Shape(String),
}

/// Model parameters the kernel needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimParas {
    /// Discount factor applied to continuation values.
    pub delta: f64,
    /// The first `n_wage_choices` choices pay `wage * exp(shock)`; the rest
    /// take the shock additively.
    pub n_wage_choices: usize,
}

/// The five arguments of the full-solution call for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverInputs {
    /// states x choices
    pub wages: Vec<Vec<f64>>,
    /// states x choices
    pub nonpecs: Vec<Vec<f64>>,
    /// states x choices
    pub continuation_values: Vec<Vec<f64>>,
    /// draws x choices
    pub period_draws_emax_risk: Vec<Vec<f64>>,
    pub optim_paras: OptimParas,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// Expected maximum value per state.
    pub emax: Vec<f64>,
}

impl SolverInputs {
    pub fn n_states(&self) -> usize {
        self.wages.len()
    }

    pub fn n_choices(&self) -> usize {
        self.wages.first().map_or(0, Vec::len)
    }

    pub fn n_draws(&self) -> usize {
        self.period_draws_emax_risk.len()
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        let states = self.n_states();
        let choices = self.n_choices();
        if states == 0 || choices == 0 {
            return Err(SolverError::Shape("at least one state and one choice required".to_string()));
        }
        for (name, matrix) in [
            ("wages", &self.wages),
            ("nonpecs", &self.nonpecs),
            ("continuation_values", &self.continuation_values),
        ] {
            if matrix.len() != states {
                return Err(SolverError::Shape(format!(
                    "{name} has {} states, expected {states}",
                    matrix.len()
                )));
            }
            if let Some(row) = matrix.iter().position(|row| row.len() != choices) {
                return Err(SolverError::Shape(format!(
                    "{name} row {row} has {} choices, expected {choices}",
                    matrix[row].len()
                )));
            }
        }
        if self.period_draws_emax_risk.is_empty() {
            return Err(SolverError::Shape("no shock draws".to_string()));
        }
        if let Some(row) = self
            .period_draws_emax_risk
            .iter()
            .position(|draw| draw.len() != choices)
        {
            return Err(SolverError::Shape(format!(
                "draw {row} has {} shocks, expected {choices}",
                self.period_draws_emax_risk[row].len()
            )));
        }
        let paras = &self.optim_paras;
        if !(0.0..=1.0).contains(&paras.delta) {
            return Err(SolverError::Shape(format!("delta {} outside [0, 1]", paras.delta)));
        }
        if paras.n_wage_choices > choices {
            return Err(SolverError::Shape(format!(
                "{} wage choices but only {choices} choices",
                paras.n_wage_choices
            )));
        }
        Ok(())
    }
}

/// Solve one period. States are spread over the current rayon pool, so
/// `RAYON_NUM_THREADS` (or an enclosing [crate::parallel::LocalPool]) caps the
/// parallelism.
pub fn full_solution(inputs: &SolverInputs) -> Result<Solution, SolverError> {
    inputs.validate()?;
    let emax = (0..inputs.n_states())
        .into_par_iter()
        .map(|state| expected_max(inputs, state))
        .collect();
    Ok(Solution { emax })
}

fn expected_max(inputs: &SolverInputs, state: usize) -> f64 {
    let wages = &inputs.wages[state];
    let nonpecs = &inputs.nonpecs[state];
    let continuation = &inputs.continuation_values[state];
    let paras = &inputs.optim_paras;

    let total: f64 = inputs
        .period_draws_emax_risk
        .iter()
        .map(|shocks| {
            shocks
                .iter()
                .enumerate()
                .map(|(choice, &shock)| {
                    let flow = if choice < paras.n_wage_choices {
                        wages[choice] * shock.exp() + nonpecs[choice]
                    } else {
                        nonpecs[choice] + shock
                    };
                    flow + paras.delta * continuation[choice]
                })
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .sum();
    total / inputs.n_draws() as f64
}

/// Call the solver `iterations` times and return each call's wall-clock
/// duration in microseconds.
pub fn time_full_solution(inputs: &SolverInputs, iterations: usize) -> Result<Vec<u64>, SolverError> {
    inputs.validate()?;
    let mut samples = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        let start = Instant::now();
        let solution = full_solution(inputs)?;
        std::hint::black_box(solution);
        samples.push(start.elapsed().as_micros() as u64);
    }
    Ok(samples)
}

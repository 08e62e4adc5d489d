//! Parameter sweeps: solve and simulate one game per (rate list, `k`) cell.
//!
//! The default sweep compares joint hopping and rate adaptation (the full
//! rate list) against hopping at a single fixed rate, over `k = 3..=5`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ExperimentConfig;
use crate::error::GameError;
use crate::game::GameModel;
use crate::params::{ParameterSpec, Parameters};
use crate::simulation::{run_trials, TrialSummary};
use crate::solver::{CancellationToken, EquilibriumSolver, SolveStatus};

/// One rate list to compare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepVariant {
    pub name: String,
    pub rates: Vec<f64>,
}

impl SweepVariant {
    #[must_use]
    pub fn new(name: impl Into<String>, rates: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            rates,
        }
    }
}

/// Which variants and channel counts a sweep covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    pub variants: Vec<SweepVariant>,
    /// Channel counts `k` tried for every variant
    pub channels: Vec<usize>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            variants: vec![
                SweepVariant::new("Joint FH and RA", ParameterSpec::default().rates),
                SweepVariant::new("FH only, 54 Mbps", vec![54.0]),
                SweepVariant::new("FH only, 24 Mbps", vec![24.0]),
                SweepVariant::new("FH only, 6 Mbps", vec![6.0]),
            ],
            channels: vec![3, 4, 5],
        }
    }
}

impl SweepConfig {
    /// Number of (variant, `k`) cells.
    #[must_use]
    pub fn cells(&self) -> usize {
        self.variants.len() * self.channels.len()
    }
}

/// What happened in one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SweepOutcome {
    Solved {
        status: SolveStatus,
        objective: f64,
        simulation: TrialSummary,
    },
    /// The cell's parameters were rejected or its start point was infeasible.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRow {
    pub variant: String,
    pub k: usize,
    #[serde(flatten)]
    pub outcome: SweepOutcome,
}

/// Solve and simulate every cell of `config.sweep` in order, reporting each
/// row through `on_row` as it completes.
///
/// The other sections of `config` are shared by every cell; only the rate
/// list and `k` change. A cell whose game cannot be built or solved becomes
/// a [`SweepOutcome::Skipped`] row. Once the token is cancelled the sweep
/// stops after the cell in progress.
pub fn run_sweep(
    config: &ExperimentConfig,
    token: &CancellationToken,
    mut on_row: impl FnMut(&SweepRow),
) -> Vec<SweepRow> {
    let sweep = &config.sweep;
    let mut rows = Vec::with_capacity(sweep.cells());

    'variants: for variant in &sweep.variants {
        for &k in &sweep.channels {
            if token.is_cancelled() {
                break 'variants;
            }
            info!(variant = %variant.name, k, "sweep cell");
            let outcome = match solve_cell(config, variant, k, token) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(variant = %variant.name, k, error = %e, "sweep cell skipped");
                    SweepOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
            };
            let row = SweepRow {
                variant: variant.name.clone(),
                k,
                outcome,
            };
            on_row(&row);
            rows.push(row);
        }
    }
    rows
}

fn solve_cell(
    config: &ExperimentConfig,
    variant: &SweepVariant,
    k: usize,
    token: &CancellationToken,
) -> Result<SweepOutcome, GameError> {
    let spec = ParameterSpec {
        k,
        m: None,
        rates: variant.rates.clone(),
        ..ParameterSpec::from(config.parameters.clone())
    };
    let model = Arc::new(GameModel::build(Parameters::new(spec)?)?);
    let equilibrium =
        EquilibriumSolver::new(Arc::clone(&model), config.solver.clone()).solve(token)?;
    let simulation = run_trials(
        &model,
        &equilibrium.strategies.transmitter,
        equilibrium.strategies.jammer.probs(),
        &config.simulation,
        |_| {},
    )?;
    Ok(SweepOutcome::Solved {
        status: equilibrium.status,
        objective: equilibrium.objective,
        simulation,
    })
}

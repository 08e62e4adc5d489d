//! Equilibrium search for the hopping game.
//!
//! Both players' depth-bounded best-response values are folded into one
//! scalar, `Σ_x V1(x, 0) + V2(x, 0)`, which is minimised over the joint
//! strategy vector subject to the probability simplices and the jammer's
//! average-power budget. A run can be cancelled cooperatively from another
//! thread through a [`CancellationToken`].

mod minimize;
mod objective;
mod values;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::GameError;
use crate::game::GameModel;
use crate::strategy::{JammerStrategy, StrategyPair, StrategyTable};

pub use minimize::{
    Interrupted, LinearConstraint, Minimizer, Minimum, ObjectiveFn, Problem, ProjectedGradient,
};
pub use objective::{CancellableObjective, Objective};
pub use values::{ValueFn, ValueTable};

/// Shared stop flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Solver tuning. Every field has a default, so partial YAML is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    /// Per-depth discount `δ`.
    pub discount: f64,
    /// Depths whose weight `δ^d` falls below this are worth zero.
    pub cutoff: f64,
    /// Explicit deepest lookahead depth; derived from `cutoff` when unset.
    pub horizon: Option<usize>,
    pub max_iterations: usize,
    pub step_tolerance: f64,
    pub objective_tolerance: f64,
    pub gradient_step: f64,
    /// Allowed constraint violation of the starting point.
    pub feasibility_tolerance: f64,
    /// Decimal places kept in the returned strategies.
    pub round_digits: Option<u32>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            discount: 0.9,
            cutoff: 0.001,
            horizon: None,
            max_iterations: 200,
            step_tolerance: 1e-9,
            objective_tolerance: 1e-10,
            gradient_step: 1e-7,
            feasibility_tolerance: 1e-9,
            round_digits: Some(8),
        }
    }
}

impl SolverConfig {
    /// Deepest depth whose weight `δ^d` is still at least `cutoff`, or the
    /// explicit `horizon` when one is set.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfiguration`] if the horizon has to be
    /// derived and the discount or cutoff lies outside `(0, 1)`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn horizon(&self) -> Result<usize, GameError> {
        if let Some(h) = self.horizon {
            return Ok(h);
        }
        self.check_weights()?;
        let mut depth = (self.cutoff.ln() / self.discount.ln()).floor() as usize;
        // Round-off can land one step off an exact power of the discount.
        if self.discount.powf((depth + 1) as f64) >= self.cutoff {
            depth += 1;
        } else if depth > 0 && self.discount.powf(depth as f64) < self.cutoff {
            depth -= 1;
        }
        Ok(depth)
    }

    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfiguration`] if the discount or cutoff
    /// lies outside `(0, 1)` or a tolerance is not positive.
    pub fn validate(&self) -> Result<(), GameError> {
        self.check_weights()?;
        if self.gradient_step <= 0.0 || self.step_tolerance <= 0.0 {
            return Err(GameError::InvalidConfiguration(
                "gradient step and step tolerance must be positive".into(),
            ));
        }
        Ok(())
    }

    fn check_weights(&self) -> Result<(), GameError> {
        let open_unit = |v: f64| v > 0.0 && v < 1.0;
        if !open_unit(self.discount) {
            return Err(GameError::InvalidConfiguration(format!(
                "discount must be in (0, 1), got {}",
                self.discount
            )));
        }
        if self.horizon.is_none() && !open_unit(self.cutoff) {
            return Err(GameError::InvalidConfiguration(format!(
                "cutoff must be in (0, 1), got {}",
                self.cutoff
            )));
        }
        Ok(())
    }
}

/// How a solve ended. Only `Converged` means the minimiser's stopping
/// criteria were met; the other two still carry a usable strategy pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    Converged,
    /// Iteration budget exhausted.
    Unconverged,
    /// Stopped through the token; strategies are the last evaluated point.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Equilibrium {
    pub strategies: StrategyPair,
    /// Objective at the returned (unrounded) point.
    pub objective: f64,
    pub status: SolveStatus,
    pub iterations: usize,
    pub evaluations: u64,
}

/// Minimises the joint value objective for one [`GameModel`].
#[derive(Debug, Clone)]
pub struct EquilibriumSolver<M = ProjectedGradient> {
    model: Arc<GameModel>,
    config: SolverConfig,
    minimizer: M,
}

impl EquilibriumSolver<ProjectedGradient> {
    #[must_use]
    pub fn new(model: Arc<GameModel>, config: SolverConfig) -> Self {
        let minimizer = ProjectedGradient::from_config(&config);
        Self {
            model,
            config,
            minimizer,
        }
    }
}

impl<M: Minimizer> EquilibriumSolver<M> {
    #[must_use]
    pub fn with_minimizer(model: Arc<GameModel>, config: SolverConfig, minimizer: M) -> Self {
        Self {
            model,
            config,
            minimizer,
        }
    }

    #[must_use]
    pub fn model(&self) -> &GameModel {
        &self.model
    }

    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Bounds `[0, 1]`, one simplex equality per state, one for the jammer,
    /// and `Σ y_i p_jam[i] <= p_avg`.
    #[must_use]
    pub fn problem(&self) -> Problem {
        let ns = self.model.state_space().len();
        let na = self.model.action_space().len();
        let np = self.model.power_levels();
        let f_len = ns * na;
        let dim = f_len + np;

        let mut constraints = Vec::with_capacity(ns + 2);
        for s in 0..ns {
            let mut coefficients = vec![0.0; dim];
            coefficients[s * na..(s + 1) * na].fill(1.0);
            constraints.push(LinearConstraint::equality(coefficients, 1.0));
        }
        let mut jammer_sum = vec![0.0; dim];
        jammer_sum[f_len..].fill(1.0);
        constraints.push(LinearConstraint::equality(jammer_sum, 1.0));

        let mut power = vec![0.0; dim];
        power[f_len..].copy_from_slice(self.model.params().p_jam());
        constraints.push(LinearConstraint::at_most(power, self.model.params().p_avg()));

        Problem {
            bounds: vec![(0.0, 1.0); dim],
            constraints,
        }
    }

    /// Fully exploring transmitter table plus a uniform jammer.
    ///
    /// # Errors
    ///
    /// Propagates [`GameError::InvalidStrategy`] from the strategy table.
    pub fn initial_point(&self) -> Result<Vec<f64>, GameError> {
        let table = StrategyTable::new(&self.model, 1.0)?;
        let pair = StrategyPair {
            transmitter: table.to_strategy(&self.model),
            jammer: JammerStrategy::uniform(self.model.power_levels()),
        };
        Ok(pair.to_vector())
    }

    /// Run the search to completion, budget exhaustion or cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfiguration`] for a bad solver config
    /// and [`GameError::InfeasibleStart`] when the uniform starting point
    /// breaks a constraint, e.g. its mean power exceeds `p_avg`.
    pub fn solve(&self, token: &CancellationToken) -> Result<Equilibrium, GameError> {
        self.config.validate()?;
        let problem = self.problem();
        problem.check()?;

        let x0 = self.initial_point()?;
        let violation = problem.violation(&x0);
        if violation > self.config.feasibility_tolerance {
            return Err(GameError::InfeasibleStart(format!(
                "uniform strategies violate the constraints by {violation:.6} \
                 (mean jammer power {:.4} vs budget {})",
                self.model.params().expected_power(&x0[x0.len() - self.model.power_levels()..]),
                self.model.params().p_avg()
            )));
        }

        let horizon = self.config.horizon()?;
        let objective = Objective::new(&self.model, self.config.discount, horizon);
        let mut cancellable = CancellableObjective::new(objective, token);

        info!(
            variables = problem.dimension(),
            constraints = problem.constraints.len(),
            horizon,
            discount = self.config.discount,
            "solving for equilibrium"
        );
        let start = Instant::now();

        let mut eval = |x: &[f64]| cancellable.call(x);
        let outcome = self.minimizer.minimize(&mut eval, &x0, &problem);

        let (x, status, iterations) = match outcome {
            Ok(min) => {
                let status = if min.converged {
                    SolveStatus::Converged
                } else {
                    SolveStatus::Unconverged
                };
                (min.x, status, min.iterations)
            }
            Err(Interrupted) => {
                let last = cancellable.last_input().map_or_else(|| x0.clone(), <[f64]>::to_vec);
                (last, SolveStatus::Cancelled, 0)
            }
        };
        let evaluations = cancellable.evaluations();

        let x = self.clean(&x);
        let value = objective.evaluate(&x);
        let mut strategies = StrategyPair::from_vector(&self.model, &x)?;
        if let Some(digits) = self.config.round_digits {
            strategies = strategies.rounded(digits);
        }

        match status {
            SolveStatus::Converged => info!(
                objective = value,
                iterations,
                evaluations,
                elapsed = ?start.elapsed(),
                "equilibrium search converged"
            ),
            SolveStatus::Unconverged => warn!(
                objective = value,
                iterations,
                "iteration budget exhausted before convergence"
            ),
            SolveStatus::Cancelled => warn!(
                objective = value,
                evaluations,
                "equilibrium search cancelled, returning last evaluated point"
            ),
        }

        Ok(Equilibrium {
            strategies,
            objective: value,
            status,
            iterations,
            evaluations,
        })
    }

    /// Clamp to `[0, 1]` and renormalise each simplex block.
    fn clean(&self, x: &[f64]) -> Vec<f64> {
        let na = self.model.action_space().len();
        let f_len = self.model.state_space().len() * na;
        let mut out: Vec<f64> = x.iter().map(|v| v.clamp(0.0, 1.0)).collect();
        let (f, y) = out.split_at_mut(f_len);
        f.chunks_mut(na).for_each(normalize);
        normalize(y);
        out
    }

    /// Run [`Self::solve`] on a dedicated thread.
    #[must_use]
    pub fn spawn(self, token: CancellationToken) -> SolveHandle
    where
        M: Send + 'static,
    {
        let thread_token = token.clone();
        let handle = std::thread::spawn(move || self.solve(&thread_token));
        SolveHandle { handle, token }
    }
}

#[allow(clippy::cast_precision_loss)]
fn normalize(block: &mut [f64]) {
    let sum: f64 = block.iter().sum();
    if sum > 0.0 {
        block.iter_mut().for_each(|v| *v /= sum);
    } else if !block.is_empty() {
        let uniform = 1.0 / block.len() as f64;
        block.fill(uniform);
    }
}

/// A solve running on its own thread.
#[derive(Debug)]
pub struct SolveHandle {
    handle: JoinHandle<Result<Equilibrium, GameError>>,
    token: CancellationToken,
}

impl SolveHandle {
    /// Ask the solver to stop at its next objective evaluation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the solve to end.
    ///
    /// # Errors
    ///
    /// Returns whatever [`EquilibriumSolver::solve`] returned.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from the solver thread.
    pub fn join(self) -> Result<Equilibrium, GameError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParameterSpec, Parameters};
    use test_macros::timed_test;

    fn model() -> Arc<GameModel> {
        Arc::new(GameModel::build(Parameters::default()).unwrap())
    }

    fn quick_config() -> SolverConfig {
        SolverConfig {
            horizon: Some(3),
            max_iterations: 5,
            ..SolverConfig::default()
        }
    }

    #[timed_test]
    fn default_horizon_follows_cutoff() {
        let config = SolverConfig::default();
        let h = config.horizon().unwrap();
        assert_eq!(h, 65);
        assert!(0.9f64.powi(65) >= 0.001);
        assert!(0.9f64.powi(66) < 0.001);
        assert_eq!(quick_config().horizon().unwrap(), 3);
    }

    #[timed_test]
    fn horizon_lands_on_exact_powers() {
        let config = SolverConfig {
            discount: 0.5,
            cutoff: 0.125,
            ..SolverConfig::default()
        };
        assert_eq!(config.horizon().unwrap(), 3);
        let config = SolverConfig {
            cutoff: 0.95,
            ..SolverConfig::default()
        };
        assert_eq!(config.horizon().unwrap(), 0);
    }

    #[timed_test]
    fn horizon_rejects_undiscounted_games() {
        for discount in [1.0, 1.5, 0.0, f64::NAN] {
            let config = SolverConfig {
                discount,
                ..SolverConfig::default()
            };
            assert!(
                matches!(config.horizon(), Err(GameError::InvalidConfiguration(_))),
                "discount {discount}"
            );
        }
        let explicit = SolverConfig {
            discount: 1.0,
            horizon: Some(4),
            ..SolverConfig::default()
        };
        assert_eq!(explicit.horizon().unwrap(), 4);
    }

    #[timed_test]
    fn rejects_bad_discount() {
        let config = SolverConfig {
            discount: 1.0,
            ..SolverConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GameError::InvalidConfiguration(_))
        ));
    }

    #[timed_test]
    fn problem_has_one_simplex_per_state_plus_jammer_and_budget() {
        let solver = EquilibriumSolver::new(model(), quick_config());
        let problem = solver.problem();
        assert_eq!(problem.dimension(), 5 * 16 + 9);
        assert_eq!(problem.constraints.len(), 5 + 2);
        problem.check().unwrap();

        let x0 = solver.initial_point().unwrap();
        assert!(problem.violation(&x0) < 1e-12);
    }

    #[timed_test]
    fn uniform_start_over_budget_is_infeasible() {
        let params = Parameters::new(ParameterSpec {
            p_avg: 0.1,
            ..ParameterSpec::default()
        })
        .unwrap();
        let model = Arc::new(GameModel::build(params).unwrap());
        let solver = EquilibriumSolver::new(model, quick_config());
        let err = solver.solve(&CancellationToken::new()).unwrap_err();
        assert!(matches!(err, GameError::InfeasibleStart(_)), "{err}");
    }

    #[timed_test(30)]
    fn short_solve_returns_valid_strategies() {
        let model = model();
        let solver = EquilibriumSolver::new(Arc::clone(&model), quick_config());
        let start = Objective::new(&model, 0.9, 3).evaluate(&solver.initial_point().unwrap());

        let eq = solver.solve(&CancellationToken::new()).unwrap();
        assert_ne!(eq.status, SolveStatus::Cancelled);
        assert!(eq.evaluations > 0);
        eq.strategies.validate(&model, 1e-4).unwrap();
        assert!(eq.objective <= start + 1e-6, "{} > {start}", eq.objective);
    }

    #[timed_test]
    fn precancelled_solve_returns_starting_point() {
        let model = model();
        let solver = EquilibriumSolver::new(Arc::clone(&model), quick_config());
        let token = CancellationToken::new();
        token.cancel();

        let eq = solver.solve(&token).unwrap();
        assert_eq!(eq.status, SolveStatus::Cancelled);
        assert_eq!(eq.evaluations, 0);
        let uniform = StrategyPair::uniform(&model).rounded(8);
        assert_eq!(eq.strategies, uniform);
    }

    #[timed_test]
    fn zero_budget_is_unconverged() {
        let config = SolverConfig {
            max_iterations: 0,
            ..quick_config()
        };
        let eq = EquilibriumSolver::new(model(), config)
            .solve(&CancellationToken::new())
            .unwrap();
        assert_eq!(eq.status, SolveStatus::Unconverged);
    }

    #[timed_test(30)]
    fn spawned_solve_can_be_cancelled() {
        let config = SolverConfig {
            horizon: Some(20),
            max_iterations: 10_000,
            ..SolverConfig::default()
        };
        let model = model();
        let handle = EquilibriumSolver::new(Arc::clone(&model), config).spawn(CancellationToken::new());
        std::thread::sleep(std::time::Duration::from_millis(50));
        let finished_early = handle.is_finished();
        handle.cancel();
        assert!(handle.token().is_cancelled());

        let eq = handle.join().unwrap();
        if !finished_early {
            assert_eq!(eq.status, SolveStatus::Cancelled);
        }
        eq.strategies.validate(&model, 1e-4).unwrap();
    }

    #[timed_test]
    fn solve_status_serializes_lowercase() {
        let yaml = serde_yaml::to_string(&SolveStatus::Unconverged).unwrap();
        assert_eq!(yaml.trim(), "unconverged");
    }
}

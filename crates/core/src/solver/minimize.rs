//! Bound- and linearly-constrained minimisation.
//!
//! The solver only depends on the [`Minimizer`] contract: minimise a scalar
//! objective over a box intersected with linear equalities and inequalities,
//! propagating [`Interrupted`] from the objective untouched. The built-in
//! [`ProjectedGradient`] uses finite-difference gradients, Armijo
//! backtracking and Dykstra's alternating projection onto the feasible set.

use thiserror::Error;
use tracing::{debug, trace};

use crate::error::GameError;

use super::SolverConfig;

/// Raised by a cancellable objective to abort the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("objective evaluation interrupted")]
pub struct Interrupted;

/// Objective callback: returns `Err(Interrupted)` to abort.
pub type ObjectiveFn<'a> = dyn FnMut(&[f64]) -> Result<f64, Interrupted> + 'a;

/// `lower <= coefficients · x <= upper`. Equal bounds give an equality.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub coefficients: Vec<f64>,
    pub lower: f64,
    pub upper: f64,
}

impl LinearConstraint {
    #[must_use]
    pub fn equality(coefficients: Vec<f64>, value: f64) -> Self {
        Self {
            coefficients,
            lower: value,
            upper: value,
        }
    }

    #[must_use]
    pub fn at_most(coefficients: Vec<f64>, upper: f64) -> Self {
        Self {
            coefficients,
            lower: f64::NEG_INFINITY,
            upper,
        }
    }

    fn dot(&self, x: &[f64]) -> f64 {
        self.coefficients.iter().zip(x).map(|(a, b)| a * b).sum()
    }

    /// Distance of `a · x` outside `[lower, upper]`.
    #[must_use]
    pub fn violation(&self, x: &[f64]) -> f64 {
        let s = self.dot(x);
        (self.lower - s).max(s - self.upper).max(0.0)
    }

    /// Orthogonal projection onto the slab.
    fn project(&self, x: &mut [f64]) {
        let s = self.dot(x);
        let target = s.clamp(self.lower, self.upper);
        if target == s {
            return;
        }
        let norm2: f64 = self.coefficients.iter().map(|a| a * a).sum();
        if norm2 == 0.0 {
            return;
        }
        let shift = (target - s) / norm2;
        for (xi, a) in x.iter_mut().zip(&self.coefficients) {
            *xi += shift * a;
        }
    }
}

/// Feasible set: per-coordinate bounds plus linear constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    pub bounds: Vec<(f64, f64)>,
    pub constraints: Vec<LinearConstraint>,
}

impl Problem {
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.bounds.len()
    }

    /// Largest bound or constraint violation at `x`.
    #[must_use]
    pub fn violation(&self, x: &[f64]) -> f64 {
        let bounds = self
            .bounds
            .iter()
            .zip(x)
            .map(|(&(lo, hi), &v)| (lo - v).max(v - hi).max(0.0))
            .fold(0.0, f64::max);
        self.constraints
            .iter()
            .map(|c| c.violation(x))
            .fold(bounds, f64::max)
    }

    /// Structural checks: dimensions agree and no interval is empty.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InfeasibleStart`] describing the first problem.
    pub fn check(&self) -> Result<(), GameError> {
        if let Some(i) = self.bounds.iter().position(|&(lo, hi)| lo > hi) {
            return Err(GameError::InfeasibleStart(format!(
                "bounds of coordinate {i} are empty"
            )));
        }
        for (i, c) in self.constraints.iter().enumerate() {
            if c.coefficients.len() != self.dimension() {
                return Err(GameError::InfeasibleStart(format!(
                    "constraint {i} has {} coefficients for a {}-dimensional problem",
                    c.coefficients.len(),
                    self.dimension()
                )));
            }
            if c.lower > c.upper {
                return Err(GameError::InfeasibleStart(format!(
                    "constraint {i} has an empty range"
                )));
            }
        }
        Ok(())
    }

    fn clamp(&self, x: &mut [f64]) {
        for (v, &(lo, hi)) in x.iter_mut().zip(&self.bounds) {
            *v = v.clamp(lo, hi);
        }
    }

    /// Dykstra's alternating projection of `x` onto the feasible set.
    fn project(&self, x: &mut [f64], sweeps: usize, tolerance: f64) {
        let sets = self.constraints.len() + 1;
        let mut increments = vec![vec![0.0; x.len()]; sets];
        let mut before = vec![0.0; x.len()];

        for _ in 0..sweeps {
            let mut change: f64 = 0.0;
            for (set, inc) in increments.iter_mut().enumerate() {
                before.copy_from_slice(x);
                for (xi, pi) in x.iter_mut().zip(inc.iter()) {
                    *xi += pi;
                }
                if set == 0 {
                    self.clamp(x);
                } else {
                    self.constraints[set - 1].project(x);
                }
                for ((pi, &b), &xi) in inc.iter_mut().zip(&before).zip(x.iter()) {
                    let shifted = b + *pi;
                    change = change.max((xi - b).abs());
                    *pi = shifted - xi;
                }
            }
            if change < tolerance {
                break;
            }
        }
    }
}

/// Outcome of a completed (not interrupted) minimisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// A constrained minimiser.
pub trait Minimizer {
    /// Minimise `objective` from the feasible start `x0`.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] as soon as the objective does.
    fn minimize(
        &self,
        objective: &mut ObjectiveFn<'_>,
        x0: &[f64],
        problem: &Problem,
    ) -> Result<Minimum, Interrupted>;
}

/// Projected gradient descent with forward-difference gradients.
#[derive(Debug, Clone)]
pub struct ProjectedGradient {
    pub max_iterations: usize,
    /// Finite-difference step.
    pub gradient_step: f64,
    /// Converged once a step moves no coordinate further than this.
    pub step_tolerance: f64,
    /// Converged once the relative objective change drops below this.
    pub objective_tolerance: f64,
    pub initial_step: f64,
    pub max_backtracks: usize,
    /// Armijo sufficient-decrease constant.
    pub armijo: f64,
    pub projection_sweeps: usize,
}

impl Default for ProjectedGradient {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            gradient_step: 1e-7,
            step_tolerance: 1e-9,
            objective_tolerance: 1e-10,
            initial_step: 1e-3,
            max_backtracks: 40,
            armijo: 1e-4,
            projection_sweeps: 2_000,
        }
    }
}

impl ProjectedGradient {
    #[must_use]
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            gradient_step: config.gradient_step,
            step_tolerance: config.step_tolerance,
            objective_tolerance: config.objective_tolerance,
            ..Self::default()
        }
    }

    fn gradient(
        &self,
        objective: &mut ObjectiveFn<'_>,
        x: &mut [f64],
        fx: f64,
        problem: &Problem,
    ) -> Result<Vec<f64>, Interrupted> {
        let mut grad = vec![0.0; x.len()];
        for i in 0..x.len() {
            let xi = x[i];
            // Step backwards at the upper bound.
            let h = if xi + self.gradient_step > problem.bounds[i].1 {
                -self.gradient_step
            } else {
                self.gradient_step
            };
            x[i] = xi + h;
            let fi = objective(&*x);
            x[i] = xi;
            grad[i] = (fi? - fx) / h;
        }
        Ok(grad)
    }
}

impl Minimizer for ProjectedGradient {
    fn minimize(
        &self,
        objective: &mut ObjectiveFn<'_>,
        x0: &[f64],
        problem: &Problem,
    ) -> Result<Minimum, Interrupted> {
        let projection_tolerance = self.step_tolerance * 1e-3;
        let mut x = x0.to_vec();
        problem.project(&mut x, self.projection_sweeps, projection_tolerance);
        let mut fx = objective(x.as_slice())?;
        let mut alpha = self.initial_step;

        for iteration in 1..=self.max_iterations {
            let grad = self.gradient(objective, &mut x, fx, problem)?;

            let mut step = alpha;
            let mut accepted = None;
            for _ in 0..self.max_backtracks {
                let mut candidate: Vec<f64> =
                    x.iter().zip(&grad).map(|(xi, gi)| xi - step * gi).collect();
                problem.project(&mut candidate, self.projection_sweeps, projection_tolerance);

                let moved = candidate
                    .iter()
                    .zip(&x)
                    .map(|(c, xi)| (c - xi).abs())
                    .fold(0.0, f64::max);
                if moved < self.step_tolerance {
                    break;
                }
                let slope: f64 = candidate
                    .iter()
                    .zip(&x)
                    .zip(&grad)
                    .map(|((c, xi), gi)| gi * (c - xi))
                    .sum();
                let fc = objective(candidate.as_slice())?;
                if fc <= fx + self.armijo * slope {
                    accepted = Some((candidate, fc, moved));
                    break;
                }
                step *= 0.5;
            }

            let Some((candidate, fc, moved)) = accepted else {
                debug!(iteration, objective = fx, "no descent step left");
                return Ok(Minimum {
                    x,
                    value: fx,
                    iterations: iteration,
                    converged: true,
                });
            };

            let improvement = fx - fc;
            x = candidate;
            fx = fc;
            alpha = step * 2.0;
            trace!(iteration, objective = fx, step, moved, "projected gradient step");

            if moved < self.step_tolerance
                || improvement.abs() <= self.objective_tolerance * (1.0 + fx.abs())
            {
                debug!(iteration, objective = fx, "projected gradient converged");
                return Ok(Minimum {
                    x,
                    value: fx,
                    iterations: iteration,
                    converged: true,
                });
            }
        }

        Ok(Minimum {
            x,
            value: fx,
            iterations: self.max_iterations,
            converged: false,
        })
    }
}

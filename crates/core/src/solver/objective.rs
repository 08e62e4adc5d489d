use crate::game::GameModel;

use super::minimize::Interrupted;
use super::values::ValueTable;
use super::CancellationToken;

/// `Σ_x V1(x, 0) + V2(x, 0)` as a function of the flat strategy vector.
///
/// The vector is laid out `[f[x][a] ...] ++ [y[i] ...]`, matching
/// [`crate::strategy::StrategyPair::to_vector`].
#[derive(Debug, Clone, Copy)]
pub struct Objective<'a> {
    model: &'a GameModel,
    discount: f64,
    horizon: usize,
}

impl<'a> Objective<'a> {
    #[must_use]
    pub fn new(model: &'a GameModel, discount: f64, horizon: usize) -> Self {
        Self {
            model,
            discount,
            horizon,
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.transmitter_len() + self.model.power_levels()
    }

    fn transmitter_len(&self) -> usize {
        self.model.state_space().len() * self.model.action_space().len()
    }

    /// Value tables for `x`, built fresh for this call.
    ///
    /// # Panics
    ///
    /// Panics if `x.len()` differs from [`Self::dimension`].
    #[must_use]
    pub fn tables(&self, x: &[f64]) -> ValueTable {
        assert_eq!(x.len(), self.dimension(), "strategy vector length");
        let (f, y) = x.split_at(self.transmitter_len());
        ValueTable::compute(self.model, f, y, self.discount, self.horizon)
    }

    #[must_use]
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        self.tables(x).total()
    }
}

/// [`Objective`] that aborts once its token is cancelled and remembers the
/// last vector it evaluated.
#[derive(Debug)]
pub struct CancellableObjective<'a> {
    objective: Objective<'a>,
    token: &'a CancellationToken,
    last_input: Option<Vec<f64>>,
    evaluations: u64,
}

impl<'a> CancellableObjective<'a> {
    #[must_use]
    pub fn new(objective: Objective<'a>, token: &'a CancellationToken) -> Self {
        Self {
            objective,
            token,
            last_input: None,
            evaluations: 0,
        }
    }

    /// # Errors
    ///
    /// Returns [`Interrupted`] if the token has been cancelled.
    pub fn call(&mut self, x: &[f64]) -> Result<f64, Interrupted> {
        if self.token.is_cancelled() {
            return Err(Interrupted);
        }
        match &mut self.last_input {
            Some(buf) => {
                buf.clear();
                buf.extend_from_slice(x);
            }
            None => self.last_input = Some(x.to_vec()),
        }
        self.evaluations += 1;
        Ok(self.objective.evaluate(x))
    }

    #[must_use]
    pub fn last_input(&self) -> Option<&[f64]> {
        self.last_input.as_deref()
    }

    #[must_use]
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }
}

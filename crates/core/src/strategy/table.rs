use std::borrow::Cow;

use rand::Rng;

use crate::error::GameError;
use crate::game::{Action, GameModel, State};

use super::{argmax_first, StrategyProvider, TransmitterStrategy};

/// Per-state action scores with epsilon-greedy selection.
///
/// With probability `epsilon` a uniformly random action is chosen,
/// otherwise the highest-scoring one. Ties go to the first maximum in
/// action-space order. With `epsilon = 1` the table is the uniform
/// strategy, which is how the solver seeds its search.
#[derive(Debug, Clone)]
pub struct StrategyTable {
    states: Vec<State>,
    actions: Vec<Action>,
    scores: Vec<Vec<f64>>,
    epsilon: f64,
}

impl StrategyTable {
    /// All-zero table over the model's states and actions.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidStrategy`] if `epsilon` is outside `[0, 1]`.
    pub fn new(model: &GameModel, epsilon: f64) -> Result<Self, GameError> {
        check_epsilon(epsilon)?;
        Ok(Self {
            states: model.state_space().to_vec(),
            actions: model.action_space().to_vec(),
            scores: vec![vec![0.0; model.action_space().len()]; model.state_space().len()],
            epsilon,
        })
    }

    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// # Errors
    ///
    /// Returns [`GameError::InvalidStrategy`] if `epsilon` is outside `[0, 1]`.
    pub fn set_epsilon(&mut self, epsilon: f64) -> Result<(), GameError> {
        check_epsilon(epsilon)?;
        self.epsilon = epsilon;
        Ok(())
    }

    fn position(&self, state: State, action: Action) -> Option<(usize, usize)> {
        let s = self.states.iter().position(|&x| x == state)?;
        let a = self.actions.iter().position(|&x| x == action)?;
        Some((s, a))
    }

    #[must_use]
    pub fn score(&self, state: State, action: Action) -> Option<f64> {
        self.position(state, action).map(|(s, a)| self.scores[s][a])
    }

    /// Set the score of one (state, action) pair. Returns `false` if the
    /// pair is not part of the table.
    pub fn set_score(&mut self, state: State, action: Action, score: f64) -> bool {
        match self.position(state, action) {
            Some((s, a)) => {
                self.scores[s][a] = score;
                true
            }
            None => false,
        }
    }

    /// Highest-scoring action in `state`, first one on ties.
    #[must_use]
    pub fn best_action(&self, state: State) -> Option<Action> {
        let s = self.states.iter().position(|&x| x == state)?;
        argmax_first(&self.scores[s]).map(|a| self.actions[a])
    }

    /// Epsilon-greedy draw for `state`.
    pub fn select_action<R: Rng>(&self, state: State, rng: &mut R) -> Option<Action> {
        if rng.random::<f64>() < self.epsilon {
            let idx = rng.random_range(0..self.actions.len());
            Some(self.actions[idx])
        } else {
            self.best_action(state)
        }
    }

    /// Probability of each action under epsilon-greedy selection.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn distribution(&self, state: State) -> Option<Vec<f64>> {
        let best = self.best_action(state)?;
        let explore = self.epsilon / self.actions.len() as f64;
        Some(
            self.actions
                .iter()
                .map(|&a| if a == best { 1.0 - self.epsilon + explore } else { explore })
                .collect(),
        )
    }

    /// Freeze the table into an explicit transmitter strategy.
    #[must_use]
    pub fn to_strategy(&self, model: &GameModel) -> TransmitterStrategy {
        let rows: Vec<Vec<f64>> = self
            .states
            .iter()
            .map(|&s| self.distribution(s).unwrap_or_default())
            .collect();
        TransmitterStrategy::from_fn(model, |state, action| {
            let s = self.states.iter().position(|&x| x == state);
            let a = self.actions.iter().position(|&x| x == action);
            match (s, a) {
                (Some(s), Some(a)) => rows[s].get(a).copied().unwrap_or(0.0),
                _ => 0.0,
            }
        })
    }
}

impl StrategyProvider for StrategyTable {
    fn distribution_for(&self, state: State) -> Option<Cow<'_, [f64]>> {
        self.distribution(state).map(Cow::Owned)
    }
}

fn check_epsilon(epsilon: f64) -> Result<(), GameError> {
    if (0.0..=1.0).contains(&epsilon) {
        Ok(())
    } else {
        Err(GameError::InvalidStrategy(format!(
            "epsilon must be in [0, 1], got {epsilon}"
        )))
    }
}

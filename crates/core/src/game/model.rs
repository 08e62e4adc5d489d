//! Markov game between a frequency-hopping transmitter and a jammer.
//!
//! The transition kernel `P(x' | x, a, p)`, the payoff `U(a, p, x')` and the
//! expected reward `r(x, a, p)` are evaluated once at construction and
//! stored in flat buffers, so every lookup afterwards is an index.

use crate::error::GameError;
use crate::params::Parameters;

use super::{Action, State};

/// Immutable game model derived from a [`Parameters`] set.
#[derive(Debug, Clone)]
pub struct GameModel {
    params: Parameters,
    states: Vec<State>,
    actions: Vec<Action>,
    power_levels: usize,
    /// `P(x' | x, a, p)`, laid out `[state][action][power][next]`.
    transitions: Vec<f64>,
    /// `U(a, p, x')`, laid out `[action][power][next]`.
    payoffs: Vec<f64>,
    /// `r(x, a, p)`, laid out `[state][action][power]`.
    rewards: Vec<f64>,
}

impl GameModel {
    /// Build the state/action spaces and precompute the kernel.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfiguration`] if the rate count does
    /// not match `m + 1`. A [`Parameters`] built through
    /// [`Parameters::new`] or deserialization already guarantees this, so
    /// the check only re-asserts that invariant.
    pub fn build(params: Parameters) -> Result<Self, GameError> {
        if params.rates().len() != params.m() + 1 {
            return Err(GameError::InvalidConfiguration(format!(
                "expected m == len(rates) - 1, got m = {} with {} rates",
                params.m(),
                params.rates().len()
            )));
        }

        let states: Vec<State> = std::iter::once(State::Unknown)
            .chain((1..=params.max_undetected()).map(State::Undetected))
            .collect();
        let actions: Vec<Action> = (0..params.rate_count())
            .map(Action::Stay)
            .chain((0..params.rate_count()).map(Action::Hop))
            .collect();
        let power_levels = params.power_level_count();

        let mut model = Self {
            params,
            states,
            actions,
            power_levels,
            transitions: Vec::new(),
            payoffs: Vec::new(),
            rewards: Vec::new(),
        };
        model.precompute();
        Ok(model)
    }

    fn precompute(&mut self) {
        let ns = self.states.len();
        let na = self.actions.len();
        let np = self.power_levels;

        let mut payoffs = Vec::with_capacity(na * np * ns);
        for &action in &self.actions {
            for power in 0..np {
                for &next in &self.states {
                    payoffs.push(self.compute_payoff(action, power, next));
                }
            }
        }
        self.payoffs = payoffs;

        let mut transitions = Vec::with_capacity(ns * na * np * ns);
        let mut rewards = Vec::with_capacity(ns * na * np);
        for &state in &self.states {
            for (a, &action) in self.actions.iter().enumerate() {
                for power in 0..np {
                    let row = self.compute_transition(state, action, power);
                    let payoff_row = &self.payoffs[(a * np + power) * ns..][..ns];
                    rewards.push(row.iter().zip(payoff_row).map(|(p, u)| p * u).sum());
                    transitions.extend(row);
                }
            }
        }
        self.transitions = transitions;
        self.rewards = rewards;
    }

    /// Next-state distribution for one `(state, action, power)` triple,
    /// aligned with [`Self::state_space`].
    #[allow(clippy::cast_precision_loss, clippy::match_same_arms)]
    fn compute_transition(&self, state: State, action: Action, power: usize) -> Vec<f64> {
        let params = &self.params;
        let k = params.k();
        let n = params.n();
        let mut probs = vec![0.0; self.states.len()];

        let (jammed, survive_to) = match (state, action) {
            (State::Unknown, Action::Hop(rate)) => {
                let jammed = if params.denies_rate(power, rate) {
                    n as f64 / k.saturating_sub(1).max(1) as f64
                } else {
                    0.0
                };
                (jammed, 1)
            }
            // Same formula as hopping away from the unknown state. Kept as a
            // separate rule until the modelling question is settled.
            (State::Undetected(_), Action::Hop(rate)) => {
                let jammed = if params.denies_rate(power, rate) {
                    n as f64 / k.saturating_sub(1).max(1) as f64
                } else {
                    0.0
                };
                (jammed, 1)
            }
            (_, Action::Stay(rate)) => {
                let x = state.consecutive();
                let p_discover = n as f64 / k.saturating_sub(n * x).max(1) as f64;
                let p_single_attack = (n * x) as f64 / k as f64;
                let sweeping = (x as f64) < k as f64 / n as f64;

                let jammed = if sweeping && params.denies_rate(power, rate) {
                    p_discover + p_single_attack
                } else if sweeping && params.attack_defeats_rate(power, rate) {
                    p_single_attack
                } else {
                    0.0
                };
                (jammed, (x + 1).min(params.max_undetected()))
            }
        };

        let jammed = jammed.clamp(0.0, 1.0);
        probs[0] = jammed;
        probs[survive_to] += 1.0 - jammed;
        probs
    }

    fn compute_payoff(&self, action: Action, power: usize, next: State) -> f64 {
        let params = &self.params;
        match action {
            Action::Hop(rate) if !next.is_unknown() => params.rate(rate) - params.hop_cost(),
            Action::Hop(rate) if params.denies_rate(power, rate) => {
                -params.jam_cost() - params.hop_cost()
            }
            Action::Hop(_) => 0.0,
            Action::Stay(_) if next.is_unknown() => -params.jam_cost(),
            Action::Stay(rate) => params.rate(rate),
        }
    }

    #[must_use]
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// States in canonical order: `j`, then `1..=ceil(k/n)`.
    #[must_use]
    pub fn state_space(&self) -> &[State] {
        &self.states
    }

    /// Actions in canonical order: every stay by rate, then every hop by rate.
    #[must_use]
    pub fn action_space(&self) -> &[Action] {
        &self.actions
    }

    /// Number of jammer power levels.
    #[must_use]
    pub fn power_levels(&self) -> usize {
        self.power_levels
    }

    /// Position of `state` in [`Self::state_space`].
    #[must_use]
    pub fn state_index(&self, state: State) -> Option<usize> {
        let idx = state.consecutive();
        match state {
            State::Undetected(0) => None,
            _ if idx < self.states.len() => Some(idx),
            _ => None,
        }
    }

    /// Position of `action` in [`Self::action_space`].
    #[must_use]
    pub fn action_index(&self, action: Action) -> Option<usize> {
        let rates = self.params.rate_count();
        match action {
            Action::Stay(r) if r < rates => Some(r),
            Action::Hop(r) if r < rates => Some(rates + r),
            _ => None,
        }
    }

    /// Next-state distribution by indices, aligned with the state space.
    #[must_use]
    pub fn transition_row(&self, state: usize, action: usize, power: usize) -> &[f64] {
        let ns = self.states.len();
        let base = ((state * self.actions.len() + action) * self.power_levels + power) * ns;
        &self.transitions[base..base + ns]
    }

    /// Expected reward by indices.
    #[must_use]
    pub fn reward_at(&self, state: usize, action: usize, power: usize) -> f64 {
        self.rewards[(state * self.actions.len() + action) * self.power_levels + power]
    }

    /// `Σ_x' values[x'] · P(x' | state, action, power)` by indices.
    #[must_use]
    pub fn expected_value_at(&self, state: usize, action: usize, power: usize, values: &[f64]) -> f64 {
        self.transition_row(state, action, power)
            .iter()
            .zip(values)
            .map(|(p, v)| p * v)
            .sum()
    }

    /// `P(· | state, action, power)` over [`Self::state_space`].
    ///
    /// # Panics
    ///
    /// Panics if `state` or `action` is not part of this model, or the
    /// power index is out of range.
    #[must_use]
    pub fn transition_probabilities(&self, state: State, action: Action, power: usize) -> &[f64] {
        self.transition_row(self.expect_state(state), self.expect_action(action), power)
    }

    /// Payoff `U(action, power, next)`.
    ///
    /// # Panics
    ///
    /// Panics if `action` or `next` is not part of this model.
    #[must_use]
    pub fn payoff(&self, action: Action, power: usize, next: State) -> f64 {
        let ns = self.states.len();
        let a = self.expect_action(action);
        self.payoffs[(a * self.power_levels + power) * ns + self.expect_state(next)]
    }

    /// Expected reward `r(state, action, power)`.
    ///
    /// # Panics
    ///
    /// Panics if `state` or `action` is not part of this model.
    #[must_use]
    pub fn reward(&self, state: State, action: Action, power: usize) -> f64 {
        self.reward_at(self.expect_state(state), self.expect_action(action), power)
    }

    /// `R(x)`: rewards for every (action, power level) pair.
    ///
    /// # Panics
    ///
    /// Panics if `state` is not part of this model.
    #[must_use]
    pub fn reward_matrix(&self, state: State) -> Vec<Vec<f64>> {
        let s = self.expect_state(state);
        (0..self.actions.len())
            .map(|a| (0..self.power_levels).map(|p| self.reward_at(s, a, p)).collect())
            .collect()
    }

    /// `Σ_x' value_fn(x') · P(x' | state, action, power)`.
    ///
    /// # Panics
    ///
    /// Panics if `state` or `action` is not part of this model.
    pub fn transition_value(
        &self,
        state: State,
        action: Action,
        power: usize,
        value_fn: impl Fn(State) -> f64,
    ) -> f64 {
        self.transition_probabilities(state, action, power)
            .iter()
            .zip(&self.states)
            .filter(|(p, _)| **p > 0.0)
            .map(|(p, &next)| p * value_fn(next))
            .sum()
    }

    /// `T(x)`: [`Self::transition_value`] for every (action, power level) pair.
    ///
    /// # Panics
    ///
    /// Panics if `state` is not part of this model.
    pub fn transition_matrix(&self, state: State, value_fn: impl Fn(State) -> f64) -> Vec<Vec<f64>> {
        let values: Vec<f64> = self.states.iter().map(|&s| value_fn(s)).collect();
        let s = self.expect_state(state);
        (0..self.actions.len())
            .map(|a| {
                (0..self.power_levels)
                    .map(|p| self.expected_value_at(s, a, p, &values))
                    .collect()
            })
            .collect()
    }

    fn expect_state(&self, state: State) -> usize {
        self.state_index(state)
            .unwrap_or_else(|| panic!("state {state} is not in the state space"))
    }

    fn expect_action(&self, action: Action) -> usize {
        self.action_index(action)
            .unwrap_or_else(|| panic!("action {action} is not in the action space"))
    }
}

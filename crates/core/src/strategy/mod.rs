//! Mixed strategies for both players.
//!
//! - [`TransmitterStrategy`] - one action simplex per state (`f`)
//! - [`JammerStrategy`] - one simplex over power levels (`y`)
//! - [`StrategyTable`] - exploration-based table that also acts as an `f`
//!
//! Anything that can hand out a per-state action distribution implements
//! [`StrategyProvider`], which is what validation and the simulation read.

mod table;

use std::borrow::Cow;

use crate::error::GameError;
use crate::game::{Action, GameModel, State};
use crate::params::Parameters;

pub use table::StrategyTable;

/// Source of per-state action distributions for the transmitter.
pub trait StrategyProvider {
    /// Action probabilities for `state`, aligned with the model's action
    /// space. `None` if the provider has no entry for the state.
    fn distribution_for(&self, state: State) -> Option<Cow<'_, [f64]>>;
}

/// Transmitter mixed strategy `f`: state -> action -> probability.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmitterStrategy {
    states: Vec<State>,
    actions: Vec<Action>,
    probs: Vec<Vec<f64>>,
}

impl TransmitterStrategy {
    /// Build a strategy by evaluating `prob` for every (state, action) pair.
    pub fn from_fn(model: &GameModel, mut prob: impl FnMut(State, Action) -> f64) -> Self {
        let probs = model
            .state_space()
            .iter()
            .map(|&s| model.action_space().iter().map(|&a| prob(s, a)).collect())
            .collect();
        Self {
            states: model.state_space().to_vec(),
            actions: model.action_space().to_vec(),
            probs,
        }
    }

    /// Every action equally likely in every state.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn uniform(model: &GameModel) -> Self {
        let p = 1.0 / model.action_space().len() as f64;
        Self::from_fn(model, |_, _| p)
    }

    /// Pure strategy that plays `choose(state)` with probability one.
    pub fn deterministic(model: &GameModel, mut choose: impl FnMut(State) -> Action) -> Self {
        Self::from_fn(model, |s, a| if choose(s) == a { 1.0 } else { 0.0 })
    }

    /// Stay on the channel at the top rate in every state.
    #[must_use]
    pub fn always_stay_top_rate(model: &GameModel) -> Self {
        let top = model.params().m();
        Self::deterministic(model, |_| Action::Stay(top))
    }

    /// Hop at the top rate while the jammer is lost, stay otherwise.
    #[must_use]
    pub fn hop_when_unknown(model: &GameModel) -> Self {
        let top = model.params().m();
        Self::deterministic(model, |s| {
            if s.is_unknown() {
                Action::Hop(top)
            } else {
                Action::Stay(top)
            }
        })
    }

    #[must_use]
    pub fn state_space(&self) -> &[State] {
        &self.states
    }

    #[must_use]
    pub fn action_space(&self) -> &[Action] {
        &self.actions
    }

    fn state_pos(&self, state: State) -> Option<usize> {
        self.states.iter().position(|&s| s == state)
    }

    /// Action probabilities for `state`.
    #[must_use]
    pub fn row(&self, state: State) -> Option<&[f64]> {
        self.state_pos(state).map(|i| self.probs[i].as_slice())
    }

    /// Probability of `action` in `state`.
    #[must_use]
    pub fn get(&self, state: State, action: Action) -> Option<f64> {
        let s = self.state_pos(state)?;
        let a = self.actions.iter().position(|&x| x == action)?;
        Some(self.probs[s][a])
    }

    /// Overwrite the probability of `action` in `state`. Returns `false`
    /// if the pair is not part of this strategy.
    pub fn set(&mut self, state: State, action: Action, prob: f64) -> bool {
        let Some(s) = self.state_pos(state) else {
            return false;
        };
        let Some(a) = self.actions.iter().position(|&x| x == action) else {
            return false;
        };
        self.probs[s][a] = prob;
        true
    }

    /// `(state, action, probability)` triples in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (State, Action, f64)> + '_ {
        self.states.iter().zip(&self.probs).flat_map(move |(&s, row)| {
            self.actions.iter().zip(row).map(move |(&a, &p)| (s, a, p))
        })
    }

    /// Most likely action in `state`, first one on ties.
    #[must_use]
    pub fn most_likely(&self, state: State) -> Option<Action> {
        let row = self.row(state)?;
        argmax_first(row).map(|i| self.actions[i])
    }
}

impl StrategyProvider for TransmitterStrategy {
    fn distribution_for(&self, state: State) -> Option<Cow<'_, [f64]>> {
        self.row(state).map(Cow::Borrowed)
    }
}

/// Jammer mixed strategy `y` over power levels.
#[derive(Debug, Clone, PartialEq)]
pub struct JammerStrategy(Vec<f64>);

impl JammerStrategy {
    #[must_use]
    pub fn new(probs: Vec<f64>) -> Self {
        Self(probs)
    }

    /// Every power level equally likely.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn uniform(levels: usize) -> Self {
        Self(vec![1.0 / levels as f64; levels])
    }

    /// Always transmit at `level`.
    #[must_use]
    pub fn fixed(levels: usize, level: usize) -> Self {
        let mut probs = vec![0.0; levels];
        probs[level] = 1.0;
        Self(probs)
    }

    #[must_use]
    pub fn probs(&self) -> &[f64] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Joint strategy `(f, y)`.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyPair {
    pub transmitter: TransmitterStrategy,
    pub jammer: JammerStrategy,
}

impl StrategyPair {
    /// Uniform transmitter and jammer strategies.
    #[must_use]
    pub fn uniform(model: &GameModel) -> Self {
        Self {
            transmitter: TransmitterStrategy::uniform(model),
            jammer: JammerStrategy::uniform(model.power_levels()),
        }
    }

    /// Flatten to `[f[s][a] for s, a] ++ [y[i] for i]`.
    #[must_use]
    pub fn to_vector(&self) -> Vec<f64> {
        self.transmitter
            .probs
            .iter()
            .flatten()
            .chain(&self.jammer.0)
            .copied()
            .collect()
    }

    /// Rebuild a pair from a flat vector laid out as [`Self::to_vector`].
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidStrategy`] if the vector length does not
    /// match the model's `|states| * |actions| + |power levels|`.
    pub fn from_vector(model: &GameModel, vector: &[f64]) -> Result<Self, GameError> {
        let na = model.action_space().len();
        let f_len = model.state_space().len() * na;
        let expected = f_len + model.power_levels();
        if vector.len() != expected {
            return Err(GameError::InvalidStrategy(format!(
                "expected a vector of {expected} entries, got {}",
                vector.len()
            )));
        }

        let transmitter = TransmitterStrategy {
            states: model.state_space().to_vec(),
            actions: model.action_space().to_vec(),
            probs: vector[..f_len].chunks(na).map(<[f64]>::to_vec).collect(),
        };
        let jammer = JammerStrategy(vector[f_len..].to_vec());
        Ok(Self { transmitter, jammer })
    }

    /// Round every probability to `digits` decimal places.
    #[must_use]
    pub fn rounded(&self, digits: u32) -> Self {
        let scale = 10f64.powi(i32::try_from(digits).unwrap_or(i32::MAX));
        let round = |p: f64| (p * scale).round() / scale;
        let mut out = self.clone();
        for row in &mut out.transmitter.probs {
            row.iter_mut().for_each(|p| *p = round(*p));
        }
        out.jammer.0.iter_mut().for_each(|p| *p = round(*p));
        out
    }

    /// Validate both halves against `model`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidStrategy`] on the first violated check.
    pub fn validate(&self, model: &GameModel, tolerance: f64) -> Result<(), GameError> {
        validate_transmitter(model, &self.transmitter, tolerance)?;
        validate_jammer(model.params(), self.jammer.probs(), tolerance)
    }
}

/// Check that `f` gives a probability simplex over the action space for
/// every state in the model.
///
/// # Errors
///
/// Returns [`GameError::InvalidStrategy`] naming the first offending state.
pub fn validate_transmitter(
    model: &GameModel,
    f: &impl StrategyProvider,
    tolerance: f64,
) -> Result<(), GameError> {
    let na = model.action_space().len();
    for &state in model.state_space() {
        let dist = f.distribution_for(state).ok_or_else(|| {
            GameError::InvalidStrategy(format!("transmitter strategy has no entry for state {state}"))
        })?;
        if dist.len() != na {
            return Err(GameError::InvalidStrategy(format!(
                "state {state}: expected {na} action probabilities, got {}",
                dist.len()
            )));
        }
        check_simplex(&dist, tolerance).map_err(|msg| {
            GameError::InvalidStrategy(format!("transmitter strategy for state {state}: {msg}"))
        })?;
    }
    Ok(())
}

/// Check that `y` is a probability simplex over the power levels that
/// respects the average-power budget.
///
/// # Errors
///
/// Returns [`GameError::InvalidStrategy`] describing the violation.
pub fn validate_jammer(params: &Parameters, y: &[f64], tolerance: f64) -> Result<(), GameError> {
    let levels = params.power_level_count();
    if y.len() != levels {
        return Err(GameError::InvalidStrategy(format!(
            "expected {levels} jammer probabilities, got {}",
            y.len()
        )));
    }
    check_simplex(y, tolerance)
        .map_err(|msg| GameError::InvalidStrategy(format!("jammer strategy: {msg}")))?;

    let power = params.expected_power(y);
    if power > params.p_avg() + tolerance {
        return Err(GameError::InvalidStrategy(format!(
            "jammer expected power {power:.6} exceeds p_avg = {}",
            params.p_avg()
        )));
    }
    Ok(())
}

fn check_simplex(probs: &[f64], tolerance: f64) -> Result<(), String> {
    if let Some((i, p)) = probs
        .iter()
        .enumerate()
        .find(|&(_, &p)| p.is_nan() || p < -tolerance || p > 1.0 + tolerance)
    {
        return Err(format!("probability {p} at position {i} is outside [0, 1]"));
    }
    let sum: f64 = probs.iter().sum();
    if (sum - 1.0).abs() > tolerance {
        return Err(format!("probabilities sum to {sum}"));
    }
    Ok(())
}

/// Index of the first maximum.
pub(crate) fn argmax_first(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::params::ParameterSpec;
    use test_macros::timed_test;

    const TOL: f64 = 1e-9;

    fn model() -> GameModel {
        GameModel::build(Parameters::default()).unwrap()
    }

    #[timed_test]
    fn uniform_pair_is_valid() {
        let model = model();
        let pair = StrategyPair::uniform(&model);
        pair.validate(&model, TOL).unwrap();
        for &state in model.state_space() {
            let sum: f64 = pair.transmitter.row(state).unwrap().iter().sum();
            assert!((sum - 1.0).abs() < TOL);
        }
    }

    #[timed_test]
    fn deterministic_strategies_pick_one_action() {
        let model = model();
        let f = TransmitterStrategy::hop_when_unknown(&model);
        assert_eq!(f.get(State::Unknown, Action::Hop(7)), Some(1.0));
        assert_eq!(f.get(State::Undetected(2), Action::Stay(7)), Some(1.0));
        assert_eq!(f.get(State::Undetected(2), Action::Hop(7)), Some(0.0));
        assert_eq!(f.most_likely(State::Unknown), Some(Action::Hop(7)));
        validate_transmitter(&model, &f, TOL).unwrap();
    }

    #[timed_test]
    fn transmitter_row_not_summing_to_one_fails() {
        let model = model();
        let mut f = TransmitterStrategy::always_stay_top_rate(&model);
        assert!(f.set(State::Undetected(3), Action::Stay(0), 0.5));
        let err = validate_transmitter(&model, &f, TOL).unwrap_err();
        assert!(matches!(err, GameError::InvalidStrategy(_)));
        assert!(err.to_string().contains("state 3"), "{err}");
    }

    #[timed_test]
    fn negative_probability_fails() {
        let model = model();
        let mut f = TransmitterStrategy::always_stay_top_rate(&model);
        f.set(State::Unknown, Action::Stay(7), 1.5);
        f.set(State::Unknown, Action::Stay(6), -0.5);
        assert!(validate_transmitter(&model, &f, TOL).is_err());
    }

    #[timed_test]
    fn strategy_for_other_model_fails() {
        let model = model();
        let wide = GameModel::build(
            Parameters::new(ParameterSpec { k: 6, ..ParameterSpec::default() }).unwrap(),
        )
        .unwrap();
        let f = TransmitterStrategy::uniform(&model);
        assert!(validate_transmitter(&wide, &f, TOL).is_err());
    }

    #[timed_test]
    fn jammer_over_budget_fails() {
        let params = Parameters::default();
        let levels = params.power_level_count();
        let y = JammerStrategy::fixed(levels, levels - 1);
        let err = validate_jammer(&params, y.probs(), TOL).unwrap_err();
        assert!(err.to_string().contains("exceeds p_avg"), "{err}");

        validate_jammer(&params, JammerStrategy::fixed(levels, 1).probs(), TOL).unwrap();
    }

    #[timed_test]
    fn jammer_wrong_length_fails() {
        let params = Parameters::default();
        assert!(validate_jammer(&params, &[0.5, 0.5], TOL).is_err());
    }

    #[timed_test]
    fn tolerance_absorbs_round_off() {
        let params = Parameters::default();
        let mut y = vec![0.0; params.power_level_count()];
        y[0] = 0.999_99;
        assert!(validate_jammer(&params, &y, 1e-9).is_err());
        validate_jammer(&params, &y, 1e-4).unwrap();
    }

    #[timed_test]
    fn vector_round_trip_reproduces_pair() {
        let model = model();
        let pair = StrategyPair {
            transmitter: TransmitterStrategy::hop_when_unknown(&model),
            jammer: JammerStrategy::fixed(model.power_levels(), 1),
        };
        let vector = pair.to_vector();
        assert_eq!(vector.len(), 5 * 16 + 9);
        let back = StrategyPair::from_vector(&model, &vector).unwrap();
        assert_eq!(back, pair);
    }

    #[timed_test]
    fn from_vector_rejects_wrong_length() {
        let model = model();
        let err = StrategyPair::from_vector(&model, &[0.0; 10]).unwrap_err();
        assert!(matches!(err, GameError::InvalidStrategy(_)));
    }

    #[timed_test]
    fn rounding_keeps_requested_digits() {
        let model = model();
        let mut pair = StrategyPair::uniform(&model);
        pair.jammer = JammerStrategy::new(vec![0.123_456_789; 9]);
        let rounded = pair.rounded(3);
        assert!(rounded.jammer.probs().iter().all(|&p| p == 0.123));
        assert_eq!(rounded.transmitter.get(State::Unknown, Action::Hop(0)), Some(0.063));
    }

    #[timed_test]
    fn argmax_prefers_first_maximum() {
        assert_eq!(argmax_first(&[0.1, 0.4, 0.4, 0.1]), Some(1));
        assert_eq!(argmax_first(&[]), None);
    }

    #[timed_test]
    fn iter_walks_states_then_actions() {
        let model = model();
        let f = TransmitterStrategy::uniform(&model);
        let triples: Vec<_> = f.iter().collect();
        assert_eq!(triples.len(), 80);
        assert_eq!(triples[0].0, State::Unknown);
        assert_eq!(triples[0].1, Action::Stay(0));
        assert_eq!(triples[16].0, State::Undetected(1));
    }
}

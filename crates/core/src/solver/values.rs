//! Depth-bounded lookahead values for both players.
//!
//! `V1(x, d)` is the transmitter's best value from state `x` at lookahead
//! depth `d` against the jammer mix `y`; `V2(x, d)` is the jammer's best
//! value against the transmitter mix `f[x]`. Both are filled bottom-up from
//! `d = horizon` to `0`, with every depth beyond the horizon worth zero.
//! One table lives for exactly one objective evaluation.

use crate::game::GameModel;

/// Which value function a table entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueFn {
    /// `V1`, maximised over transmitter actions.
    Transmitter,
    /// `V2`, maximised over jammer power levels.
    Jammer,
}

/// `(function, state, depth)` table for one candidate `(f, y)`.
#[derive(Debug, Clone)]
pub struct ValueTable {
    num_states: usize,
    horizon: usize,
    /// `V1`, laid out `[depth][state]` for `depth in 0..=horizon + 1`.
    transmitter: Vec<f64>,
    /// `V2`, same layout.
    jammer: Vec<f64>,
}

impl ValueTable {
    /// Fill both tables for the candidate strategies.
    ///
    /// `f` holds the transmitter probabilities state-major (one row of
    /// `|actions|` per state) and `y` the jammer probabilities.
    #[must_use]
    pub fn compute(model: &GameModel, f: &[f64], y: &[f64], discount: f64, horizon: usize) -> Self {
        let ns = model.state_space().len();
        let na = model.action_space().len();
        let np = model.power_levels();
        debug_assert_eq!(f.len(), ns * na);
        debug_assert_eq!(y.len(), np);

        let rows = horizon + 2;
        let mut transmitter = vec![0.0; rows * ns];
        let mut jammer = vec![0.0; rows * ns];
        let mut per_power = vec![0.0; np];

        for depth in (0..=horizon).rev() {
            let weight = discount.powi(i32::try_from(depth).unwrap_or(i32::MAX));
            let (head, tail) = transmitter.split_at_mut((depth + 1) * ns);
            let v1_now = &mut head[depth * ns..];
            let v1_next = &tail[..ns];
            let (head, tail) = jammer.split_at_mut((depth + 1) * ns);
            let v2_now = &mut head[depth * ns..];
            let v2_next = &tail[..ns];

            for s in 0..ns {
                v1_now[s] = (0..na)
                    .map(|a| {
                        (0..np)
                            .map(|p| {
                                y[p] * (model.reward_at(s, a, p)
                                    + weight * model.expected_value_at(s, a, p, v1_next))
                            })
                            .sum::<f64>()
                    })
                    .fold(f64::NEG_INFINITY, f64::max);

                let f_row = &f[s * na..(s + 1) * na];
                per_power.fill(0.0);
                for (a, &prob) in f_row.iter().enumerate() {
                    if prob == 0.0 {
                        continue;
                    }
                    for (p, total) in per_power.iter_mut().enumerate() {
                        *total -= prob
                            * (model.reward_at(s, a, p)
                                + weight * model.expected_value_at(s, a, p, v2_next));
                    }
                }
                v2_now[s] = per_power.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            }
        }

        Self {
            num_states: ns,
            horizon,
            transmitter,
            jammer,
        }
    }

    /// Value of `func` at `(state, depth)`; zero past the horizon.
    #[must_use]
    pub fn get(&self, func: ValueFn, state: usize, depth: usize) -> f64 {
        if depth > self.horizon {
            return 0.0;
        }
        let table = match func {
            ValueFn::Transmitter => &self.transmitter,
            ValueFn::Jammer => &self.jammer,
        };
        table[depth * self.num_states + state]
    }

    #[must_use]
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// `Σ_x V1(x, 0) + V2(x, 0)`.
    #[must_use]
    pub fn total(&self) -> f64 {
        (0..self.num_states)
            .map(|s| self.get(ValueFn::Transmitter, s, 0) + self.get(ValueFn::Jammer, s, 0))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::State;
    use crate::params::{ParameterSpec, Parameters};
    use crate::strategy::{JammerStrategy, StrategyPair, TransmitterStrategy};
    use test_macros::timed_test;

    const DELTA: f64 = 0.9;

    fn model() -> GameModel {
        GameModel::build(Parameters::default()).unwrap()
    }

    fn split(pair: &StrategyPair, model: &GameModel) -> (Vec<f64>, Vec<f64>) {
        let v = pair.to_vector();
        let f_len = model.state_space().len() * model.action_space().len();
        (v[..f_len].to_vec(), v[f_len..].to_vec())
    }

    /// Plain recursive V1 through the model's public contract.
    fn v1_recursive(model: &GameModel, y: &[f64], state: State, depth: usize, horizon: usize) -> f64 {
        if depth > horizon {
            return 0.0;
        }
        let weight = DELTA.powi(depth as i32);
        model
            .action_space()
            .iter()
            .map(|&action| {
                (0..model.power_levels())
                    .map(|p| {
                        let lookahead = model.transition_value(state, action, p, |next| {
                            v1_recursive(model, y, next, depth + 1, horizon)
                        });
                        y[p] * (model.reward(state, action, p) + weight * lookahead)
                    })
                    .sum::<f64>()
            })
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Plain recursive V2 through the model's public contract.
    fn v2_recursive(
        model: &GameModel,
        f: &TransmitterStrategy,
        state: State,
        depth: usize,
        horizon: usize,
    ) -> f64 {
        if depth > horizon {
            return 0.0;
        }
        let weight = DELTA.powi(depth as i32);
        let row = f.row(state).unwrap();
        (0..model.power_levels())
            .map(|p| {
                model
                    .action_space()
                    .iter()
                    .zip(row)
                    .map(|(&action, &prob)| {
                        let lookahead = model.transition_value(state, action, p, |next| {
                            v2_recursive(model, f, next, depth + 1, horizon)
                        });
                        -prob * (model.reward(state, action, p) + weight * lookahead)
                    })
                    .sum::<f64>()
            })
            .fold(f64::NEG_INFINITY, f64::max)
    }

    #[timed_test]
    fn depth_zero_horizon_is_one_step_best_response() {
        let model = model();
        let pair = StrategyPair::uniform(&model);
        let (f, y) = split(&pair, &model);
        let table = ValueTable::compute(&model, &f, &y, DELTA, 0);

        for (s, &state) in model.state_space().iter().enumerate() {
            let expected = model
                .reward_matrix(state)
                .iter()
                .map(|row| row.iter().zip(&y).map(|(r, p)| r * p).sum::<f64>())
                .fold(f64::NEG_INFINITY, f64::max);
            assert!((table.get(ValueFn::Transmitter, s, 0) - expected).abs() < 1e-9);
        }
    }

    #[timed_test]
    fn values_past_horizon_are_zero() {
        let model = model();
        let (f, y) = split(&StrategyPair::uniform(&model), &model);
        let table = ValueTable::compute(&model, &f, &y, DELTA, 3);
        assert_eq!(table.horizon(), 3);
        assert_eq!(table.get(ValueFn::Transmitter, 0, 4), 0.0);
        assert_eq!(table.get(ValueFn::Jammer, 2, 10), 0.0);
    }

    #[timed_test(10)]
    fn table_matches_plain_recursion() {
        let params = Parameters::new(ParameterSpec {
            k: 2,
            ..ParameterSpec::with_rates(vec![6.0, 54.0])
        })
        .unwrap();
        let model = GameModel::build(params).unwrap();
        let pair = StrategyPair {
            transmitter: TransmitterStrategy::hop_when_unknown(&model),
            jammer: JammerStrategy::new(vec![0.5, 0.3, 0.2]),
        };
        let (f, y) = split(&pair, &model);
        let horizon = 2;
        let table = ValueTable::compute(&model, &f, &y, DELTA, horizon);

        for (s, &state) in model.state_space().iter().enumerate() {
            for depth in 0..=horizon {
                let v1 = v1_recursive(&model, &y, state, depth, horizon);
                let v2 = v2_recursive(&model, &pair.transmitter, state, depth, horizon);
                assert!(
                    (table.get(ValueFn::Transmitter, s, depth) - v1).abs() < 1e-9,
                    "V1({state}, {depth})"
                );
                assert!(
                    (table.get(ValueFn::Jammer, s, depth) - v2).abs() < 1e-9,
                    "V2({state}, {depth})"
                );
            }
        }
    }

    #[timed_test]
    fn total_sums_both_players_at_root() {
        let model = model();
        let (f, y) = split(&StrategyPair::uniform(&model), &model);
        let table = ValueTable::compute(&model, &f, &y, DELTA, 2);
        let expected: f64 = (0..model.state_space().len())
            .map(|s| table.get(ValueFn::Transmitter, s, 0) + table.get(ValueFn::Jammer, s, 0))
            .sum();
        assert!((table.total() - expected).abs() < 1e-12);
    }
}

//! Monte Carlo replay of the repeated game under a fixed strategy pair.
//!
//! One [`Simulation`] plays `t` strictly sequential turns: the jammer draws
//! a power level, sweeps or tracks channels and reacts to overheard
//! acknowledgements, while the transmitter follows its pre-shared hop
//! pattern and draws actions from `f`. Independent runs are spread over
//! rayon workers by [`run_trials`].

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GameError;
use crate::game::{Action, GameModel, State};
use crate::strategy::{validate_jammer, validate_transmitter, StrategyProvider};

/// Simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Slack allowed when validating strategies, absorbs solver rounding.
    pub tolerance: f64,
    /// Fixed seed; every run of a seeded simulation replays the same game.
    pub seed: Option<u64>,
    /// Number of independent runs in [`run_trials`].
    pub trials: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-4,
            seed: None,
            trials: 100,
        }
    }
}

/// Outcome of one full run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Cumulative reward divided by `t`.
    pub average_reward: f64,
    /// Fraction of turns whose message got through.
    pub success_rate: f64,
}

/// What happened during one turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Turn {
    pub power: usize,
    pub jammed: bool,
    /// The jammer was listening on the transmitter's channel.
    pub overheard: bool,
    /// Action drawn for the next turn.
    pub action: Action,
    /// Markov state after the action.
    pub state: State,
}

#[derive(Debug, Clone)]
struct RunState {
    state: State,
    reward: f64,
    delivered: usize,
    hop_sequence: Vec<usize>,
    hop_cursor: usize,
    sweep: Vec<Vec<usize>>,
    sweep_cursor: usize,
    channel: usize,
    rate: usize,
    /// Channel under single-channel attack, if any.
    attack: Option<usize>,
}

/// Turn-by-turn engine for one strategy pair.
#[derive(Debug, Clone)]
pub struct Simulation<'a> {
    model: &'a GameModel,
    /// `f` rows aligned with the model's state space.
    transmitter: Vec<Vec<f64>>,
    jammer: Vec<f64>,
    config: SimulationConfig,
    rng: StdRng,
    run: RunState,
}

impl<'a> Simulation<'a> {
    /// Validate `(f, y)` and prepare a fresh run.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidStrategy`] if `f` is not a simplex for
    /// every state or `y` is not a simplex within the power budget.
    pub fn new(
        model: &'a GameModel,
        f: &impl StrategyProvider,
        y: &[f64],
        config: SimulationConfig,
    ) -> Result<Self, GameError> {
        validate_transmitter(model, f, config.tolerance)?;
        validate_jammer(model.params(), y, config.tolerance)?;

        let transmitter = model
            .state_space()
            .iter()
            .map(|&state| {
                f.distribution_for(state)
                    .map(std::borrow::Cow::into_owned)
                    .ok_or_else(|| {
                        GameError::InvalidStrategy(format!("no distribution for state {state}"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut sim = Self {
            model,
            transmitter,
            jammer: y.to_vec(),
            config,
            rng,
            run: RunState {
                state: State::Unknown,
                reward: 0.0,
                delivered: 0,
                hop_sequence: Vec::new(),
                hop_cursor: 0,
                sweep: Vec::new(),
                sweep_cursor: 0,
                channel: 0,
                rate: 0,
                attack: None,
            },
        };
        sim.reset();
        Ok(sim)
    }

    /// Copy of this simulation reseeded with `seed`.
    #[must_use]
    pub fn with_seed(&self, seed: u64) -> Self {
        let mut sim = self.clone();
        sim.config.seed = Some(seed);
        sim.reset();
        sim
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.run.state
    }

    #[must_use]
    pub fn channel(&self) -> usize {
        self.run.channel
    }

    #[must_use]
    pub fn rate_index(&self) -> usize {
        self.run.rate
    }

    #[must_use]
    pub fn attack_channel(&self) -> Option<usize> {
        self.run.attack
    }

    #[must_use]
    pub fn cumulative_reward(&self) -> f64 {
        self.run.reward
    }

    /// Start a new run: unknown state, top rate, fresh hop and sweep
    /// sequences. A seeded simulation restarts its RNG as well.
    pub fn reset(&mut self) {
        if let Some(seed) = self.config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        let params = self.model.params();
        let hop_sequence = hop_sequence(params.k(), params.t(), &mut self.rng);
        let sweep = sweep_groups(params.k(), params.n(), &mut self.rng);
        self.run = RunState {
            state: State::Unknown,
            reward: 0.0,
            delivered: 0,
            channel: hop_sequence[0],
            hop_sequence,
            hop_cursor: 0,
            sweep,
            sweep_cursor: 0,
            rate: params.m(),
            attack: None,
        };
    }

    /// Play one turn.
    pub fn step(&mut self) -> Turn {
        let params = self.model.params();
        let run = &mut self.run;

        let power = sample_index(&self.jammer, &mut self.rng);
        let channel = run.channel;
        let rate = run.rate;

        let overheard = match run.attack {
            Some(focus) => focus == channel,
            None => run.sweep[run.sweep_cursor].contains(&channel),
        };
        let jammed = overheard
            && (params.denies_rate(power, rate)
                || (run.attack.is_some() && params.attack_defeats_rate(power, rate)));

        if jammed {
            run.reward -= params.jam_cost();
        } else {
            run.reward += params.rate(rate);
            run.delivered += 1;
        }

        if overheard {
            if jammed {
                run.sweep = sweep_groups(params.k(), params.n(), &mut self.rng);
                run.sweep_cursor = 0;
                run.attack = None;
            } else {
                run.attack = Some(channel);
            }
        } else {
            run.attack = None;
            run.sweep_cursor += 1;
            if run.sweep_cursor >= run.sweep.len() {
                run.sweep = sweep_groups(params.k(), params.n(), &mut self.rng);
                run.sweep_cursor = 0;
            }
        }

        run.state = match (run.state, jammed) {
            (_, true) => State::Unknown,
            (State::Unknown, false) => State::Undetected(1),
            (State::Undetected(x), false) => State::Undetected((x + 1).min(params.max_undetected())),
        };

        let s = self
            .model
            .state_index(run.state)
            .unwrap_or_default();
        let action = self.model.action_space()[sample_index(&self.transmitter[s], &mut self.rng)];
        if action.is_hop() {
            run.state = State::Unknown;
            run.hop_cursor = (run.hop_cursor + 1) % run.hop_sequence.len();
            run.channel = run.hop_sequence[run.hop_cursor];
            run.reward -= params.hop_cost();
        }
        run.rate = action.rate_index();

        Turn {
            power,
            jammed,
            overheard,
            action,
            state: run.state,
        }
    }

    /// Play a full run of `t` turns, then reset for the next one.
    #[allow(clippy::cast_precision_loss)]
    pub fn run(&mut self) -> RunResult {
        let t = self.model.params().t();
        for _ in 0..t {
            self.step();
        }
        let result = RunResult {
            average_reward: self.run.reward / t as f64,
            success_rate: self.run.delivered as f64 / t as f64,
        };
        debug!(
            average_reward = result.average_reward,
            success_rate = result.success_rate,
            "simulation run finished"
        );
        self.reset();
        result
    }
}

/// Per-run results of a batch and their means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSummary {
    pub runs: Vec<RunResult>,
    pub mean_reward: f64,
    pub mean_success_rate: f64,
}

impl TrialSummary {
    #[allow(clippy::cast_precision_loss)]
    fn from_runs(runs: Vec<RunResult>) -> Self {
        let count = runs.len().max(1) as f64;
        let mean_reward = runs.iter().map(|r| r.average_reward).sum::<f64>() / count;
        let mean_success_rate = runs.iter().map(|r| r.success_rate).sum::<f64>() / count;
        Self {
            runs,
            mean_reward,
            mean_success_rate,
        }
    }
}

/// Run `config.trials` independent simulations in parallel.
///
/// Trial `i` is seeded with `base.wrapping_add(i)`, where `base` is the
/// configured seed or a random one, and results keep trial order.
/// `on_trial` is called from worker threads as each run finishes.
///
/// # Errors
///
/// Returns [`GameError::InvalidStrategy`] if the strategies fail validation.
pub fn run_trials(
    model: &GameModel,
    f: &impl StrategyProvider,
    y: &[f64],
    config: &SimulationConfig,
    on_trial: impl Fn(&RunResult) + Sync,
) -> Result<TrialSummary, GameError> {
    let base = config.seed.unwrap_or_else(rand::random);
    let prototype = Simulation::new(model, f, y, config.clone())?;

    let runs: Vec<RunResult> = (0..config.trials)
        .into_par_iter()
        .map(|i| {
            let mut sim = prototype.with_seed(base.wrapping_add(i as u64));
            let result = sim.run();
            on_trial(&result);
            result
        })
        .collect();

    Ok(TrialSummary::from_runs(runs))
}

/// Draw an index from a probability vector.
fn sample_index<R: Rng>(probs: &[f64], rng: &mut R) -> usize {
    let r: f64 = rng.random();
    let mut cumulative = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumulative += p;
        if r < cumulative {
            return i;
        }
    }
    // Round-off left `r` past the total; take the last supported entry.
    probs.iter().rposition(|&p| p > 0.0).unwrap_or(0)
}

/// Pre-shared hop pattern of length `t`; consecutive entries differ when
/// there is more than one channel.
fn hop_sequence<R: Rng>(k: usize, t: usize, rng: &mut R) -> Vec<usize> {
    let mut seq = Vec::with_capacity(t);
    let mut prev = rng.random_range(0..k);
    seq.push(prev);
    for _ in 1..t {
        let next = if k > 1 {
            let c = rng.random_range(0..k - 1);
            if c >= prev {
                c + 1
            } else {
                c
            }
        } else {
            0
        };
        seq.push(next);
        prev = next;
    }
    seq
}

/// Random permutation of the channels cut into groups of `n`.
fn sweep_groups<R: Rng>(k: usize, n: usize, rng: &mut R) -> Vec<Vec<usize>> {
    let mut channels: Vec<usize> = (0..k).collect();
    channels.shuffle(rng);
    channels.chunks(n).map(<[usize]>::to_vec).collect()
}

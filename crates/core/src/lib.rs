#![deny(clippy::all)]
#![warn(clippy::pedantic)]

//! Frequency-hopping transmitter vs. power-budgeted jammer.
//!
//! A repeated stochastic game over `k` wireless channels: the transmitter
//! picks a rate and whether to hop each turn, the jammer picks a power level
//! under an average-power budget. The crate builds the Markov game, searches
//! for an approximate equilibrium pair of mixed strategies, and replays
//! strategy pairs turn by turn to measure them.
//!
//! # Modules
//!
//! - `params` - Parameter set with derived SINR limits and jammer powers
//! - `game` - States, actions, transition kernel and rewards
//! - `strategy` - Transmitter/jammer strategies and the epsilon-greedy table
//! - `solver` - Finite-horizon value functions inside a constrained minimiser
//! - `simulation` - Monte Carlo replay of the repeated game
//! - `experiment` - Sweeps over rate lists and channel counts
//! - `config` - YAML experiment configuration
//! - `error` - Error types

pub mod config;
pub mod error;
pub mod experiment;
pub mod game;
pub mod params;
pub mod simulation;
pub mod solver;
pub mod strategy;

pub use config::{ConfigError, ExperimentConfig};
pub use error::GameError;
pub use experiment::{run_sweep, SweepConfig, SweepOutcome, SweepRow, SweepVariant};
pub use game::{Action, GameModel, State};
pub use params::{ParameterSpec, Parameters, SinrComparison};
pub use simulation::{run_trials, RunResult, Simulation, SimulationConfig, TrialSummary};
pub use solver::{
    CancellationToken, Equilibrium, EquilibriumSolver, SolveHandle, SolveStatus, SolverConfig,
};
pub use strategy::{
    JammerStrategy, StrategyPair, StrategyProvider, StrategyTable, TransmitterStrategy,
};

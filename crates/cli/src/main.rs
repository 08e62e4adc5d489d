mod report;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use hopjam_core::{
    run_sweep, run_trials, CancellationToken, Equilibrium, EquilibriumSolver, ExperimentConfig,
    GameModel, JammerStrategy, SolveStatus, StrategyProvider, TransmitterStrategy, TrialSummary,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hopjam")]
#[command(about = "Frequency-hopping vs. jammer game: solve for equilibria and simulate play")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Overrides shared by every subcommand.
#[derive(Debug, clap::Args)]
struct Common {
    /// YAML experiment config (parameters / solver / simulation sections)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Repeated-game length in turns (overrides parameters.t)
    #[arg(long)]
    turns: Option<usize>,
    /// Print machine-readable JSON instead of tables
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
enum Commands {
    /// Solve for an approximate equilibrium. Ctrl-C stops the search and
    /// keeps the last evaluated strategies.
    Solve {
        #[command(flatten)]
        common: Common,
        /// Deepest lookahead depth (overrides the cutoff-derived horizon)
        #[arg(long)]
        horizon: Option<usize>,
        /// Iteration budget for the minimiser
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Simulate the resulting strategy pair afterwards
        #[arg(long)]
        simulate: bool,
        /// Number of simulation runs (overrides simulation.trials)
        #[arg(long)]
        trials: Option<usize>,
        /// Base seed for the simulation runs
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Simulate a built-in strategy pair
    Simulate {
        #[command(flatten)]
        common: Common,
        #[arg(long, value_enum, default_value = "uniform")]
        transmitter: TransmitterChoice,
        #[arg(long, value_enum, default_value = "uniform")]
        jammer: JammerChoice,
        /// Power level for `--jammer level`
        #[arg(long, default_value_t = 0)]
        jammer_level: usize,
        /// Number of simulation runs (overrides simulation.trials)
        #[arg(long)]
        trials: Option<usize>,
        /// Base seed for the simulation runs
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Solve and simulate every (rate list, k) cell of the sweep section,
    /// one summary row per cell. Ctrl-C stops after the current cell.
    Sweep {
        #[command(flatten)]
        common: Common,
        /// Channel counts to sweep, comma separated (overrides sweep.channels)
        #[arg(long, value_delimiter = ',')]
        channels: Vec<usize>,
        /// Number of simulation runs per cell (overrides simulation.trials)
        #[arg(long)]
        trials: Option<usize>,
        /// Base seed for the simulation runs
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the parameter set and its derived constants
    Params {
        #[command(flatten)]
        common: Common,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransmitterChoice {
    Uniform,
    /// Stay at the top rate in every state
    StayTop,
    /// Hop at the top rate when detected, stay otherwise
    HopWhenUnknown,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum JammerChoice {
    Uniform,
    /// Never transmit
    Idle,
    /// Always use `--jammer-level`
    Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            common,
            horizon,
            max_iterations,
            simulate,
            trials,
            seed,
        } => {
            let mut config = load_config(&common)?;
            if horizon.is_some() {
                config.solver.horizon = horizon;
            }
            if let Some(n) = max_iterations {
                config.solver.max_iterations = n;
            }
            apply_simulation_overrides(&mut config, trials, seed);
            run_solve(&config, simulate, common.json).await?;
        }
        Commands::Simulate {
            common,
            transmitter,
            jammer,
            jammer_level,
            trials,
            seed,
        } => {
            let mut config = load_config(&common)?;
            apply_simulation_overrides(&mut config, trials, seed);
            run_simulate(&config, transmitter, jammer, jammer_level, common.json)?;
        }
        Commands::Sweep {
            common,
            channels,
            trials,
            seed,
        } => {
            let mut config = load_config(&common)?;
            if !channels.is_empty() {
                config.sweep.channels = channels;
            }
            apply_simulation_overrides(&mut config, trials, seed);
            run_sweep_command(config, common.json).await?;
        }
        Commands::Params { common } => {
            let config = load_config(&common)?;
            if common.json {
                println!("{}", serde_json::to_string_pretty(&config.parameters)?);
            } else {
                println!("{}", config.parameters);
            }
        }
    }

    Ok(())
}

fn load_config(common: &Common) -> Result<ExperimentConfig, Box<dyn Error>> {
    let mut config = match &common.config {
        Some(path) => load_from(path)?,
        None => ExperimentConfig::default(),
    };
    if let Some(t) = common.turns {
        config.parameters = config.parameters.with_horizon(t)?;
    }
    Ok(config)
}

fn load_from(path: &Path) -> Result<ExperimentConfig, Box<dyn Error>> {
    let config = ExperimentConfig::load(path)?;
    info!(path = %path.display(), name = config.name.as_deref().unwrap_or("-"), "loaded config");
    Ok(config)
}

fn apply_simulation_overrides(config: &mut ExperimentConfig, trials: Option<usize>, seed: Option<u64>) {
    if let Some(n) = trials {
        config.simulation.trials = n.max(1);
    }
    if seed.is_some() {
        config.simulation.seed = seed;
    }
}

/// Solve on a worker thread while watching for Ctrl-C.
async fn run_solve(
    config: &ExperimentConfig,
    simulate: bool,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let model = Arc::new(GameModel::build(config.parameters.clone())?);
    let solver = EquilibriumSolver::new(Arc::clone(&model), config.solver.clone());
    let handle = solver.spawn(CancellationToken::new());
    let token = handle.token().clone();

    let start = Instant::now();
    let mut join = tokio::task::spawn_blocking(move || handle.join());
    let result = tokio::select! {
        res = &mut join => res?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            warn!("interrupt received, stopping solver at next evaluation");
            token.cancel();
            join.await?
        }
    };
    let equilibrium = result?;
    info!(elapsed = ?start.elapsed(), status = ?equilibrium.status, "solve finished");

    let summary = if simulate {
        Some(simulate_pair(
            &model,
            &equilibrium.strategies.transmitter,
            equilibrium.strategies.jammer.probs(),
            config,
        )?)
    } else {
        None
    };

    if json {
        let value = report::equilibrium_json(&model, &equilibrium, summary.as_ref());
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_equilibrium(&model, &equilibrium);
        if let Some(summary) = &summary {
            report::print_summary(summary);
        }
    }
    Ok(())
}

/// Run the sweep on a blocking worker; Ctrl-C lets the current cell finish.
async fn run_sweep_command(config: ExperimentConfig, json: bool) -> Result<(), Box<dyn Error>> {
    let token = CancellationToken::new();
    let pb = ProgressBar::new(config.sweep.cells() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Sweeping [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let worker_token = token.clone();
    let worker_pb = pb.clone();
    let mut join = tokio::task::spawn_blocking(move || {
        run_sweep(&config, &worker_token, |row| {
            worker_pb.set_message(format!("{} k={}", row.variant, row.k));
            worker_pb.inc(1);
        })
    });
    let rows = tokio::select! {
        res = &mut join => res?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            warn!("interrupt received, stopping sweep after the current cell");
            token.cancel();
            join.await?
        }
    };
    pb.finish_and_clear();
    info!(cells = rows.len(), elapsed = ?start.elapsed(), "sweep finished");

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        report::print_sweep(&rows);
    }
    Ok(())
}

fn print_equilibrium(model: &GameModel, equilibrium: &Equilibrium) {
    let status = match equilibrium.status {
        SolveStatus::Converged => "converged",
        SolveStatus::Unconverged => "iteration budget exhausted",
        SolveStatus::Cancelled => "cancelled",
    };
    println!(
        "Equilibrium ({status}): objective {:.4}, {} iterations, {} evaluations",
        equilibrium.objective, equilibrium.iterations, equilibrium.evaluations
    );
    report::print_strategies(model, &equilibrium.strategies);
}

fn run_simulate(
    config: &ExperimentConfig,
    transmitter: TransmitterChoice,
    jammer: JammerChoice,
    jammer_level: usize,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let model = GameModel::build(config.parameters.clone())?;
    let f = match transmitter {
        TransmitterChoice::Uniform => TransmitterStrategy::uniform(&model),
        TransmitterChoice::StayTop => TransmitterStrategy::always_stay_top_rate(&model),
        TransmitterChoice::HopWhenUnknown => TransmitterStrategy::hop_when_unknown(&model),
    };
    let levels = model.power_levels();
    let y = match jammer {
        JammerChoice::Uniform => JammerStrategy::uniform(levels),
        JammerChoice::Idle => JammerStrategy::fixed(levels, 0),
        JammerChoice::Level => {
            if jammer_level >= levels {
                return Err(format!(
                    "jammer level {jammer_level} out of range, model has {levels} levels"
                )
                .into());
            }
            JammerStrategy::fixed(levels, jammer_level)
        }
    };

    let summary = simulate_pair(&model, &f, y.probs(), config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        report::print_summary(&summary);
    }
    Ok(())
}

fn simulate_pair(
    model: &GameModel,
    f: &impl StrategyProvider,
    y: &[f64],
    config: &ExperimentConfig,
) -> Result<TrialSummary, Box<dyn Error>> {
    let trials = config.simulation.trials;
    let pb = ProgressBar::new(trials as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Simulating [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    let start = Instant::now();
    let summary = run_trials(model, f, y, &config.simulation, |_| pb.inc(1))?;
    pb.finish_and_clear();
    info!(
        trials,
        turns = model.params().t(),
        elapsed = ?start.elapsed(),
        mean_reward = summary.mean_reward,
        "simulation finished"
    );
    Ok(summary)
}

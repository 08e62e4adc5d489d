//! Human- and machine-readable output for solve/simulate results.

use hopjam_core::{Equilibrium, GameModel, StrategyPair, SweepOutcome, SweepRow, TrialSummary};
use serde_json::{json, Map, Value};

/// `f` as a state-by-action table, then `y` with each level's power.
pub fn print_strategies(model: &GameModel, strategies: &StrategyPair) {
    println!("\nTransmitter strategy f(state, action):");
    print!("{:>6}", "state");
    for action in model.action_space() {
        print!(" {:>7}", action.to_string());
    }
    println!();
    for &state in model.state_space() {
        print!("{:>6}", state.to_string());
        for p in strategies.transmitter.row(state).unwrap_or_default() {
            print!(" {p:>7.4}");
        }
        println!();
    }

    let params = model.params();
    println!("\nJammer strategy y(level):");
    println!("{:>6} {:>9} {:>8}", "level", "p_jam", "prob");
    for (level, (p, power)) in strategies.jammer.probs().iter().zip(params.p_jam()).enumerate() {
        println!("{level:>6} {power:>9.4} {p:>8.4}");
    }
    println!(
        "Expected jammer power {:.4} (budget {})",
        params.expected_power(strategies.jammer.probs()),
        params.p_avg()
    );
}

pub fn print_summary(summary: &TrialSummary) {
    let n = summary.runs.len();
    let (lo, hi) = summary
        .runs
        .iter()
        .map(|r| r.average_reward)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| (lo.min(r), hi.max(r)));
    println!("\nSimulation over {n} runs:");
    println!("  mean average reward  {:>10.4}", summary.mean_reward);
    println!("  mean success rate    {:>10.4}", summary.mean_success_rate);
    if n > 0 {
        println!("  reward range         [{lo:.4}, {hi:.4}]");
    }
}

/// One line per sweep cell: solve status, objective and simulated means.
pub fn print_sweep(rows: &[SweepRow]) {
    println!(
        "\n{:<20} {:>3} {:>12} {:>12} {:>10} {:>9}",
        "variant", "k", "status", "objective", "reward", "success"
    );
    for row in rows {
        match &row.outcome {
            SweepOutcome::Solved {
                status,
                objective,
                simulation,
            } => println!(
                "{:<20} {:>3} {:>12} {objective:>12.4} {:>10.4} {:>9.4}",
                row.variant,
                row.k,
                format!("{status:?}").to_lowercase(),
                simulation.mean_reward,
                simulation.mean_success_rate
            ),
            SweepOutcome::Skipped { reason } => {
                println!("{:<20} {:>3} {:>12} {reason}", row.variant, row.k, "skipped");
            }
        }
    }
}

pub fn equilibrium_json(
    model: &GameModel,
    equilibrium: &Equilibrium,
    summary: Option<&TrialSummary>,
) -> Value {
    let mut transmitter = Map::new();
    for &state in model.state_space() {
        let row = equilibrium
            .strategies
            .transmitter
            .row(state)
            .unwrap_or_default();
        let actions: Map<String, Value> = model
            .action_space()
            .iter()
            .zip(row)
            .map(|(action, p)| (action.to_string(), json!(p)))
            .collect();
        transmitter.insert(state.to_string(), Value::Object(actions));
    }

    json!({
        "status": equilibrium.status,
        "objective": equilibrium.objective,
        "iterations": equilibrium.iterations,
        "evaluations": equilibrium.evaluations,
        "transmitter": transmitter,
        "jammer": equilibrium.strategies.jammer.probs(),
        "expected_power": model.params().expected_power(equilibrium.strategies.jammer.probs()),
        "simulation": summary,
    })
}

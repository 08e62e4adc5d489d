use thiserror::Error;

/// Errors raised by model construction, strategy validation and the solver.
///
/// Running out of iterations or being cancelled are not errors; see
/// [`SolveStatus`](crate::solver::SolveStatus).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GameError {
    /// A parameter set invariant was violated.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A strategy failed a simplex or power-budget check.
    #[error("invalid strategy: {0}")]
    InvalidStrategy(String),

    /// The optimizer's starting point or constraint set is inconsistent.
    #[error("infeasible start: {0}")]
    InfeasibleStart(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_macros::timed_test;

    #[timed_test]
    fn invalid_configuration_displays_message() {
        let err = GameError::InvalidConfiguration("m must equal len(rates) - 1".to_string());
        let msg = err.to_string();
        assert!(msg.contains("invalid configuration"));
        assert!(msg.contains("len(rates)"));
    }

    #[timed_test]
    fn invalid_strategy_displays_message() {
        let err = GameError::InvalidStrategy("state j sums to 0.5".to_string());
        assert_eq!(err.to_string(), "invalid strategy: state j sums to 0.5");
    }

    #[timed_test]
    fn infeasible_start_displays_message() {
        let err = GameError::InfeasibleStart("power budget exceeded".to_string());
        assert!(err.to_string().starts_with("infeasible start"));
    }
}

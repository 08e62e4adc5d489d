//! Experiment configuration loaded from YAML.
//!
//! An experiment bundles the game [`Parameters`], the solver tuning, the
//! Monte Carlo settings and an optional parameter sweep. Every section is
//! optional; missing ones take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GameError;
use crate::experiment::SweepConfig;
use crate::params::Parameters;
use crate::simulation::SimulationConfig;
use crate::solver::SolverConfig;

/// Everything one experiment needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Label used in reports
    pub name: Option<String>,
    pub parameters: Parameters,
    pub solver: SolverConfig,
    pub simulation: SimulationConfig,
    /// Cells for `run_sweep`
    pub sweep: SweepConfig,
}

impl ExperimentConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// Parameter invariants are enforced while deserializing, so a broken
    /// `parameters` section surfaces as [`ConfigError::Parse`].
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or a section fails validation.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Render back to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.solver.validate()?;
        if self.simulation.tolerance.is_nan() || self.simulation.tolerance < 0.0 {
            return Err(ConfigError::Invalid(GameError::InvalidConfiguration(format!(
                "simulation tolerance must be non-negative, got {}",
                self.simulation.tolerance
            ))));
        }
        if self.simulation.trials == 0 {
            return Err(ConfigError::Invalid(GameError::InvalidConfiguration(
                "simulation trials must be at least 1".into(),
            )));
        }
        Ok(())
    }
}

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(std::path::PathBuf, #[source] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error(transparent)]
    Invalid(#[from] GameError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use test_macros::timed_test;

    const VALID_YAML: &str = r"
name: wide sweep
parameters:
  k: 6
  n: 2
  p_avg: 1.0
  t: 200
solver:
  horizon: 10
  max_iterations: 50
simulation:
  seed: 42
  trials: 8
";

    #[timed_test]
    fn parse_valid_config() {
        let config = ExperimentConfig::from_yaml(VALID_YAML).unwrap();
        assert_eq!(config.name.as_deref(), Some("wide sweep"));
        assert_eq!(config.parameters.k(), 6);
        assert_eq!(config.parameters.n(), 2);
        assert_eq!(config.parameters.t(), 200);
        assert_eq!(config.parameters.m(), 7);
        assert_eq!(config.solver.horizon().unwrap(), 10);
        assert_eq!(config.solver.discount, 0.9);
        assert_eq!(config.simulation.seed, Some(42));
        assert_eq!(config.simulation.trials, 8);
    }

    #[timed_test]
    fn parse_sweep_section() {
        let yaml = r"
sweep:
  channels: [3, 6]
  variants:
    - name: joint
      rates: [6, 24, 54]
    - name: fixed
      rates: [54]
";
        let config = ExperimentConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.sweep.channels, vec![3, 6]);
        assert_eq!(config.sweep.variants[0].rates, vec![6.0, 24.0, 54.0]);
        assert_eq!(config.sweep.variants[1].name, "fixed");
        assert_eq!(config.sweep.cells(), 4);
    }

    #[timed_test]
    fn empty_document_takes_defaults() {
        let config = ExperimentConfig::from_yaml("{}").unwrap();
        assert_eq!(config.parameters, Parameters::default());
        assert_eq!(config.solver, SolverConfig::default());
        assert_eq!(config.simulation, SimulationConfig::default());
        assert_eq!(config.sweep, SweepConfig::default());
    }

    #[timed_test]
    fn invalid_parameters_fail_to_parse() {
        let yaml = "parameters:\n  k: 4\n  n: 5\n";
        let result = ExperimentConfig::from_yaml(yaml);
        assert!(matches!(result, Err(ConfigError::Parse(_))), "{result:?}");
    }

    #[timed_test]
    fn unknown_field_fails() {
        let result = ExperimentConfig::from_yaml("solver:\n  learning_rate: 0.1\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[timed_test]
    fn bad_discount_is_invalid() {
        let result = ExperimentConfig::from_yaml("solver:\n  discount: 1.5\n");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid(GameError::InvalidConfiguration(_)))
        ));
    }

    #[timed_test]
    fn zero_trials_is_invalid() {
        let result = ExperimentConfig::from_yaml("simulation:\n  trials: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[timed_test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID_YAML.as_bytes()).unwrap();
        let config = ExperimentConfig::load(file.path()).unwrap();
        assert_eq!(config.parameters.k(), 6);
    }

    #[timed_test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let err = ExperimentConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io(ref p, _) if *p == path));
        assert!(err.to_string().contains("absent.yaml"));
    }

    #[timed_test]
    fn yaml_round_trip_preserves_config() {
        let config = ExperimentConfig::from_yaml(VALID_YAML).unwrap();
        let again = ExperimentConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(again.parameters, config.parameters);
        assert_eq!(again.solver, config.solver);
        assert_eq!(again.simulation, config.simulation);
    }
}

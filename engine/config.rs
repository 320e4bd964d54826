use crate::cohort::mapping::ColumnMapping;
use crate::willingness::config::{ScoringConfig, ScoringConfigError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid [scoring] section: {0}")]
    Scoring(#[from] ScoringConfigError),
    #[error("Invalid [simulation] section: num_runs {num_runs} must be within [1, max_runs = {max_runs}].")]
    InvalidRunBounds { num_runs: usize, max_runs: usize },
}

/// Defaults for a simulation batch. CLI flags take precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationDefaults {
    pub num_runs: usize,
    /// Upper bound on runs accepted from the command line.
    pub max_runs: usize,
    pub seed: Option<u64>,
    pub parallel: bool,
}

impl Default for SimulationDefaults {
    fn default() -> Self {
        Self {
            num_runs: 100,
            max_runs: 500,
            seed: None,
            parallel: true,
        }
    }
}

impl SimulationDefaults {
    pub fn check_runs(&self, num_runs: usize) -> Result<usize, ConfigError> {
        if num_runs == 0 || num_runs > self.max_runs {
            return Err(ConfigError::InvalidRunBounds {
                num_runs,
                max_runs: self.max_runs,
            });
        }
        Ok(num_runs)
    }
}

/// Project-wide settings, stored as TOML with `[columns]`, `[scoring]` and
/// `[simulation]` sections. Missing sections and keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimuTrialConfig {
    pub columns: ColumnMapping,
    pub scoring: ScoringConfig,
    pub simulation: SimulationDefaults,
}

impl SimuTrialConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: SimuTrialConfig = toml::from_str(&toml_string)?;
        config.validate()?;
        log::info!("Loaded configuration from '{}'", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.validate()?;
        self.simulation.check_runs(self.simulation.num_runs)?;
        Ok(())
    }
}

use super::features::RaceCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Empirical clinical-trial participation rate for each survey race category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceParticipationRates {
    pub hispanic: f64,
    pub white: f64,
    pub black: f64,
    pub american_indian: f64,
    pub asian: f64,
    pub pacific_islander: f64,
    pub other: f64,
}

impl Default for RaceParticipationRates {
    fn default() -> Self {
        Self {
            hispanic: 0.11,
            white: 0.14,
            black: 0.16,
            american_indian: 0.10,
            asian: 0.09,
            pacific_islander: 0.10,
            other: 0.12,
        }
    }
}

impl RaceParticipationRates {
    pub fn rate(&self, race: RaceCode) -> f64 {
        match race {
            RaceCode::Hispanic => self.hispanic,
            RaceCode::White => self.white,
            RaceCode::Black => self.black,
            RaceCode::AmericanIndian => self.american_indian,
            RaceCode::Asian => self.asian,
            RaceCode::PacificIslander => self.pacific_islander,
            RaceCode::Other => self.other,
        }
    }

    fn all(&self) -> [f64; 7] {
        [
            self.hispanic,
            self.white,
            self.black,
            self.american_indian,
            self.asian,
            self.pacific_islander,
            self.other,
        ]
    }
}

/// Column names of the historical participation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingColumns {
    pub age: String,
    pub region: String,
    pub gender: String,
    pub race: String,
    pub label: String,
}

impl Default for TrainingColumns {
    fn default() -> Self {
        Self {
            age: "Age".to_string(),
            region: "CENSREG".to_string(),
            gender: "BirthGender".to_string(),
            race: "RaceEthn".to_string(),
            label: "ParticipatedClinTrial".to_string(),
        }
    }
}

impl TrainingColumns {
    /// Feature columns in classifier order.
    pub fn feature_columns(&self) -> [&str; 4] {
        [
            self.age.as_str(),
            self.region.as_str(),
            self.gender.as_str(),
            self.race.as_str(),
        ]
    }
}

/// Tuning constants for the willingness scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Upper bound every score is rescaled and clipped to.
    pub ceiling: f64,
    /// Added to every adjusted score before rescaling.
    pub offset: f64,
    /// Multiplies every race participation rate.
    pub race_amplification: f64,
    /// Patients younger than this get a linear boost.
    pub age_boost_threshold: f64,
    /// Boost added per year below the threshold.
    pub age_boost_per_year: f64,
    pub max_iterations: usize,
    pub convergence_tolerance: f64,
    pub ridge: f64,
    pub race_rates: RaceParticipationRates,
    pub training_columns: TrainingColumns,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ceiling: 0.5,
            offset: 0.05,
            race_amplification: 5.0,
            age_boost_threshold: 40.0,
            age_boost_per_year: 0.02,
            max_iterations: 100,
            convergence_tolerance: 1e-8,
            ridge: 1e-6,
            race_rates: RaceParticipationRates::default(),
            training_columns: TrainingColumns::default(),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ScoringConfigError {
    #[error("Score ceiling must lie in (0, 1], got {0}.")]
    InvalidCeiling(f64),
    #[error("Scoring parameter '{name}' must be finite and non-negative, got {value}.")]
    NegativeParameter { name: &'static str, value: f64 },
    #[error("The classifier needs at least one iteration.")]
    ZeroIterations,
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ScoringConfigError> {
        if !(self.ceiling > 0.0 && self.ceiling <= 1.0) {
            return Err(ScoringConfigError::InvalidCeiling(self.ceiling));
        }
        let checks = [
            ("offset", self.offset),
            ("race_amplification", self.race_amplification),
            ("age_boost_per_year", self.age_boost_per_year),
            ("convergence_tolerance", self.convergence_tolerance),
            ("ridge", self.ridge),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoringConfigError::NegativeParameter { name, value });
            }
        }
        for value in self.race_rates.all() {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoringConfigError::NegativeParameter {
                    name: "race_rates",
                    value,
                });
            }
        }
        if self.max_iterations == 0 {
            return Err(ScoringConfigError::ZeroIterations);
        }
        Ok(())
    }

    /// Multiplier applied to patients below the age threshold.
    pub fn age_boost(&self, age: f64) -> f64 {
        if age < self.age_boost_threshold {
            1.0 + self.age_boost_per_year * (self.age_boost_threshold - age)
        } else {
            1.0
        }
    }
}

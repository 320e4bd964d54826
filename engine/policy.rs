use crate::cohort::types::PatientRecord;
use crate::simulate::SimulationError;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Rule that decides each simulated patient's consent probability.
///
/// The two modes are exclusive; a batch uses exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConsentPolicy {
    /// Each patient consents with its own stored willingness score.
    PerPatientScore,
    /// Each patient, in every run, draws a fresh probability uniformly from
    /// `[min, max]`.
    Range { min: f64, max: f64 },
}

impl ConsentPolicy {
    pub fn range(min: f64, max: f64) -> Result<Self, SimulationError> {
        let policy = ConsentPolicy::Range { min, max };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        match *self {
            ConsentPolicy::PerPatientScore => Ok(()),
            ConsentPolicy::Range { min, max } => {
                let valid = min.is_finite()
                    && max.is_finite()
                    && (0.0..=1.0).contains(&min)
                    && (0.0..=1.0).contains(&max)
                    && min <= max;
                if valid {
                    Ok(())
                } else {
                    Err(SimulationError::InvalidProbabilityRange { min, max })
                }
            }
        }
    }

    /// Effective probability for one patient in one run, or `None` for an
    /// unscored patient under the per-patient policy.
    pub(crate) fn probability<R: Rng>(&self, record: &PatientRecord, rng: &mut R) -> Option<f64> {
        match *self {
            ConsentPolicy::PerPatientScore => record.willingness_score,
            ConsentPolicy::Range { min, max } if min == max => Some(min),
            ConsentPolicy::Range { min, max } => Some(rng.gen_range(min..=max)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ConsentPolicy::PerPatientScore => "per-patient willingness score".to_string(),
            ConsentPolicy::Range { min, max } => {
                format!("uniform range [{min}, {max}] drawn per patient per run")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn range_bounds_are_checked() {
        assert!(ConsentPolicy::range(0.2, 0.8).is_ok());
        assert!(ConsentPolicy::range(0.5, 0.5).is_ok());
        assert_eq!(
            ConsentPolicy::range(0.8, 0.2),
            Err(SimulationError::InvalidProbabilityRange { min: 0.8, max: 0.2 })
        );
        assert!(ConsentPolicy::range(-0.1, 0.5).is_err());
        assert!(ConsentPolicy::range(0.1, 1.5).is_err());
        assert!(ConsentPolicy::range(f64::NAN, 0.5).is_err());
    }

    #[test]
    fn range_draws_stay_within_bounds() {
        let policy = ConsentPolicy::range(0.25, 0.35).unwrap();
        let record = PatientRecord::default();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..1000 {
            let p = policy.probability(&record, &mut rng).unwrap();
            assert!((0.25..=0.35).contains(&p));
        }
    }

    #[test]
    fn per_patient_policy_has_no_probability_without_a_score() {
        let mut rng = StdRng::seed_from_u64(1);
        let unscored = PatientRecord::default();
        assert_eq!(
            ConsentPolicy::PerPatientScore.probability(&unscored, &mut rng),
            None
        );
        let scored = PatientRecord {
            willingness_score: Some(0.4),
            ..PatientRecord::default()
        };
        assert_eq!(
            ConsentPolicy::PerPatientScore.probability(&scored, &mut rng),
            Some(0.4)
        );
    }

    #[test]
    fn policy_round_trips_through_toml() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            policy: ConsentPolicy,
        }
        let text = toml::to_string(&Wrapper {
            policy: ConsentPolicy::Range { min: 0.2, max: 0.8 },
        })
        .unwrap();
        let back: Wrapper = toml::from_str(&text).unwrap();
        assert_eq!(back.policy, ConsentPolicy::Range { min: 0.2, max: 0.8 });
    }
}

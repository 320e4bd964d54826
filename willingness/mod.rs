pub mod config;
pub mod features;
pub mod logistic;
pub mod score;
pub mod training;

pub use config::{RaceParticipationRates, ScoringConfig, ScoringConfigError, TrainingColumns};
pub use features::{GenderCode, PatientFeatures, RaceCode, Region, derive_features};
pub use logistic::{FitError, FitOptions, FitStatus, LogisticFit, Standardizer, fit_logistic};
pub use score::{
    FitSummary, ScoringError, ScoringReport, adjust_score, predict_willingness_scores,
    rescale_and_clip,
};
pub use training::{TrainingData, load_training_data};

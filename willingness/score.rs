//! # Willingness Scoring
//!
//! Turns raw patient attributes into a bounded per-patient consent probability:
//!
//! 1. Derive classifier inputs per patient and set aside patients missing any.
//! 2. Standardize, using a scaler fitted on this invocation's training batch.
//! 3. Fit a fresh logistic classifier on the historical participation table.
//! 4. Predict a base probability per patient.
//! 5. Re-weight by the race participation rate (amplified) and a linear young-age
//!    boost, add the fixed offset.
//! 6. Rescale the batch so its maximum sits at the ceiling, then clip to
//!    `[0, ceiling]`.
//! 7. Merge scores back by patient id. Patients set aside in step 1 stay unset.

use super::config::{ScoringConfig, ScoringConfigError};
use super::features::{NUM_FEATURES, PatientFeatures, derive_features};
use super::logistic::{FitError, FitOptions, FitStatus, Standardizer, fit_logistic};
use super::training::TrainingData;
use crate::cohort::data::DataError;
use crate::cohort::types::Population;
use ndarray::Array2;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Failed to load data: {0}")]
    Data(#[from] DataError),
    #[error("Invalid scoring configuration: {0}")]
    Config(#[from] ScoringConfigError),
    #[error("Classifier fit failed: {0}")]
    Fit(#[from] FitError),
    #[error("Failed to assemble feature matrix: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("No usable training rows remain after dropping missing values.")]
    EmptyTrainingSet,
    #[error("Training matrix has {found} feature columns, but the scorer expects {expected}.")]
    FeatureCountMismatch { found: usize, expected: usize },
    #[error("Training matrix has {rows} rows but {labels} labels.")]
    LabelCountMismatch { rows: usize, labels: usize },
}

/// Diagnostics from the classifier fit behind a scoring run.
#[derive(Debug, Clone, Serialize)]
pub struct FitSummary {
    pub status: FitStatus,
    pub iterations: usize,
    pub deviance: f64,
    /// Intercept first, then `Age, CENSREG, BirthGender, RaceEthn` on the
    /// standardized scale.
    pub coefficients: Vec<f64>,
    pub training_rows: usize,
}

/// Result of scoring a population.
#[derive(Debug, Clone)]
pub struct ScoringReport {
    /// The input population with `willingness_score` filled in where possible.
    pub population: Population,
    /// Patients left unscored because a required feature was missing.
    pub excluded: usize,
    pub fit: FitSummary,
}

/// Applies the race and age multipliers to one base probability.
pub fn adjust_score(base: f64, features: &PatientFeatures, config: &ScoringConfig) -> f64 {
    let race_weight = config.race_rates.rate(features.race) * config.race_amplification;
    base * race_weight * config.age_boost(features.age) + config.offset
}

/// Rescales a batch so its maximum maps onto `ceiling`, then clips to
/// `[0, ceiling]`. A non-positive maximum skips the rescale.
pub fn rescale_and_clip(scores: &mut [f64], ceiling: f64) {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let scale = if max > 0.0 && max.is_finite() {
        ceiling / max
    } else {
        if !scores.is_empty() {
            log::warn!("Maximum adjusted willingness score is {max}; skipping rescale");
        }
        1.0
    };
    for score in scores.iter_mut() {
        *score = (*score * scale).clamp(0.0, ceiling);
    }
}

/// Scores every patient in `population` against a classifier trained on
/// `training`. No model state outlives the call.
pub fn predict_willingness_scores(
    population: &Population,
    training: &TrainingData,
    config: &ScoringConfig,
) -> Result<ScoringReport, ScoringError> {
    config.validate()?;

    let derived: Vec<(usize, PatientFeatures)> = population
        .iter()
        .filter_map(|record| derive_features(record).map(|f| (record.id, f)))
        .collect();
    let excluded = population.len() - derived.len();
    if excluded > 0 {
        log::warn!(
            "{excluded} of {} patients lack age, region or gender and will not be scored",
            population.len()
        );
    }

    let scaler = Standardizer::fit(training.features.view());
    let training_x = scaler.transform(training.features.view());
    let options = FitOptions {
        max_iterations: config.max_iterations,
        convergence_tolerance: config.convergence_tolerance,
        ridge: config.ridge,
    };
    let fit = fit_logistic(training_x.view(), training.labels.view(), &options)?;
    let summary = FitSummary {
        status: fit.status,
        iterations: fit.iterations,
        deviance: fit.deviance,
        coefficients: fit.coefficients.to_vec(),
        training_rows: training.len(),
    };

    if derived.is_empty() {
        log::warn!("No patient has a complete feature set; every score is unset");
        return Ok(ScoringReport {
            population: population.with_scores(&[]),
            excluded,
            fit: summary,
        });
    }

    let buffer: Vec<f64> = derived.iter().flat_map(|(_, f)| f.to_row()).collect();
    let patient_x = Array2::from_shape_vec((derived.len(), NUM_FEATURES), buffer)?;
    let base = fit.predict_proba(scaler.transform(patient_x.view()).view());

    let mut scores: Vec<f64> = derived
        .iter()
        .zip(base.iter())
        .map(|((_, features), &p)| adjust_score(p, features, config))
        .collect();
    rescale_and_clip(&mut scores, config.ceiling);

    let merged: Vec<(usize, Option<f64>)> = derived
        .iter()
        .zip(scores)
        .map(|((id, _), score)| (*id, Some(score)))
        .collect();

    log::info!(
        "Scored {} patients (ceiling {}, fit {:?})",
        merged.len(),
        config.ceiling,
        summary.status
    );

    Ok(ScoringReport {
        population: population.with_scores(&merged),
        excluded,
        fit: summary,
    })
}

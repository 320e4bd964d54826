//! Historical trial-participation data used to fit the willingness classifier.
//!
//! The table follows the survey layout: `Age`, `CENSREG`, `BirthGender`,
//! `RaceEthn` and the `ParticipatedClinTrial` outcome. The survey encodes
//! non-answers as negative sentinels (e.g. `-9`), so any row carrying a null or a
//! negative value in the five columns is dropped before fitting.

use super::config::TrainingColumns;
use super::features::NUM_FEATURES;
use super::score::ScoringError;
use crate::cohort::data::{DataError, extract_numeric, read_table};
use ndarray::{Array1, Array2};
use std::path::Path;

/// Validated training matrix and binary labels.
#[derive(Debug, Clone)]
pub struct TrainingData {
    /// Shape `[n_rows, 4]` in `Age, CENSREG, BirthGender, RaceEthn` order.
    pub features: Array2<f64>,
    /// 1.0 for participants, 0.0 otherwise.
    pub labels: Array1<f64>,
}

impl TrainingData {
    pub fn new(features: Array2<f64>, labels: Array1<f64>) -> Result<Self, ScoringError> {
        if features.ncols() != NUM_FEATURES {
            return Err(ScoringError::FeatureCountMismatch {
                found: features.ncols(),
                expected: NUM_FEATURES,
            });
        }
        if features.nrows() != labels.len() {
            return Err(ScoringError::LabelCountMismatch {
                rows: features.nrows(),
                labels: labels.len(),
            });
        }
        if features.nrows() == 0 {
            return Err(ScoringError::EmptyTrainingSet);
        }
        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Share of positive labels.
    pub fn participation_rate(&self) -> f64 {
        self.labels.mean().unwrap_or(0.0)
    }
}

/// Loads the participation table, dropping rows with missing or sentinel values.
/// `label == 1` is a participant, any other non-negative value is not.
pub fn load_training_data(
    path: &Path,
    columns: &TrainingColumns,
) -> Result<TrainingData, ScoringError> {
    let df = read_table(path)?;

    let present: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let mut required: Vec<&str> = columns.feature_columns().to_vec();
    required.push(columns.label.as_str());
    for name in &required {
        if !present.iter().any(|c| c == name) {
            return Err(DataError::ColumnNotFound(name.to_string()).into());
        }
    }

    let extracted = required
        .iter()
        .map(|name| extract_numeric(&df, name))
        .collect::<Result<Vec<_>, DataError>>()?;

    let total = df.height();
    let mut buffer = Vec::with_capacity(total * NUM_FEATURES);
    let mut labels = Vec::with_capacity(total);
    for row in 0..total {
        let values: Option<Vec<f64>> = extracted
            .iter()
            .map(|column| column[row].filter(|v| *v >= 0.0))
            .collect();
        let Some(values) = values else {
            continue;
        };
        buffer.extend_from_slice(&values[..NUM_FEATURES]);
        labels.push(if values[NUM_FEATURES] == 1.0 { 1.0 } else { 0.0 });
    }

    let kept = labels.len();
    log::info!(
        "Training data: kept {kept} of {total} rows ({} dropped for missing or negative codes)",
        total - kept
    );
    if kept == 0 {
        return Err(ScoringError::EmptyTrainingSet);
    }

    let features = Array2::from_shape_vec((kept, NUM_FEATURES), buffer)?;
    TrainingData::new(features, Array1::from_vec(labels))
}

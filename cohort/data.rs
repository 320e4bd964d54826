//! # Population Loading and Normalization
//!
//! This module is the entry point for user-provided patient tables. It reads a
//! delimited file with `polars`, resolves the arbitrary source column names onto
//! the five standard patient fields through a [`ColumnMapping`], collapses one-hot
//! race indicator columns into a single set-valued field, and hands back a
//! [`Population`] with a fixed schema.
//!
//! - Lenient Schema: unlike training data, patient tables come from many sources.
//!   A standard field with no matching column is simply absent, and unparsable
//!   cells become `None` rather than errors.
//! - Resolved Once: column aliases are looked up a single time per load. Nothing
//!   downstream scans column names again.

use super::mapping::{ColumnMapping, StandardField};
use super::types::{PatientRecord, Population, RaceEthnicity, ResolvedSchema};
use itertools::Itertools;
use polars::prelude::*;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A comprehensive error type for population loading failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("The input file '{0}' does not exist.")]
    FileNotFound(String),
    #[error("The input table '{0}' contains no data rows.")]
    EmptyTable(String),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
}

/// Chooses the field separator from the file extension: tab for `.tsv`/`.tab`,
/// comma for everything else.
pub fn separator_for(path: &Path) -> u8 {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    }
}

/// Reads a delimited table from disk with a mandatory header row.
pub fn read_table(path: &Path) -> Result<DataFrame, DataError> {
    if !path.exists() {
        return Err(DataError::FileNotFound(path.display().to_string()));
    }

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(None)
                .with_parse_options(
                    CsvParseOptions::default().with_separator(separator_for(path)),
                ),
        )
        .finish()?;

    log::info!(
        "Loaded '{}' with {} rows and {} columns",
        path.display(),
        df.height(),
        df.width()
    );
    Ok(df)
}

/// Loads a patient table and normalizes it onto the standard schema.
pub fn load_population(path: &Path, mapping: &ColumnMapping) -> Result<Population, DataError> {
    let df = read_table(path)?;
    if df.height() == 0 {
        return Err(DataError::EmptyTable(path.display().to_string()));
    }
    normalize(&df, mapping)
}

/// Normalizes an in-memory frame onto the standard schema.
///
/// Every row becomes one [`PatientRecord`] whose `id` is its row index. Fields
/// with no resolvable column are `None` for every patient.
pub fn normalize(df: &DataFrame, mapping: &ColumnMapping) -> Result<Population, DataError> {
    let column_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let columns: Vec<&str> = column_names.iter().map(|s| s.as_str()).collect();

    let schema = resolve_schema(mapping, &columns);
    log_schema(&schema);

    let n = df.height();
    let ages = match &schema.age {
        Some(name) => extract_numeric(df, name)?,
        None => vec![None; n],
    };
    let genders = extract_optional_text(df, schema.gender.as_deref(), n)?;
    let regions = extract_optional_text(df, schema.region.as_deref(), n)?;
    let health = extract_optional_text(df, schema.health_issues.as_deref(), n)?;

    let races: Vec<Option<RaceEthnicity>> = if !schema.race_indicators.is_empty() {
        collapse_race_indicators(df, &schema.race_indicators, mapping)?
    } else {
        extract_optional_text(df, schema.race_ethnicity.as_deref(), n)?
            .into_iter()
            .map(|v| v.map(RaceEthnicity::Label))
            .collect()
    };

    let records = ages
        .into_iter()
        .zip(genders)
        .zip(races)
        .zip(regions)
        .zip(health)
        .enumerate()
        .map(
            |(id, ((((age, gender), race_ethnicity), region), health_issues))| PatientRecord {
                id,
                age,
                gender,
                race_ethnicity,
                region,
                health_issues,
                willingness_score: None,
            },
        )
        .collect();

    Ok(Population { records, schema })
}

fn resolve_schema(mapping: &ColumnMapping, columns: &[&str]) -> ResolvedSchema {
    let pick = |field| mapping.resolve(field, columns).map(|s| s.to_string());
    let race_indicators: Vec<String> = columns
        .iter()
        .filter(|c| mapping.is_race_indicator(c))
        .map(|c| c.to_string())
        .collect();

    ResolvedSchema {
        age: pick(StandardField::Age),
        gender: pick(StandardField::Gender),
        race_ethnicity: if race_indicators.is_empty() {
            pick(StandardField::RaceEthnicity)
        } else {
            None
        },
        region: pick(StandardField::Region),
        health_issues: pick(StandardField::HealthIssues),
        race_indicators,
    }
}

fn log_schema(schema: &ResolvedSchema) {
    let entries = [
        (StandardField::Age, &schema.age),
        (StandardField::Gender, &schema.gender),
        (StandardField::RaceEthnicity, &schema.race_ethnicity),
        (StandardField::Region, &schema.region),
        (StandardField::HealthIssues, &schema.health_issues),
    ];
    let resolved = entries
        .iter()
        .map(|(field, source)| match source {
            Some(column) => format!("{field} <- '{column}'"),
            None => format!("{field} <- (absent)"),
        })
        .join(", ");
    log::info!("Resolved population schema: {resolved}");
    if !schema.race_indicators.is_empty() {
        log::info!(
            "Collapsing {} race indicator columns: {}",
            schema.race_indicators.len(),
            schema.race_indicators.iter().join(", ")
        );
    }
}

pub(crate) fn extract_numeric(
    df: &DataFrame,
    column_name: &str,
) -> Result<Vec<Option<f64>>, DataError> {
    let column = df.column(column_name)?;
    let casted = column
        .cast(&DataType::Float64)
        .map_err(|_| DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", column.dtype()),
        })?;
    Ok(casted
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

fn extract_text(df: &DataFrame, column_name: &str) -> Result<Vec<Option<String>>, DataError> {
    let column = df.column(column_name)?;
    let casted = column
        .cast(&DataType::String)
        .map_err(|_| DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "string",
            found_type: format!("{:?}", column.dtype()),
        })?;
    Ok(casted
        .str()?
        .into_iter()
        .map(|v| {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        })
        .collect())
}

fn extract_optional_text(
    df: &DataFrame,
    column_name: Option<&str>,
    n: usize,
) -> Result<Vec<Option<String>>, DataError> {
    match column_name {
        Some(name) => extract_text(df, name),
        None => Ok(vec![None; n]),
    }
}

/// Turns the one-hot race columns into one set per row. A row with no indicator
/// equal to 1 gets an empty set, which downstream maps to the "Other" category.
fn collapse_race_indicators(
    df: &DataFrame,
    indicators: &[String],
    mapping: &ColumnMapping,
) -> Result<Vec<Option<RaceEthnicity>>, DataError> {
    let n = df.height();
    let mut sets: Vec<BTreeSet<String>> = vec![BTreeSet::new(); n];

    for column_name in indicators {
        let label = column_name
            .strip_prefix(&mapping.race_indicator_prefix)
            .unwrap_or(column_name)
            .to_string();
        let values = extract_numeric(df, column_name)?;
        for (set, value) in sets.iter_mut().zip(values) {
            if value == Some(1.0) {
                set.insert(label.clone());
            }
        }
    }

    Ok(sets
        .into_iter()
        .map(|set| Some(RaceEthnicity::Flags(set)))
        .collect())
}

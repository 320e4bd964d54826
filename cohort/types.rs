use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Race/ethnicity as it arrives from the source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceEthnicity {
    /// A single categorical value, e.g. from a `Race` column.
    Label(String),
    /// The names of the one-hot indicator columns that were set for this row,
    /// with the indicator prefix stripped.
    Flags(BTreeSet<String>),
}

impl RaceEthnicity {
    /// Every category name carried by this value.
    pub fn categories(&self) -> Vec<&str> {
        match self {
            Self::Label(label) => vec![label.as_str()],
            Self::Flags(flags) => flags.iter().map(|s| s.as_str()).collect(),
        }
    }
}

impl fmt::Display for RaceEthnicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label(label) => f.write_str(label),
            Self::Flags(flags) => {
                let joined: Vec<&str> = flags.iter().map(|s| s.as_str()).collect();
                write!(f, "[{}]", joined.join(";"))
            }
        }
    }
}

/// One row of the population table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatientRecord {
    /// 0-based row index in the source table. Survives filtering.
    pub id: usize,
    pub age: Option<f64>,
    pub gender: Option<String>,
    pub race_ethnicity: Option<RaceEthnicity>,
    pub region: Option<String>,
    pub health_issues: Option<String>,
    /// Set once by the scorer; `None` for patients that could not be scored.
    pub willingness_score: Option<f64>,
}

/// The source column chosen for each standard field at load time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSchema {
    pub age: Option<String>,
    pub gender: Option<String>,
    pub race_ethnicity: Option<String>,
    pub region: Option<String>,
    pub health_issues: Option<String>,
    /// One-hot race columns collapsed into `race_ethnicity`.
    pub race_indicators: Vec<String>,
}

/// A normalized patient population.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Population {
    pub records: Vec<PatientRecord>,
    pub schema: ResolvedSchema,
}

impl Population {
    pub fn from_records(records: Vec<PatientRecord>) -> Self {
        Self {
            records,
            schema: ResolvedSchema::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatientRecord> {
        self.records.iter()
    }

    /// Keeps only the records that carry a willingness score.
    pub fn scored(&self) -> Population {
        Population {
            records: self
                .records
                .iter()
                .filter(|r| r.willingness_score.is_some())
                .cloned()
                .collect(),
            schema: self.schema.clone(),
        }
    }

    pub fn unscored_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.willingness_score.is_none())
            .count()
    }

    /// Returns a copy with scores merged in by patient id. Ids absent from
    /// `scores` are left unset.
    pub fn with_scores(&self, scores: &[(usize, Option<f64>)]) -> Population {
        let lookup: std::collections::HashMap<usize, Option<f64>> =
            scores.iter().copied().collect();
        let records = self
            .records
            .iter()
            .map(|r| PatientRecord {
                willingness_score: lookup.get(&r.id).copied().flatten(),
                ..r.clone()
            })
            .collect();
        Population {
            records,
            schema: self.schema.clone(),
        }
    }

    /// Mean of the set willingness scores, or `None` if nobody is scored.
    pub fn mean_willingness(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .records
            .iter()
            .filter_map(|r| r.willingness_score)
            .collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }
}

impl<'a> IntoIterator for &'a Population {
    type Item = &'a PatientRecord;
    type IntoIter = std::slice::Iter<'a, PatientRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: usize, score: Option<f64>) -> PatientRecord {
        PatientRecord {
            id,
            willingness_score: score,
            ..PatientRecord::default()
        }
    }

    #[test]
    fn scores_merge_by_id_not_position() {
        let population = Population::from_records(vec![record(7, None), record(3, None)]);
        let merged = population.with_scores(&[(3, Some(0.25)), (7, None)]);
        assert_eq!(merged.records[0].id, 7);
        assert_eq!(merged.records[0].willingness_score, None);
        assert_eq!(merged.records[1].willingness_score, Some(0.25));
        assert_eq!(merged.unscored_count(), 1);
    }

    #[test]
    fn mean_willingness_ignores_unscored() {
        let population = Population::from_records(vec![
            record(0, Some(0.1)),
            record(1, None),
            record(2, Some(0.3)),
        ]);
        let mean = population.mean_willingness().unwrap();
        assert!((mean - 0.2).abs() < 1e-12);
        assert_eq!(population.scored().len(), 2);
        assert_eq!(Population::default().mean_willingness(), None);
    }

    #[test]
    fn flags_display_is_stable() {
        let flags: BTreeSet<String> = ["Hispanic", "Asian"].iter().map(|s| s.to_string()).collect();
        assert_eq!(RaceEthnicity::Flags(flags).to_string(), "[Asian;Hispanic]");
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five canonical patient fields every source table is resolved onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StandardField {
    Age,
    Gender,
    RaceEthnicity,
    Region,
    HealthIssues,
}

impl StandardField {
    pub fn name(self) -> &'static str {
        match self {
            Self::Age => "age",
            Self::Gender => "gender",
            Self::RaceEthnicity => "race_ethnicity",
            Self::Region => "region",
            Self::HealthIssues => "health_issues",
        }
    }
}

impl fmt::Display for StandardField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered-priority aliases from each canonical field to the source column names
/// that may carry it. The first candidate present in a table wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub age: Vec<String>,
    pub gender: Vec<String>,
    pub race_ethnicity: Vec<String>,
    pub region: Vec<String>,
    pub health_issues: Vec<String>,
    /// Columns starting with this prefix are one-hot race indicators. They are
    /// collapsed into a single `race_ethnicity` set and never used as aliases.
    pub race_indicator_prefix: String,
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            age: owned(&["Age", "age", "dob"]),
            gender: owned(&["Gender", "sex", "Sex"]),
            race_ethnicity: owned(&["Race", "Ethnicity", "race_ethnicity", "race"]),
            region: owned(&["Location", "region", "Region"]),
            health_issues: owned(&[
                "Conditions",
                "health_conditions",
                "Issues",
                "hypertension",
                "heart_disease",
            ]),
            race_indicator_prefix: "race:".to_string(),
        }
    }
}

impl ColumnMapping {
    pub fn candidates(&self, field: StandardField) -> &[String] {
        match field {
            StandardField::Age => &self.age,
            StandardField::Gender => &self.gender,
            StandardField::RaceEthnicity => &self.race_ethnicity,
            StandardField::Region => &self.region,
            StandardField::HealthIssues => &self.health_issues,
        }
    }

    pub fn is_race_indicator(&self, column: &str) -> bool {
        !self.race_indicator_prefix.is_empty() && column.starts_with(&self.race_indicator_prefix)
    }

    /// Picks the first candidate for `field` present in `columns`. Race indicator
    /// columns are skipped so the prefix rule owns them.
    pub fn resolve<'a>(&'a self, field: StandardField, columns: &[&str]) -> Option<&'a str> {
        self.candidates(field)
            .iter()
            .filter(|candidate| !self.is_race_indicator(candidate))
            .find(|candidate| columns.contains(&candidate.as_str()))
            .map(|s| s.as_str())
    }
}

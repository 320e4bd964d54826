use super::types::{PatientRecord, Population};
use std::collections::BTreeSet;

/// Row filters applied to a population before it is simulated.
///
/// An empty set disables that filter. While a filter is active, a patient whose
/// field is missing does not pass it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemographicFilter {
    /// Keep patients strictly older than this age.
    pub min_age: Option<f64>,
    /// Lowercased gender values to keep.
    pub genders: BTreeSet<String>,
    /// Lowercased race/ethnicity categories to keep. A patient passes if any of
    /// its categories is in the set.
    pub races: BTreeSet<String>,
}

impl DemographicFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_age(mut self, age: f64) -> Self {
        self.min_age = Some(age);
        self
    }

    pub fn with_genders<I, S>(mut self, genders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.genders = genders
            .into_iter()
            .map(|g| g.as_ref().trim().to_lowercase())
            .collect();
        self
    }

    pub fn with_races<I, S>(mut self, races: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.races = races
            .into_iter()
            .map(|r| r.as_ref().trim().to_lowercase())
            .collect();
        self
    }

    pub fn is_active(&self) -> bool {
        self.min_age.is_some() || !self.genders.is_empty() || !self.races.is_empty()
    }

    pub fn matches(&self, record: &PatientRecord) -> bool {
        if let Some(min_age) = self.min_age {
            match record.age {
                Some(age) if age > min_age => {}
                _ => return false,
            }
        }

        if !self.genders.is_empty() {
            match &record.gender {
                Some(gender) if self.genders.contains(&gender.to_lowercase()) => {}
                _ => return false,
            }
        }

        if !self.races.is_empty() {
            match &record.race_ethnicity {
                Some(race)
                    if race
                        .categories()
                        .iter()
                        .any(|c| self.races.contains(&c.to_lowercase())) => {}
                _ => return false,
            }
        }

        true
    }

    /// Returns the matching subset. Patient ids are preserved.
    pub fn apply(&self, population: &Population) -> Population {
        if !self.is_active() {
            return population.clone();
        }
        let records: Vec<PatientRecord> = population
            .iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();
        log::info!(
            "Demographic filter kept {} of {} patients",
            records.len(),
            population.len()
        );
        Population {
            records,
            schema: population.schema.clone(),
        }
    }
}

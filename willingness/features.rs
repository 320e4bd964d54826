//! Model-ready features derived from a [`PatientRecord`].
//!
//! The codes follow the national health survey the training table comes from
//! (`CENSREG`, `BirthGender`, `RaceEthn`), so patient rows and training rows share
//! one numeric encoding.

use crate::cohort::types::{PatientRecord, RaceEthnicity};
use serde::{Deserialize, Serialize};

/// US census region (`CENSREG`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Northeast = 1,
    Midwest = 2,
    South = 3,
    West = 4,
}

impl Region {
    pub fn code(self) -> f64 {
        self as i32 as f64
    }

    /// Maps a state name, two-letter abbreviation, region name or numeric code onto
    /// its census region. Territories and unknown values have no region.
    pub fn from_location(location: &str) -> Option<Region> {
        let key = location.trim().to_lowercase();
        let region = match key.as_str() {
            "northeast" | "1" => Region::Northeast,
            "midwest" | "2" => Region::Midwest,
            "south" | "3" => Region::South,
            "west" | "4" => Region::West,

            "connecticut" | "ct" | "maine" | "me" | "massachusetts" | "ma" | "new hampshire"
            | "nh" | "rhode island" | "ri" | "vermont" | "vt" | "new jersey" | "nj"
            | "new york" | "ny" | "pennsylvania" | "pa" => Region::Northeast,

            "illinois" | "il" | "indiana" | "in" | "michigan" | "mi" | "ohio" | "oh"
            | "wisconsin" | "wi" | "iowa" | "ia" | "kansas" | "ks" | "minnesota" | "mn"
            | "missouri" | "mo" | "nebraska" | "ne" | "north dakota" | "nd" | "south dakota"
            | "sd" => Region::Midwest,

            "delaware" | "de" | "district of columbia" | "dc" | "florida" | "fl" | "georgia"
            | "ga" | "maryland" | "md" | "north carolina" | "nc" | "south carolina" | "sc"
            | "virginia" | "va" | "west virginia" | "wv" | "alabama" | "al" | "kentucky"
            | "ky" | "mississippi" | "ms" | "tennessee" | "tn" | "arkansas" | "ar"
            | "louisiana" | "la" | "oklahoma" | "ok" | "texas" | "tx" => Region::South,

            "arizona" | "az" | "colorado" | "co" | "idaho" | "id" | "montana" | "mt"
            | "nevada" | "nv" | "new mexico" | "nm" | "utah" | "ut" | "wyoming" | "wy"
            | "alaska" | "ak" | "california" | "ca" | "hawaii" | "hi" | "oregon" | "or"
            | "washington" | "wa" => Region::West,

            _ => return None,
        };
        Some(region)
    }
}

/// Survey race/ethnicity category (`RaceEthn`). `Other` is the sentinel for
/// patients with no recognised category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaceCode {
    Hispanic = 1,
    White = 2,
    Black = 3,
    AmericanIndian = 4,
    Asian = 5,
    PacificIslander = 6,
    Other = 7,
}

/// Flag names checked in order when a patient has several race indicators set.
const RACE_FLAG_PRIORITY: [(&str, RaceCode); 6] = [
    ("hispanic", RaceCode::Hispanic),
    ("africanamerican", RaceCode::Black),
    ("asian", RaceCode::Asian),
    ("caucasian", RaceCode::White),
    ("americanindian", RaceCode::AmericanIndian),
    ("pacificislander", RaceCode::PacificIslander),
];

fn squash(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

impl RaceCode {
    pub fn code(self) -> f64 {
        self as i32 as f64
    }

    pub fn from_label(label: &str) -> RaceCode {
        match squash(label).as_str() {
            "hispanic" | "latino" | "latina" | "latinx" | "hispaniclatino" | "1" => {
                RaceCode::Hispanic
            }
            "white" | "caucasian" | "nonhispanicwhite" | "2" => RaceCode::White,
            "black" | "africanamerican" | "blackafricanamerican" | "nonhispanicblack" | "3" => {
                RaceCode::Black
            }
            "americanindian" | "alaskanative" | "americanindianalaskanative" | "4" => {
                RaceCode::AmericanIndian
            }
            "asian" | "nonhispanicasian" | "5" => RaceCode::Asian,
            "pacificislander" | "nativehawaiian" | "nativehawaiianpacificislander" | "6" => {
                RaceCode::PacificIslander
            }
            _ => RaceCode::Other,
        }
    }

    /// First flagged race in the fixed priority order wins.
    pub fn from_flags<'a, I>(flags: I) -> RaceCode
    where
        I: IntoIterator<Item = &'a str>,
    {
        let flagged: Vec<String> = flags.into_iter().map(squash).collect();
        RACE_FLAG_PRIORITY
            .iter()
            .find(|(name, _)| flagged.iter().any(|f| f == name))
            .map(|(_, code)| *code)
            .unwrap_or(RaceCode::Other)
    }

    pub fn from_race(race: Option<&RaceEthnicity>) -> RaceCode {
        match race {
            Some(RaceEthnicity::Label(label)) => RaceCode::from_label(label),
            Some(RaceEthnicity::Flags(flags)) => {
                RaceCode::from_flags(flags.iter().map(|s| s.as_str()))
            }
            None => RaceCode::Other,
        }
    }
}

/// Birth gender (`BirthGender`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenderCode {
    Male = 1,
    Female = 2,
}

impl GenderCode {
    pub fn code(self) -> f64 {
        self as i32 as f64
    }

    pub fn from_label(label: &str) -> Option<GenderCode> {
        match label.trim().to_lowercase().as_str() {
            "male" | "m" | "man" | "1" => Some(GenderCode::Male),
            "female" | "f" | "woman" | "2" => Some(GenderCode::Female),
            _ => None,
        }
    }
}

/// The four classifier inputs for one patient, in training-column order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatientFeatures {
    pub age: f64,
    pub region: Region,
    pub gender: GenderCode,
    pub race: RaceCode,
}

/// Number of classifier input columns.
pub const NUM_FEATURES: usize = 4;

impl PatientFeatures {
    /// Row in `Age, CENSREG, BirthGender, RaceEthn` order.
    pub fn to_row(&self) -> [f64; NUM_FEATURES] {
        [
            self.age,
            self.region.code(),
            self.gender.code(),
            self.race.code(),
        ]
    }
}

/// Derives classifier inputs, or `None` when age, region or gender cannot be
/// derived. Race always resolves, falling back to [`RaceCode::Other`].
pub fn derive_features(record: &PatientRecord) -> Option<PatientFeatures> {
    let age = record.age.filter(|a| a.is_finite())?;
    let region = record.region.as_deref().and_then(Region::from_location)?;
    let gender = record.gender.as_deref().and_then(GenderCode::from_label)?;
    let race = RaceCode::from_race(record.race_ethnicity.as_ref());
    Some(PatientFeatures {
        age,
        region,
        gender,
        race,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn states_map_to_census_regions() {
        assert_eq!(Region::from_location("New York"), Some(Region::Northeast));
        assert_eq!(Region::from_location("oh"), Some(Region::Midwest));
        assert_eq!(Region::from_location(" Texas "), Some(Region::South));
        assert_eq!(Region::from_location("WA"), Some(Region::West));
        assert_eq!(Region::from_location("West"), Some(Region::West));
        assert_eq!(Region::from_location("Guam"), None);
        assert_eq!(Region::from_location("Puerto Rico"), None);
    }

    #[test]
    fn flag_priority_picks_first_match() {
        assert_eq!(
            RaceCode::from_flags(["Caucasian", "Hispanic"]),
            RaceCode::Hispanic
        );
        assert_eq!(
            RaceCode::from_flags(["Caucasian", "AfricanAmerican"]),
            RaceCode::Black
        );
        assert_eq!(RaceCode::from_flags(["Other"]), RaceCode::Other);
        assert_eq!(RaceCode::from_flags(Vec::<&str>::new()), RaceCode::Other);
    }

    #[test]
    fn labels_fall_back_to_other() {
        assert_eq!(RaceCode::from_label("African American"), RaceCode::Black);
        assert_eq!(RaceCode::from_label("white"), RaceCode::White);
        assert_eq!(RaceCode::from_label("Martian"), RaceCode::Other);
        assert_eq!(RaceCode::from_race(None), RaceCode::Other);
    }

    #[test]
    fn derive_requires_age_region_and_gender() {
        let flags: BTreeSet<String> = ["Asian".to_string()].into_iter().collect();
        let complete = PatientRecord {
            id: 0,
            age: Some(30.0),
            gender: Some("Female".into()),
            region: Some("California".into()),
            race_ethnicity: Some(RaceEthnicity::Flags(flags)),
            ..PatientRecord::default()
        };
        let features = derive_features(&complete).unwrap();
        assert_eq!(features.to_row(), [30.0, 4.0, 2.0, 5.0]);

        let no_region = PatientRecord {
            region: Some("Atlantis".into()),
            ..complete.clone()
        };
        assert!(derive_features(&no_region).is_none());

        let no_gender = PatientRecord {
            gender: None,
            ..complete.clone()
        };
        assert!(derive_features(&no_gender).is_none());

        let no_race = PatientRecord {
            race_ethnicity: None,
            ..complete
        };
        assert_eq!(derive_features(&no_race).unwrap().race, RaceCode::Other);
    }
}

// Patient population: the fixed schema every downstream stage reads, plus the
// loader that resolves arbitrary source tables into it.

pub mod data;
pub mod filter;
pub mod mapping;
pub mod types;

pub use data::{DataError, load_population, normalize};
pub use filter::DemographicFilter;
pub use mapping::{ColumnMapping, StandardField};
pub use types::{PatientRecord, Population, RaceEthnicity, ResolvedSchema};

#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

pub mod aggregate;
pub mod config;
pub mod policy;
pub mod progress;
pub mod simulate;

#[path = "../cohort/mod.rs"]
pub mod cohort;

#[path = "../willingness/mod.rs"]
pub mod willingness;

pub use aggregate::{SimulationResult, site_estimate, staff_estimate, summarize};
pub use config::{ConfigError, SimuTrialConfig, SimulationDefaults};
pub use policy::ConsentPolicy;
pub use progress::{NoopSimulationProgress, SimulationProgressObserver};
pub use simulate::{
    SimulationError, SimulationOptions, SimulationRun, run_simulations, simulate, simulate_run,
};

//! # Consent Simulation Engine
//!
//! A Monte Carlo estimate of how many patients in a population would consent to
//! a trial. Each run makes one independent Bernoulli draw per patient and counts
//! the consents; repeating the run builds a sampling distribution of the count.
//!
//! Patients never interact and each run is a single step, so a run is a plain
//! pass over the population rows. No per-patient agent objects are needed.
//!
//! Every run owns an RNG seeded from `(seed, run_index)` alone. Runs are
//! therefore statistically independent and bit-for-bit reproducible, whether the
//! batch executes sequentially or across the rayon pool.

use crate::aggregate::{SimulationResult, summarize};
use crate::cohort::types::Population;
use crate::policy::ConsentPolicy;
use crate::progress::SimulationProgressObserver;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Cannot simulate an empty population.")]
    EmptyPopulation,
    #[error("Number of simulation runs must be at least 1, got {0}.")]
    InvalidRunCount(usize),
    #[error("Consent probability range [{min}, {max}] is invalid; expected 0 <= min <= max <= 1.")]
    InvalidProbabilityRange { min: f64, max: f64 },
    #[error("Patient {id} has willingness score {value}, which is not a probability in [0, 1].")]
    InvalidProbability { id: usize, value: f64 },
    #[error(
        "{count} patients have no willingness score; the per-patient policy needs a score for every patient."
    )]
    UnscoredPatients { count: usize },
    #[error("Simulation batch was cancelled; partial results were discarded.")]
    Cancelled,
}

impl SimulationError {
    /// True for every rejection of caller input, i.e. everything but cancellation.
    pub fn is_invalid_input(&self) -> bool {
        !matches!(self, SimulationError::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationOptions {
    pub num_runs: usize,
    pub seed: u64,
    /// Spread runs across the rayon pool. Results are identical either way.
    pub parallel: bool,
}

impl SimulationOptions {
    pub fn new(num_runs: usize, seed: u64) -> Self {
        Self {
            num_runs,
            seed,
            parallel: true,
        }
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// One Monte Carlo trial over the whole population.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRun {
    pub run_index: usize,
    /// Consent outcome per patient, in population order.
    pub per_patient_outcomes: Vec<bool>,
    pub consented_count: usize,
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of the RNG stream owned by `run_index`.
pub fn run_seed(seed: u64, run_index: usize) -> u64 {
    splitmix64(seed ^ splitmix64(run_index as u64))
}

/// Executes a single validated run.
pub fn simulate_run(
    population: &Population,
    policy: &ConsentPolicy,
    run_index: usize,
    seed: u64,
) -> Result<SimulationRun, SimulationError> {
    validate_inputs(population, policy, 1)?;
    Ok(execute_run(population, policy, run_index, seed))
}

/// One run over inputs that already passed [`validate_inputs`], so every
/// patient has a probability.
fn execute_run(
    population: &Population,
    policy: &ConsentPolicy,
    run_index: usize,
    seed: u64,
) -> SimulationRun {
    let mut rng = StdRng::seed_from_u64(run_seed(seed, run_index));
    let per_patient_outcomes: Vec<bool> = population
        .iter()
        .map(|record| {
            let p = policy.probability(record, &mut rng);
            let u: f64 = rng.gen_range(0.0..1.0);
            p.is_some_and(|p| u < p)
        })
        .collect();
    let consented = per_patient_outcomes.iter().filter(|&&c| c).count();
    SimulationRun {
        run_index,
        per_patient_outcomes,
        consented_count: consented.min(population.len()),
    }
}

/// Rejects inputs the engine cannot simulate.
pub fn validate_inputs(
    population: &Population,
    policy: &ConsentPolicy,
    num_runs: usize,
) -> Result<(), SimulationError> {
    if num_runs < 1 {
        return Err(SimulationError::InvalidRunCount(num_runs));
    }
    if population.is_empty() {
        return Err(SimulationError::EmptyPopulation);
    }
    policy.validate()?;

    if let ConsentPolicy::PerPatientScore = policy {
        let unscored = population.unscored_count();
        if unscored > 0 {
            return Err(SimulationError::UnscoredPatients { count: unscored });
        }
        for record in population {
            if let Some(value) = record.willingness_score {
                if !(0.0..=1.0).contains(&value) {
                    return Err(SimulationError::InvalidProbability {
                        id: record.id,
                        value,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Runs `options.num_runs` independent trials and returns each run's consent
/// count in run order.
///
/// `observer` is told about every completed run. If `cancel` is raised, no
/// further runs start and the whole batch is discarded with
/// [`SimulationError::Cancelled`].
pub fn run_simulations(
    population: &Population,
    policy: &ConsentPolicy,
    options: &SimulationOptions,
    observer: &dyn SimulationProgressObserver,
    cancel: Option<&AtomicBool>,
) -> Result<Vec<usize>, SimulationError> {
    validate_inputs(population, policy, options.num_runs)?;

    let total = options.num_runs;
    log::info!(
        "Simulating {total} runs over {} patients ({}, seed {}, {})",
        population.len(),
        policy.describe(),
        options.seed,
        if options.parallel {
            "parallel"
        } else {
            "sequential"
        }
    );

    observer.on_start(total);
    let completed = AtomicUsize::new(0);
    let run_one = |run_index: usize| -> Option<usize> {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return None;
        }
        let run = execute_run(population, policy, run_index, options.seed);
        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        observer.on_run_complete(done, total);
        Some(run.consented_count)
    };

    let counts: Option<Vec<usize>> = if options.parallel {
        (0..total).into_par_iter().map(run_one).collect()
    } else {
        (0..total).map(run_one).collect()
    };
    observer.on_finish();

    match counts {
        Some(counts) => {
            log::info!("Completed {} simulation runs", counts.len());
            Ok(counts)
        }
        None => {
            log::warn!(
                "Simulation cancelled after {} of {total} runs; discarding partial results",
                completed.load(Ordering::Relaxed)
            );
            Err(SimulationError::Cancelled)
        }
    }
}

/// Runs the batch and aggregates it into a [`SimulationResult`].
pub fn simulate(
    population: &Population,
    policy: &ConsentPolicy,
    options: &SimulationOptions,
    observer: &dyn SimulationProgressObserver,
    cancel: Option<&AtomicBool>,
) -> Result<SimulationResult, SimulationError> {
    let counts = run_simulations(population, policy, options, observer, cancel)?;
    summarize(&counts, population.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::types::PatientRecord;
    use crate::progress::NoopSimulationProgress;

    /// Records the start total and the highest completion count seen.
    #[derive(Default)]
    struct CountingProgress {
        started: AtomicUsize,
        completed: AtomicUsize,
    }

    impl CountingProgress {
        fn completed(&self) -> usize {
            self.completed.load(Ordering::SeqCst)
        }

        fn started_with(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }
    }

    impl SimulationProgressObserver for CountingProgress {
        fn on_start(&self, total_runs: usize) {
            self.started.store(total_runs, Ordering::SeqCst);
        }

        fn on_run_complete(&self, completed: usize, total_runs: usize) {
            assert!(completed <= total_runs);
            self.completed.fetch_max(completed, Ordering::SeqCst);
        }
    }

    fn scored_population(scores: &[f64]) -> Population {
        Population::from_records(
            scores
                .iter()
                .enumerate()
                .map(|(id, &s)| PatientRecord {
                    id,
                    willingness_score: Some(s),
                    ..PatientRecord::default()
                })
                .collect(),
        )
    }

    #[test]
    fn run_seeds_differ_per_run() {
        let seeds: std::collections::HashSet<u64> = (0..1000).map(|i| run_seed(7, i)).collect();
        assert_eq!(seeds.len(), 1000);
        assert_ne!(run_seed(1, 0), run_seed(2, 0));
    }

    #[test]
    fn certain_outcomes_ignore_the_seed() {
        let population = scored_population(&[0.0, 1.0, 0.0, 1.0]);
        for seed in [0, 1, 99] {
            let run =
                simulate_run(&population, &ConsentPolicy::PerPatientScore, 3, seed).unwrap();
            assert_eq!(run.per_patient_outcomes, vec![false, true, false, true]);
            assert_eq!(run.consented_count, 2);
            assert_eq!(run.run_index, 3);
        }
    }

    #[test]
    fn single_run_rejects_unscored_patients() {
        let population = Population::from_records(
            (0..10)
                .map(|id| PatientRecord {
                    id,
                    ..PatientRecord::default()
                })
                .collect(),
        );
        assert_eq!(
            simulate_run(&population, &ConsentPolicy::PerPatientScore, 0, 4),
            Err(SimulationError::UnscoredPatients { count: 10 })
        );
        assert_eq!(
            simulate_run(&Population::default(), &ConsentPolicy::PerPatientScore, 0, 4),
            Err(SimulationError::EmptyPopulation)
        );
        let range = ConsentPolicy::Range { min: 1.0, max: 1.0 };
        let run = simulate_run(&population, &range, 0, 4).unwrap();
        assert_eq!(run.consented_count, 10);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let population = scored_population(&[0.3; 250]);
        let options = SimulationOptions::new(64, 2024);
        let parallel = run_simulations(
            &population,
            &ConsentPolicy::PerPatientScore,
            &options,
            &NoopSimulationProgress,
            None,
        )
        .unwrap();
        let sequential = run_simulations(
            &population,
            &ConsentPolicy::PerPatientScore,
            &options.sequential(),
            &NoopSimulationProgress,
            None,
        )
        .unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn invalid_inputs_are_rejected_before_running() {
        let progress = CountingProgress::default();
        let empty = Population::default();
        assert_eq!(
            run_simulations(
                &empty,
                &ConsentPolicy::PerPatientScore,
                &SimulationOptions::new(10, 0),
                &progress,
                None
            ),
            Err(SimulationError::EmptyPopulation)
        );

        let population = scored_population(&[0.5]);
        assert_eq!(
            run_simulations(
                &population,
                &ConsentPolicy::PerPatientScore,
                &SimulationOptions::new(0, 0),
                &progress,
                None
            ),
            Err(SimulationError::InvalidRunCount(0))
        );
        assert_eq!(progress.started_with(), 0);
        assert_eq!(progress.completed(), 0);
    }

    #[test]
    fn unscored_and_out_of_range_scores_are_rejected() {
        let mut population = scored_population(&[0.5, 0.5]);
        population.records[1].willingness_score = None;
        assert_eq!(
            validate_inputs(&population, &ConsentPolicy::PerPatientScore, 1),
            Err(SimulationError::UnscoredPatients { count: 1 })
        );
        // Range policy does not read scores.
        assert!(validate_inputs(&population, &ConsentPolicy::Range { min: 0.1, max: 0.2 }, 1).is_ok());

        let population = scored_population(&[0.5, 1.5]);
        assert_eq!(
            validate_inputs(&population, &ConsentPolicy::PerPatientScore, 1),
            Err(SimulationError::InvalidProbability { id: 1, value: 1.5 })
        );
    }

    #[test]
    fn raised_cancel_flag_discards_batch() {
        let population = scored_population(&[0.5; 10]);
        let cancel = AtomicBool::new(true);
        let result = run_simulations(
            &population,
            &ConsentPolicy::PerPatientScore,
            &SimulationOptions::new(20, 1),
            &NoopSimulationProgress,
            Some(&cancel),
        );
        assert_eq!(result, Err(SimulationError::Cancelled));
        assert!(!SimulationError::Cancelled.is_invalid_input());
    }

    #[test]
    fn observer_sees_every_run() {
        let population = scored_population(&[0.5; 10]);
        let progress = CountingProgress::default();
        run_simulations(
            &population,
            &ConsentPolicy::Range { min: 0.2, max: 0.8 },
            &SimulationOptions::new(37, 5),
            &progress,
            None,
        )
        .unwrap();
        assert_eq!(progress.started_with(), 37);
        assert_eq!(progress.completed(), 37);
    }
}

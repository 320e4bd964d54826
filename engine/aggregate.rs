use crate::simulate::SimulationError;
use serde::{Deserialize, Serialize};

/// Enrolled patients one coordinator can handle.
pub const STAFF_CAPACITY: usize = 50;
/// Enrolled patients one site can handle.
pub const SITE_CAPACITY: usize = 100;

/// z-score of the two-sided 95% normal interval.
const Z_95: f64 = 1.96;

pub fn staff_estimate(consented: usize) -> usize {
    (consented / STAFF_CAPACITY).max(1)
}

pub fn site_estimate(consented: usize) -> usize {
    (consented / SITE_CAPACITY).max(1)
}

/// Summary of a completed simulation batch. Rates are percentages of the
/// population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub num_runs: usize,
    pub population_size: usize,
    pub mean_consent_rate: f64,
    pub confidence_interval_halfwidth: f64,
    pub mean_staff_estimate: f64,
    pub mean_site_estimate: f64,
    pub per_run_consent_counts: Vec<usize>,
    pub per_run_staff: Vec<usize>,
    pub per_run_site: Vec<usize>,
}

impl SimulationResult {
    pub fn mean_consented(&self) -> f64 {
        self.mean_consent_rate / 100.0 * self.population_size as f64
    }
}

/// Folds per-run consent counts into a [`SimulationResult`].
///
/// Sums are accumulated as integers so the result is identical for any
/// ordering of `counts`. The standard deviation divides by `N`.
pub fn summarize(
    counts: &[usize],
    population_size: usize,
) -> Result<SimulationResult, SimulationError> {
    if counts.is_empty() {
        return Err(SimulationError::InvalidRunCount(0));
    }
    if population_size == 0 {
        return Err(SimulationError::EmptyPopulation);
    }

    let n = counts.len() as u128;
    let sum: u128 = counts.iter().map(|&c| c as u128).sum();
    let sum_sq: u128 = counts.iter().map(|&c| (c as u128) * (c as u128)).sum();
    // n * sum_sq >= sum^2 by Cauchy-Schwarz, so this never underflows.
    let variance = (n * sum_sq - sum * sum) as f64 / (n * n) as f64;
    let mean = sum as f64 / n as f64;
    let std = variance.sqrt();

    let pop = population_size as f64;
    let mean_consent_rate = mean / pop * 100.0;
    let confidence_interval_halfwidth = std * Z_95 / (n as f64).sqrt() / pop * 100.0;

    let per_run_staff: Vec<usize> = counts.iter().map(|&c| staff_estimate(c)).collect();
    let per_run_site: Vec<usize> = counts.iter().map(|&c| site_estimate(c)).collect();
    let mean_staff_estimate = per_run_staff.iter().sum::<usize>() as f64 / n as f64;
    let mean_site_estimate = per_run_site.iter().sum::<usize>() as f64 / n as f64;

    log::debug!(
        "Aggregated {n} runs: mean rate {mean_consent_rate:.3}%, CI ±{confidence_interval_halfwidth:.3}%"
    );

    Ok(SimulationResult {
        num_runs: counts.len(),
        population_size,
        mean_consent_rate,
        confidence_interval_halfwidth,
        mean_staff_estimate,
        mean_site_estimate,
        per_run_consent_counts: counts.to_vec(),
        per_run_staff,
        per_run_site,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn estimates_have_a_floor_of_one() {
        assert_eq!(staff_estimate(0), 1);
        assert_eq!(staff_estimate(49), 1);
        assert_eq!(staff_estimate(100), 2);
        assert_eq!(staff_estimate(149), 2);
        assert_eq!(site_estimate(0), 1);
        assert_eq!(site_estimate(199), 1);
        assert_eq!(site_estimate(200), 2);
    }

    #[test]
    fn estimates_are_monotone() {
        for c in 0..2_000 {
            assert!(staff_estimate(c) <= staff_estimate(c + 1));
            assert!(site_estimate(c) <= site_estimate(c + 1));
        }
    }

    #[test]
    fn summary_of_known_counts() {
        // Counts 40, 60 out of 200: mean 50, population std 10.
        let result = summarize(&[40, 60], 200).unwrap();
        assert_eq!(result.num_runs, 2);
        assert_abs_diff_eq!(result.mean_consent_rate, 25.0, epsilon = 1e-12);
        let expected_ci = 10.0 * 1.96 / 2f64.sqrt() / 200.0 * 100.0;
        assert_abs_diff_eq!(result.confidence_interval_halfwidth, expected_ci, epsilon = 1e-12);
        assert_eq!(result.per_run_staff, vec![1, 1]);
        assert_eq!(result.per_run_site, vec![1, 1]);
        assert_abs_diff_eq!(result.mean_consented(), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn identical_counts_have_zero_interval() {
        let result = summarize(&[120; 30], 300).unwrap();
        assert_abs_diff_eq!(result.mean_consent_rate, 40.0, epsilon = 1e-12);
        assert_eq!(result.confidence_interval_halfwidth, 0.0);
        assert_abs_diff_eq!(result.mean_staff_estimate, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.mean_site_estimate, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn ordering_does_not_change_statistics() {
        let counts = vec![3, 17, 250, 99, 4, 61, 61, 180];
        let mut reversed = counts.clone();
        reversed.reverse();
        let a = summarize(&counts, 400).unwrap();
        let b = summarize(&reversed, 400).unwrap();
        assert_eq!(a.mean_consent_rate, b.mean_consent_rate);
        assert_eq!(a.confidence_interval_halfwidth, b.confidence_interval_halfwidth);
        assert_eq!(a.mean_staff_estimate, b.mean_staff_estimate);
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert_eq!(summarize(&[], 10), Err(SimulationError::InvalidRunCount(0)));
        assert_eq!(summarize(&[1], 0), Err(SimulationError::EmptyPopulation));
    }
}

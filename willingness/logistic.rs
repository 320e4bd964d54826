use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use ndarray_linalg::Solve;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of the IRLS convergence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    /// Relative deviance change fell below tolerance.
    Converged,
    /// Ran out of iterations. Coefficients are the last accepted iterate.
    MaxIterationsReached,
    /// The weighted normal equations became singular or no step reduced the
    /// deviance, typically from (quasi-)perfect separation. Coefficients are the
    /// last accepted iterate.
    Unstable,
}

#[derive(Error, Debug, PartialEq)]
pub enum FitError {
    #[error("Cannot fit a classifier on an empty design matrix.")]
    EmptyDesign,
    #[error("Design matrix has {rows} rows but {labels} labels were supplied.")]
    DimensionMismatch { rows: usize, labels: usize },
    #[error("Non-finite values (NaN or Infinity) were found in the classifier input.")]
    NonFiniteInput,
    #[error("Labels must be 0 or 1, found {0}.")]
    InvalidLabel(f64),
}

/// Per-column standardization (zero mean, unit variance). Columns with zero
/// variance are centred but not scaled.
#[derive(Clone, Debug, PartialEq)]
pub struct Standardizer {
    pub means: Array1<f64>,
    pub scales: Array1<f64>,
}

impl Standardizer {
    pub fn fit(x: ArrayView2<f64>) -> Self {
        let ncols = x.ncols();
        let means = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(ncols));
        let scales = if x.nrows() == 0 {
            Array1::ones(ncols)
        } else {
            x.std_axis(Axis(0), 0.0)
                .mapv(|sd| if sd > 1e-12 && sd.is_finite() { sd } else { 1.0 })
        };
        Self { means, scales }
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Array2<f64> {
        (&x - &self.means) / &self.scales
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FitOptions {
    pub max_iterations: usize,
    pub convergence_tolerance: f64,
    /// Added to the diagonal of X'WX for every non-intercept coefficient.
    pub ridge: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            convergence_tolerance: 1e-8,
            ridge: 1e-6,
        }
    }
}

/// A fitted binary logistic classifier. `coefficients[0]` is the intercept.
#[derive(Clone, Debug)]
pub struct LogisticFit {
    pub coefficients: Array1<f64>,
    pub status: FitStatus,
    pub iterations: usize,
    pub deviance: f64,
}

impl LogisticFit {
    pub fn linear_predictor(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients.slice(s![1..])) + self.coefficients[0]
    }

    /// Probability of the positive class for every row of `x`.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let eta = self.linear_predictor(x);
        eta.mapv(|e| {
            let e = e.clamp(-700.0, 700.0);
            (1.0 / (1.0 + f64::exp(-e))).clamp(PROB_EPS, 1.0 - PROB_EPS)
        })
    }
}

const PROB_EPS: f64 = 1e-8;
const MIN_WEIGHT: f64 = 1e-6;
const MAX_STEP_HALVINGS: usize = 30;

/// Working vectors `(mu, weights, z)` for the logit link at the current `eta`.
pub fn update_logit_vectors(
    y: ArrayView1<f64>,
    eta: &Array1<f64>,
) -> (Array1<f64>, Array1<f64>, Array1<f64>) {
    let eta_clamped = eta.mapv(|e| e.clamp(-700.0, 700.0));
    let mu = eta_clamped.mapv(|e| (1.0 / (1.0 + (-e).exp())).clamp(PROB_EPS, 1.0 - PROB_EPS));
    let weights = (&mu * (1.0 - &mu)).mapv(|v| v.max(MIN_WEIGHT));
    let residual = &y - &mu;
    let z = &eta_clamped + &(&residual / &weights);
    (mu, weights, z)
}

/// Binomial deviance, -2 times the log-likelihood.
pub fn logit_deviance(y: ArrayView1<f64>, mu: &Array1<f64>) -> f64 {
    let total = ndarray::Zip::from(y).and(mu).fold(0.0, |acc, &yi, &mui| {
        let mui = mui.clamp(PROB_EPS, 1.0 - PROB_EPS);
        let term1 = if yi > PROB_EPS {
            yi * (yi.ln() - mui.ln())
        } else {
            0.0
        };
        let term2 = if yi < 1.0 - PROB_EPS {
            (1.0 - yi) * ((1.0 - yi).ln() - (1.0 - mui).ln())
        } else {
            0.0
        };
        acc + term1 + term2
    });
    2.0 * total
}

fn with_intercept(x: ArrayView2<f64>) -> Array2<f64> {
    let mut design = Array2::ones((x.nrows(), x.ncols() + 1));
    design.slice_mut(s![.., 1..]).assign(&x);
    design
}

/// Fits `P(y = 1 | x)` by iteratively reweighted least squares with step halving.
///
/// Non-convergence is not an error: the last accepted iterate is returned and
/// the outcome is reported through [`FitStatus`].
pub fn fit_logistic(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    options: &FitOptions,
) -> Result<LogisticFit, FitError> {
    if x.nrows() == 0 {
        return Err(FitError::EmptyDesign);
    }
    if x.nrows() != y.len() {
        return Err(FitError::DimensionMismatch {
            rows: x.nrows(),
            labels: y.len(),
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(FitError::NonFiniteInput);
    }
    if let Some(&bad) = y.iter().find(|&&v| v != 0.0 && v != 1.0) {
        return Err(FitError::InvalidLabel(bad));
    }

    let design = with_intercept(x);
    let k = design.ncols();

    let mut beta = Array1::<f64>::zeros(k);
    let (mu, mut weights, mut z) = update_logit_vectors(y, &design.dot(&beta));
    let mut deviance = logit_deviance(y, &mu);
    let mut status = FitStatus::MaxIterationsReached;
    let mut iterations = 0;

    log::debug!(
        "Starting IRLS on {} rows x {} coefficients, initial deviance {:.6}",
        design.nrows(),
        k,
        deviance
    );

    for iter in 1..=options.max_iterations {
        iterations = iter;

        let weighted = &design * &weights.view().insert_axis(Axis(1));
        let mut xtwx = weighted.t().dot(&design);
        for j in 1..k {
            xtwx[[j, j]] += options.ridge;
        }
        let rhs = weighted.t().dot(&z);

        let proposal = match xtwx.solve_into(rhs) {
            Ok(solution) => solution,
            Err(err) => {
                log::warn!("IRLS normal equations could not be solved at iteration {iter}: {err}");
                status = FitStatus::Unstable;
                break;
            }
        };

        // Step halving until the deviance does not increase.
        let direction = &proposal - &beta;
        let mut step = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_STEP_HALVINGS {
            let trial_beta = &beta + &(&direction * step);
            let trial_eta = design.dot(&trial_beta);
            let (trial_mu, trial_weights, trial_z) = update_logit_vectors(y, &trial_eta);
            let trial_deviance = logit_deviance(y, &trial_mu);
            if trial_deviance.is_finite() && trial_deviance <= deviance * (1.0 + 1e-12) + 1e-12 {
                accepted = Some((trial_beta, trial_weights, trial_z, trial_deviance));
                break;
            }
            step *= 0.5;
        }

        let Some((next_beta, next_weights, next_z, next_deviance)) = accepted else {
            log::warn!("IRLS step halving failed to reduce deviance at iteration {iter}");
            status = FitStatus::Unstable;
            break;
        };

        let change = (deviance - next_deviance).abs() / (next_deviance.abs() + 0.1);
        log::debug!(
            "IRLS iteration {iter}: deviance {next_deviance:.6}, relative change {change:.3e}, step {step}"
        );

        beta = next_beta;
        weights = next_weights;
        z = next_z;
        deviance = next_deviance;

        if change < options.convergence_tolerance {
            status = FitStatus::Converged;
            break;
        }
    }

    if status != FitStatus::Converged {
        log::warn!(
            "Logistic fit did not converge ({status:?}) after {iterations} iterations; using best-effort coefficients"
        );
    } else {
        log::info!("Logistic fit converged in {iterations} iterations (deviance {deviance:.4})");
    }

    Ok(LogisticFit {
        coefficients: beta,
        status,
        iterations,
        deviance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn simulate_logistic(
        n: usize,
        intercept: f64,
        slope: f64,
        seed: u64,
    ) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = Array2::zeros((n, 1));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let xi: f64 = rng.gen_range(-2.0..2.0);
            let p = 1.0 / (1.0 + (-(intercept + slope * xi)).exp());
            x[[i, 0]] = xi;
            y[i] = if rng.gen_range(0.0..1.0) < p { 1.0 } else { 0.0 };
        }
        (x, y)
    }

    #[test]
    fn recovers_known_coefficients() {
        let (x, y) = simulate_logistic(20_000, -0.5, 1.5, 42);
        let fit = fit_logistic(x.view(), y.view(), &FitOptions::default()).unwrap();
        assert_eq!(fit.status, FitStatus::Converged);
        assert_abs_diff_eq!(fit.coefficients[0], -0.5, epsilon = 0.1);
        assert_abs_diff_eq!(fit.coefficients[1], 1.5, epsilon = 0.1);
    }

    #[test]
    fn separable_data_returns_best_effort_probabilities() {
        let x = array![[-3.0], [-2.0], [-1.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let options = FitOptions {
            max_iterations: 5,
            ..FitOptions::default()
        };
        let fit = fit_logistic(x.view(), y.view(), &options).unwrap();
        assert_ne!(fit.status, FitStatus::Converged);
        let probs = fit.predict_proba(x.view());
        assert!(probs.iter().all(|&p| p > 0.0 && p < 1.0));
        assert!(probs[0] < 0.5 && probs[5] > 0.5);
    }

    #[test]
    fn rejects_mismatched_labels() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0];
        assert_eq!(
            fit_logistic(x.view(), y.view(), &FitOptions::default()).unwrap_err(),
            FitError::DimensionMismatch { rows: 2, labels: 1 }
        );
        let y = array![1.0, 2.0];
        assert_eq!(
            fit_logistic(x.view(), y.view(), &FitOptions::default()).unwrap_err(),
            FitError::InvalidLabel(2.0)
        );
    }

    #[test]
    fn standardizer_centres_and_scales() {
        let x = array![[1.0, 5.0], [3.0, 5.0], [5.0, 5.0]];
        let scaler = Standardizer::fit(x.view());
        let t = scaler.transform(x.view());
        assert_abs_diff_eq!(t.column(0).mean().unwrap(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(t.column(0).std(0.0), 1.0, epsilon = 1e-12);
        // Constant column: centred, unit scale.
        assert_eq!(scaler.scales[1], 1.0);
        assert!(t.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn deviance_is_zero_for_perfect_predictions() {
        let y = array![0.0, 1.0];
        let mu = array![0.0, 1.0];
        assert_abs_diff_eq!(logit_deviance(y.view(), &mu), 0.0, epsilon = 1e-6);
    }
}

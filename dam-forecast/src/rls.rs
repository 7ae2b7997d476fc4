use crate::{ForecastError, Matrix, linalg::dot};
use tracing::{Level, event};

/// The initial covariance scale: `P₀ = λ·I`
pub const DEFAULT_LAMBDA: f64 = 100.0;

// Relative margin of the divergence band around the observed targets
const BAND_MARGIN: f64 = 0.1;

/// What happened to the estimator on an observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Update {
    /// The coefficients absorbed the sample
    Updated,
    /// The step diverged and the estimator was reset to its initial state
    Reinitialized,
    /// The sample contained non-finite values and was ignored
    Skipped,
}

/// An online linear estimator using recursive least squares.
///
/// The state is the coefficient vector `θ` and the covariance `P`. For each
/// sample `(x, y)`:
///
/// ```text
/// g = P·x / (f + xᵗ·P·x)
/// θ ← θ + g·(y − xᵗ·θ)
/// P ← (P − g·xᵗ·P) / f
/// ```
///
/// where `f` is the forgetting factor. The estimator tracks a band around the
/// targets it has seen; when the fit leaves the band (or becomes non-finite),
/// `P` is probed with a Cholesky factorization and the estimator is reset if
/// it is no longer positive definite.
#[derive(Clone, Debug)]
pub struct RecursiveLeastSquares {
    theta: Vec<f64>,
    covariance: Matrix,
    lambda: f64,
    forgetting: f64,
    observed: Option<(f64, f64)>,
}

impl RecursiveLeastSquares {
    /// A fresh estimator with `dim` coefficients, `λ = 100` and no forgetting
    pub fn new(dim: usize) -> Self {
        Self {
            theta: vec![0.0; dim],
            covariance: Matrix::scaled_identity(dim, DEFAULT_LAMBDA),
            lambda: DEFAULT_LAMBDA,
            forgetting: 1.0,
            observed: None,
        }
    }

    /// Use a different initial covariance scale
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self.covariance = Matrix::scaled_identity(self.dim(), lambda);
        self
    }

    /// Use a forgetting factor in (0, 1]
    pub fn with_forgetting(mut self, forgetting: f64) -> Self {
        self.forgetting = forgetting;
        self
    }

    /// The number of coefficients
    pub fn dim(&self) -> usize {
        self.theta.len()
    }

    /// The current coefficients
    pub fn theta(&self) -> &[f64] {
        &self.theta
    }

    /// The current covariance
    pub fn covariance(&self) -> &Matrix {
        &self.covariance
    }

    /// Mutable access to the covariance
    pub fn covariance_mut(&mut self) -> &mut Matrix {
        &mut self.covariance
    }

    /// The divergence band `(lower, upper)`, once a sample has been seen
    pub fn band(&self) -> Option<(f64, f64)> {
        self.observed.map(|(min, max)| {
            (
                min - BAND_MARGIN * min.abs(),
                max + BAND_MARGIN * max.abs(),
            )
        })
    }

    /// The fitted value `xᵗ·θ`
    pub fn predict(&self, x: &[f64]) -> Result<f64, ForecastError> {
        self.check_dim(x)?;
        Ok(dot(x, &self.theta))
    }

    /// Whether the covariance is still positive definite
    pub fn is_positive_definite(&self) -> bool {
        self.covariance.cholesky().is_some()
    }

    /// Reset `θ` to zero and `P` to `λ·I`. The band is kept.
    pub fn reinitialize(&mut self) {
        self.theta.iter_mut().for_each(|t| *t = 0.0);
        self.covariance = Matrix::scaled_identity(self.dim(), self.lambda);
    }

    /// Reset the estimator if its coefficients are non-finite or its
    /// covariance fails the positive-definiteness probe. Returns whether a
    /// reset happened.
    pub fn repair_if_unstable(&mut self) -> bool {
        let healthy = self.theta.iter().all(|t| t.is_finite()) && self.is_positive_definite();
        if !healthy {
            event!(Level::DEBUG, dim = self.dim(), "reinitializing estimator");
            self.reinitialize();
        }
        !healthy
    }

    /// Absorb one sample
    pub fn observe(&mut self, x: &[f64], y: f64) -> Result<Update, ForecastError> {
        self.check_dim(x)?;
        if !y.is_finite() || x.iter().any(|v| !v.is_finite()) {
            return Ok(Update::Skipped);
        }

        let px = self.covariance.mul_vec(x);
        let denominator = self.forgetting + dot(x, &px);
        let gain = px.iter().map(|p| p / denominator).collect::<Vec<_>>();
        let error = y - dot(x, &self.theta);

        for (t, g) in self.theta.iter_mut().zip(&gain) {
            *t += g * error;
        }
        let xtp = self.covariance.vec_mul(x);
        self.covariance
            .rank_one_downdate(&gain, &xtp, self.forgetting);

        self.observed = Some(match self.observed {
            Some((min, max)) => (min.min(y), max.max(y)),
            None => (y, y),
        });

        let fit = dot(x, &self.theta);
        let diverging = match self.band() {
            Some((lower, upper)) => !fit.is_finite() || fit < lower || fit > upper,
            None => !fit.is_finite(),
        };

        if diverging && self.repair_if_unstable() {
            Ok(Update::Reinitialized)
        } else {
            Ok(Update::Updated)
        }
    }

    fn check_dim(&self, x: &[f64]) -> Result<(), ForecastError> {
        if x.len() == self.dim() {
            Ok(())
        } else {
            Err(ForecastError::DimensionMismatch {
                expected: self.dim(),
                actual: x.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn converges_on_a_line() {
        let mut rls = RecursiveLeastSquares::new(2);
        for i in 0..200 {
            let x = (i % 20) as f64 / 2.0 - 5.0;
            let update = rls.observe(&[1.0, x], 3.0 + 2.0 * x).unwrap();
            assert_eq!(update, Update::Updated);
        }
        assert_abs_diff_eq!(rls.theta()[0], 3.0, epsilon = 1e-3);
        assert_abs_diff_eq!(rls.theta()[1], 2.0, epsilon = 1e-3);
        assert!(rls.is_positive_definite());
    }

    #[test]
    fn repairs_indefinite_covariance() {
        let mut rls = RecursiveLeastSquares::new(2);
        rls.observe(&[1.0, 1.0], 5.0).unwrap();
        assert!(rls.theta().iter().any(|t| *t != 0.0));

        *rls.covariance_mut() = Matrix::scaled_identity(2, -1.0);
        assert!(!rls.is_positive_definite());
        assert!(rls.repair_if_unstable());

        assert_eq!(rls.theta(), &[0.0, 0.0]);
        assert_eq!(rls.covariance(), &Matrix::scaled_identity(2, DEFAULT_LAMBDA));
        assert!(!rls.repair_if_unstable());
    }

    #[test]
    fn diverging_step_reinitializes() {
        let mut rls = RecursiveLeastSquares::new(2);
        rls.observe(&[1.0, 0.0], 1.0).unwrap();

        // A poisoned covariance makes the next step blow up
        rls.covariance_mut()[(1, 1)] = f64::INFINITY;
        let update = rls.observe(&[1.0, 1.0], 1.0).unwrap();

        assert_eq!(update, Update::Reinitialized);
        assert_eq!(rls.theta(), &[0.0, 0.0]);
        assert!(rls.is_positive_definite());
    }

    #[test]
    fn non_finite_samples_are_skipped() {
        let mut rls = RecursiveLeastSquares::new(1);
        assert_eq!(rls.observe(&[f64::NAN], 1.0).unwrap(), Update::Skipped);
        assert_eq!(rls.observe(&[1.0], f64::INFINITY).unwrap(), Update::Skipped);
        assert_eq!(rls.theta(), &[0.0]);
        assert_eq!(rls.band(), None);
    }

    #[test]
    fn wrong_dimension_is_an_error() {
        let mut rls = RecursiveLeastSquares::new(3);
        assert_eq!(
            rls.observe(&[1.0], 0.0),
            Err(ForecastError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        );
    }

    #[test]
    fn band_is_asymmetric_around_extremes() {
        let mut rls = RecursiveLeastSquares::new(1);
        rls.observe(&[1.0], -10.0).unwrap();
        rls.observe(&[1.0], 20.0).unwrap();
        let (lower, upper) = rls.band().unwrap();
        assert_abs_diff_eq!(lower, -11.0);
        assert_abs_diff_eq!(upper, 22.0);
    }
}

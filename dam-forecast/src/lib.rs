#![warn(missing_docs)]
//! Online forecasting of inter-area exchange flows and storage dispatch.
//!
//! Every forecasted quantity is a [`ForecastSeries`]: a linear regression with
//! an intercept whose coefficients are re-estimated daily by a
//! [`RecursiveLeastSquares`] estimator. Re-estimation is packaged into
//! self-contained [`ForecastJob`]s that own their series while they run, so a
//! caller can run them concurrently and hand the results back afterwards.

use thiserror::Error;

mod exchange;
pub use exchange::ExchangeFlowForecaster;

mod linalg;
pub use linalg::Matrix;

mod rls;
pub use rls::{DEFAULT_LAMBDA, RecursiveLeastSquares, Update};

mod series;
pub use series::{Clip, ForecastJob, ForecastSeries, JobOutput, Sample};

mod storage;
pub use storage::StorageDispatchForecaster;

/// Residual demand enters every regression in GW rather than MW
pub const MW_PER_GW: f64 = 1000.0;

/// Errors raised by the estimators
#[derive(Debug, Error, PartialEq)]
pub enum ForecastError {
    /// A regressor vector of the wrong length was supplied
    #[error("expected {expected} regressors, got {actual}")]
    DimensionMismatch {
        /// The estimator's dimension
        expected: usize,
        /// The supplied length
        actual: usize,
    },
}

use crate::{RecursiveLeastSquares, Update};
use dam_core::models::{Day, Forecast};

/// One training observation: the regressors (without intercept) and target
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// The regressors, excluding the intercept
    pub regressors: Vec<f64>,
    /// The realized target
    pub target: f64,
}

/// A linear regression with intercept, re-estimated online.
#[derive(Clone, Debug)]
pub struct ForecastSeries {
    estimator: RecursiveLeastSquares,
    observed: Option<(f64, f64)>,
}

impl ForecastSeries {
    /// A series over `regressors` explanatory variables plus an intercept
    pub fn new(regressors: usize) -> Self {
        Self {
            estimator: RecursiveLeastSquares::new(regressors + 1),
            observed: None,
        }
    }

    /// The underlying estimator
    pub fn estimator(&self) -> &RecursiveLeastSquares {
        &self.estimator
    }

    /// The intercept θ₀
    pub fn constant(&self) -> f64 {
        self.estimator.theta()[0]
    }

    /// The smallest and largest realized targets seen so far
    pub fn observed_range(&self) -> Option<(f64, f64)> {
        self.observed
    }

    fn with_intercept(regressors: &[f64]) -> Vec<f64> {
        std::iter::once(1.0)
            .chain(regressors.iter().copied())
            .collect()
    }

    /// Absorb the samples in order, returning how many steps reinitialized
    /// the estimator.
    pub fn train(&mut self, samples: &[Sample]) -> usize {
        let mut resets = 0;
        for sample in samples {
            let x = Self::with_intercept(&sample.regressors);
            match self.estimator.observe(&x, sample.target) {
                Ok(Update::Reinitialized) => resets += 1,
                Ok(Update::Skipped) | Err(_) => continue,
                Ok(Update::Updated) => {}
            }
            self.observed = Some(match self.observed {
                Some((min, max)) => (min.min(sample.target), max.max(sample.target)),
                None => (sample.target, sample.target),
            });
        }
        resets
    }

    /// The fitted value for one set of regressors; zero if the regressors do
    /// not fit the series
    pub fn predict(&self, regressors: &[f64]) -> f64 {
        self.estimator
            .predict(&Self::with_intercept(regressors))
            .unwrap_or_default()
    }
}

/// How projected values are bounded.
#[derive(Clone, Debug, PartialEq)]
pub enum Clip {
    /// Per-hour `(lower, upper)` bounds
    Hourly(Vec<(f64, f64)>),
    /// The range of realized targets; zero before any observation
    Observed,
}

/// A self-contained re-estimation of one series: train on the realized
/// samples, then project the forecast. The job owns the series while it runs.
#[derive(Debug)]
pub struct ForecastJob<K> {
    /// Which series this is
    pub key: K,
    /// The series being re-estimated
    pub series: ForecastSeries,
    /// Yesterday's realized samples
    pub samples: Vec<Sample>,
    /// Regressors for each projected hour, starting at hour 0 of `origin`
    pub projection: Vec<Vec<f64>>,
    /// Bounds applied to the projection
    pub clip: Clip,
    /// The forecast origin
    pub origin: Day,
}

/// The product of a [`ForecastJob`]
#[derive(Debug)]
pub struct JobOutput<K> {
    /// Which series this is
    pub key: K,
    /// The series, handed back to its owner
    pub series: ForecastSeries,
    /// The projected forecast
    pub forecast: Forecast,
    /// How many training steps reset the estimator
    pub resets: usize,
}

impl<K> ForecastJob<K> {
    /// Train and project
    pub fn run(self) -> JobOutput<K> {
        let Self {
            key,
            mut series,
            samples,
            projection,
            clip,
            origin,
        } = self;

        let resets = series.train(&samples);

        let values = projection
            .iter()
            .enumerate()
            .map(|(h, regressors)| {
                let value = series.predict(regressors);
                let (lower, upper) = match &clip {
                    Clip::Hourly(bounds) => bounds.get(h).copied().unwrap_or((0.0, 0.0)),
                    Clip::Observed => series.observed_range().unwrap_or((0.0, 0.0)),
                };
                if value.is_finite() {
                    value.clamp(lower, upper)
                } else {
                    0.0
                }
            })
            .collect();

        JobOutput {
            key,
            series,
            forecast: Forecast::new(origin, values),
            resets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn samples() -> Vec<Sample> {
        (0..60)
            .map(|i| {
                let x = (i % 12) as f64;
                Sample {
                    regressors: vec![x],
                    target: 5.0 - 0.5 * x,
                }
            })
            .collect()
    }

    #[test]
    fn intercept_is_exposed() {
        let mut series = ForecastSeries::new(1);
        series.train(&samples());
        assert_abs_diff_eq!(series.constant(), 5.0, epsilon = 1e-3);
        assert_eq!(series.observed_range(), Some((-0.5, 5.0)));
    }

    #[test]
    fn projection_is_clipped() {
        let job = ForecastJob {
            key: "s",
            series: ForecastSeries::new(1),
            samples: samples(),
            projection: vec![vec![0.0], vec![20.0], vec![-20.0]],
            clip: Clip::Observed,
            origin: Day::new(2030, 1),
        };
        let output = job.run();
        let values = output.forecast.values();
        assert_abs_diff_eq!(values[0], 5.0, epsilon = 1e-3);
        assert_eq!(values[1], -0.5);
        assert_eq!(values[2], 5.0);
        assert_eq!(output.resets, 0);
    }

    #[test]
    fn untrained_series_projects_zero() {
        let job = ForecastJob {
            key: 0,
            series: ForecastSeries::new(2),
            samples: Vec::new(),
            projection: vec![vec![1.0, 1.0]; 3],
            clip: Clip::Hourly(vec![(-1.0, 1.0); 3]),
            origin: Day::new(2030, 1),
        };
        assert_eq!(job.run().forecast.values(), &[0.0, 0.0, 0.0]);
    }
}

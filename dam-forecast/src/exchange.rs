use crate::{Clip, ForecastJob, ForecastSeries, JobOutput, MW_PER_GW, Sample};
use dam_core::{
    models::{AreaId, Day, FlowMatrix, Forecast, HOURS_PER_DAY, HourStamp, Map},
    ports::{CapacityProvider, DemandAndRenewableSource},
};
use tracing::{Level, event};

/// The key of an exchange series: the ordered `(from, to)` pair
pub type PairKey = (AreaId, AreaId);

/// 1.0 when available capacity falls short of residual load, else 0.0.
///
/// The ratio `available / residual` is clamped into [0.5, 2.0]; a residual
/// load of zero or below counts as a comfortable ratio of 2.0.
pub fn scarcity_dummy(available: f64, residual: f64) -> f64 {
    let ratio = if residual <= 0.0 {
        2.0
    } else {
        (available / residual).clamp(0.5, 2.0)
    };
    if ratio < 1.0 { 1.0 } else { 0.0 }
}

/// Forecasts the netted flow between every ordered pair of coupled areas
/// that share an interconnector.
///
/// Regressors: the residual load (GW) of every coupled area, then the
/// scarcity dummies of the two endpoints. Forecasts are clipped into
/// `[−capacity(to→from), capacity(from→to)]` hour by hour.
#[derive(Debug)]
pub struct ExchangeFlowForecaster {
    areas: Vec<AreaId>,
    keys: Vec<PairKey>,
    series: Map<PairKey, ForecastSeries>,
    forecasts: Map<PairKey, Forecast>,
    horizon_days: usize,
}

impl ExchangeFlowForecaster {
    /// Set up one series per connected ordered pair of the coupled `areas`.
    /// Connectivity is read from the interconnection capacities of `start`.
    pub fn new(
        areas: Vec<AreaId>,
        capacities: &dyn CapacityProvider,
        start: Day,
        horizon_days: usize,
    ) -> Self {
        let linked = |a: &AreaId, b: &AreaId| {
            (0..HOURS_PER_DAY).any(|h| {
                let stamp = start.hour(h);
                capacities.interconnection_capacity(a, b, stamp.year, stamp.hour_of_year) > 0.0
                    || capacities.interconnection_capacity(b, a, stamp.year, stamp.hour_of_year)
                        > 0.0
            })
        };

        let mut keys = Vec::new();
        for from in areas.iter() {
            for to in areas.iter() {
                if from != to && linked(from, to) {
                    keys.push((from.clone(), to.clone()));
                }
            }
        }

        let series = keys
            .iter()
            .map(|key| (key.clone(), ForecastSeries::new(areas.len() + 2)))
            .collect();

        Self {
            areas,
            keys,
            series,
            forecasts: Map::default(),
            horizon_days,
        }
    }

    /// The ordered pairs being forecasted
    pub fn keys(&self) -> &[PairKey] {
        &self.keys
    }

    /// The latest forecasts
    pub fn forecasts(&self) -> &Map<PairKey, Forecast> {
        &self.forecasts
    }

    /// A series, unless it is currently out on a job
    pub fn series(&self, key: &PairKey) -> Option<&ForecastSeries> {
        self.series.get(key)
    }

    fn regressors(
        &self,
        from: &AreaId,
        to: &AreaId,
        stamp: HourStamp,
        outlook: &dyn DemandAndRenewableSource,
    ) -> Vec<f64> {
        let mut x = self
            .areas
            .iter()
            .map(|area| outlook.residual_load(area, stamp.year, stamp.hour_of_year) / MW_PER_GW)
            .collect::<Vec<_>>();
        for endpoint in [from, to] {
            let residual = outlook.residual_load(endpoint, stamp.year, stamp.hour_of_year);
            let available = outlook.available_capacity(endpoint, stamp.year, stamp.hour_of_year);
            x.push(scarcity_dummy(available, residual));
        }
        x
    }

    /// Package today's re-estimation into one job per pair. `realized` holds
    /// yesterday's committed flows; without it the jobs only project.
    ///
    /// The series are moved into the jobs and must be returned through
    /// [`complete`](Self::complete).
    pub fn prepare(
        &mut self,
        today: Day,
        realized: Option<&FlowMatrix>,
        outlook: &dyn DemandAndRenewableSource,
        capacities: &dyn CapacityProvider,
    ) -> Vec<ForecastJob<PairKey>> {
        let yesterday = today.previous();
        let horizon = self.horizon_days * HOURS_PER_DAY;

        let mut jobs = Vec::with_capacity(self.keys.len());
        for key in self.keys.iter() {
            let Some(series) = self.series.swap_remove(key) else {
                event!(Level::WARN, from = %key.0, to = %key.1, "exchange series already taken");
                continue;
            };
            let (from, to) = key;

            let samples = match (yesterday, realized) {
                (Some(day), Some(flows)) => (0..HOURS_PER_DAY)
                    .map(|h| Sample {
                        regressors: self.regressors(from, to, day.hour(h), outlook),
                        target: flows.signed_flow(from, to, h),
                    })
                    .collect(),
                _ => Vec::new(),
            };

            let (projection, bounds): (Vec<_>, Vec<_>) = (0..horizon)
                .map(|k| {
                    let stamp = today.offset(k);
                    let export = capacities.interconnection_capacity(
                        from,
                        to,
                        stamp.year,
                        stamp.hour_of_year,
                    );
                    let import = capacities.interconnection_capacity(
                        to,
                        from,
                        stamp.year,
                        stamp.hour_of_year,
                    );
                    (
                        self.regressors(from, to, stamp, outlook),
                        (-import.max(0.0), export.max(0.0)),
                    )
                })
                .unzip();

            jobs.push(ForecastJob {
                key: key.clone(),
                series,
                samples,
                projection,
                clip: Clip::Hourly(bounds),
                origin: today,
            });
        }
        jobs
    }

    /// Take back the series and store the new forecasts
    pub fn complete(&mut self, outputs: impl IntoIterator<Item = JobOutput<PairKey>>) {
        for output in outputs {
            if output.resets > 0 {
                event!(
                    Level::DEBUG,
                    from = %output.key.0,
                    to = %output.key.1,
                    resets = output.resets,
                    "exchange estimator reinitialized"
                );
            }
            self.forecasts.insert(output.key.clone(), output.forecast);
            self.series.insert(output.key, output.series);
        }
        // restore the canonical order regardless of completion order
        let keys = &self.keys;
        let position = |key: &PairKey| keys.iter().position(|k| k == key);
        self.series.sort_by(|a, _, b, _| position(a).cmp(&position(b)));
        self.forecasts
            .sort_by(|a, _, b, _| position(a).cmp(&position(b)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(100.0, 200.0, 1.0)]
    #[case(200.0, 200.0, 0.0)]
    #[case(10.0, 200.0, 1.0)]
    #[case(50.0, 0.0, 0.0)]
    #[case(50.0, -10.0, 0.0)]
    fn scarcity(#[case] available: f64, #[case] residual: f64, #[case] dummy: f64) {
        assert_eq!(scarcity_dummy(available, residual), dummy);
    }
}

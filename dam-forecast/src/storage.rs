use crate::{Clip, ForecastJob, ForecastSeries, JobOutput, MW_PER_GW, Sample};
use dam_core::{
    models::{Area, AreaId, Day, Forecast, HOURS_PER_DAY, HourStamp, Map},
    ports::{CapacityProvider, DemandAndRenewableSource},
};
use tracing::{Level, event};

#[derive(Debug)]
struct Neighbourhood {
    // the area itself first, then every area it has capacity to or from
    connected: Vec<AreaId>,
    // the connected areas sharing the area's market type
    same_type: Vec<AreaId>,
}

/// Forecasts the net dispatch of storage units (accepted sell minus accepted
/// ask) per area.
///
/// Regressors: the residual load (GW) of the area and each area it is
/// connected to, plus the daily-average residual load of the connected areas
/// of the same market type. Forecasts are clipped into the range of dispatch
/// observed so far.
#[derive(Debug)]
pub struct StorageDispatchForecaster {
    keys: Vec<AreaId>,
    neighbourhoods: Map<AreaId, Neighbourhood>,
    series: Map<AreaId, ForecastSeries>,
    forecasts: Map<AreaId, Forecast>,
    horizon_days: usize,
}

fn daily_average(outlook: &dyn DemandAndRenewableSource, area: &AreaId, stamp: HourStamp) -> f64 {
    let first = stamp.hour_of_year - stamp.hour_of_day() as u32;
    (0..HOURS_PER_DAY as u32)
        .map(|h| outlook.residual_load(area, stamp.year, first + h))
        .sum::<f64>()
        / HOURS_PER_DAY as f64
}

impl StorageDispatchForecaster {
    /// Set up one series per area. Connectivity is read from the
    /// interconnection capacities of `start`.
    pub fn new(
        areas: &[Area],
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

        let neighbourhoods = areas
            .iter()
            .map(|area| {
                let neighbours = areas
                    .iter()
                    .filter(|other| other.id != area.id && linked(&area.id, &other.id))
                    .collect::<Vec<_>>();
                let connected = std::iter::once(&area.id)
                    .chain(neighbours.iter().map(|other| &other.id))
                    .cloned()
                    .collect();
                let same_type = std::iter::once(area)
                    .chain(neighbours.iter().copied())
                    .filter(|other| other.market_type == area.market_type)
                    .map(|other| other.id.clone())
                    .collect();
                (
                    area.id.clone(),
                    Neighbourhood {
                        connected,
                        same_type,
                    },
                )
            })
            .collect::<Map<_, _>>();

        let series = neighbourhoods
            .iter()
            .map(|(id, n)| {
                (
                    id.clone(),
                    ForecastSeries::new(n.connected.len() + n.same_type.len()),
                )
            })
            .collect();

        Self {
            keys: areas.iter().map(|area| area.id.clone()).collect(),
            neighbourhoods,
            series,
            forecasts: Map::default(),
            horizon_days,
        }
    }

    /// The areas being forecasted
    pub fn keys(&self) -> &[AreaId] {
        &self.keys
    }

    /// The latest forecasts
    pub fn forecasts(&self) -> &Map<AreaId, Forecast> {
        &self.forecasts
    }

    /// A series, unless it is currently out on a job
    pub fn series(&self, key: &AreaId) -> Option<&ForecastSeries> {
        self.series.get(key)
    }

    fn regressors(
        neighbourhood: &Neighbourhood,
        stamp: HourStamp,
        outlook: &dyn DemandAndRenewableSource,
    ) -> Vec<f64> {
        neighbourhood
            .connected
            .iter()
            .map(|area| outlook.residual_load(area, stamp.year, stamp.hour_of_year))
            .chain(
                neighbourhood
                    .same_type
                    .iter()
                    .map(|area| daily_average(outlook, area, stamp)),
            )
            .map(|mw| mw / MW_PER_GW)
            .collect()
    }

    /// Package today's re-estimation into one job per area. `realized` holds
    /// yesterday's hourly storage net dispatch per area.
    ///
    /// The series are moved into the jobs and must be returned through
    /// [`complete`](Self::complete).
    pub fn prepare(
        &mut self,
        today: Day,
        realized: Option<&Map<AreaId, Vec<f64>>>,
        outlook: &dyn DemandAndRenewableSource,
    ) -> Vec<ForecastJob<AreaId>> {
        let yesterday = today.previous();
        let horizon = self.horizon_days * HOURS_PER_DAY;

        let mut jobs = Vec::with_capacity(self.keys.len());
        for key in self.keys.iter() {
            let (Some(series), Some(neighbourhood)) =
                (self.series.swap_remove(key), self.neighbourhoods.get(key))
            else {
                event!(Level::WARN, area = %key, "storage series already taken");
                continue;
            };

            let samples = match (yesterday, realized.and_then(|r| r.get(key))) {
                (Some(day), Some(dispatch)) => dispatch
                    .iter()
                    .take(HOURS_PER_DAY)
                    .enumerate()
                    .map(|(h, &target)| Sample {
                        regressors: Self::regressors(neighbourhood, day.hour(h), outlook),
                        target,
                    })
                    .collect(),
                _ => Vec::new(),
            };

            let projection = (0..horizon)
                .map(|k| Self::regressors(neighbourhood, today.offset(k), outlook))
                .collect();

            jobs.push(ForecastJob {
                key: key.clone(),
                series,
                samples,
                projection,
                clip: Clip::Observed,
                origin: today,
            });
        }
        jobs
    }

    /// Take back the series and store the new forecasts
    pub fn complete(&mut self, outputs: impl IntoIterator<Item = JobOutput<AreaId>>) {
        for output in outputs {
            if output.resets > 0 {
                event!(
                    Level::DEBUG,
                    area = %output.key,
                    resets = output.resets,
                    "storage estimator reinitialized"
                );
            }
            self.forecasts.insert(output.key.clone(), output.forecast);
            self.series.insert(output.key, output.series);
        }
        let keys = &self.keys;
        let position = |key: &AreaId| keys.iter().position(|k| k == key);
        self.series.sort_by(|a, _, b, _| position(a).cmp(&position(b)));
        self.forecasts
            .sort_by(|a, _, b, _| position(a).cmp(&position(b)));
    }
}

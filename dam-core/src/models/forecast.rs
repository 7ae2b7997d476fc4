use super::{AreaId, Day, HourStamp, Map};

/// The two ways of addressing an hour of a forecast
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForecastIndex {
    /// An absolute year and hour of year
    Absolute(HourStamp),
    /// Hours elapsed since hour 0 of the forecast's origin day
    Relative(usize),
}

impl From<HourStamp> for ForecastIndex {
    fn from(value: HourStamp) -> Self {
        Self::Absolute(value)
    }
}

impl From<usize> for ForecastIndex {
    fn from(value: usize) -> Self {
        Self::Relative(value)
    }
}

/// An hourly forecast starting at hour 0 of its origin day.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Forecast {
    origin: Day,
    values: Vec<f64>,
}

impl Forecast {
    /// Construct a forecast from its origin and hourly values
    pub fn new(origin: Day, values: Vec<f64>) -> Self {
        Self { origin, values }
    }

    /// The day the forecast starts at
    pub fn origin(&self) -> Day {
        self.origin
    }

    /// The hourly values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The number of forecasted hours
    pub fn horizon(&self) -> usize {
        self.values.len()
    }

    /// Look up a forecasted value. Hours before the origin or past the
    /// horizon yield None.
    pub fn get(&self, index: impl Into<ForecastIndex>) -> Option<f64> {
        let offset = match index.into() {
            ForecastIndex::Relative(offset) => offset,
            ForecastIndex::Absolute(stamp) => stamp.hours_since(self.origin)?,
        };
        self.values.get(offset).copied()
    }
}

/// The forecasts available to bidders on a given day.
#[derive(Clone, Debug, Default)]
pub struct ForecastSnapshot {
    /// Expected netted exchange per ordered (from, to) pair, positive for from→to
    pub exchange: Map<(AreaId, AreaId), Forecast>,
    /// Expected storage net dispatch per area, positive for net selling
    pub storage: Map<AreaId, Forecast>,
}

impl ForecastSnapshot {
    /// The exchange forecast between two areas
    pub fn exchange(&self, from: &AreaId, to: &AreaId) -> Option<&Forecast> {
        self.exchange.get(&(from.clone(), to.clone()))
    }

    /// The storage dispatch forecast of an area
    pub fn storage(&self, area: &AreaId) -> Option<&Forecast> {
        self.storage.get(area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_and_relative_addressing_agree() {
        let origin = Day::new(2030, 10);
        let forecast = Forecast::new(origin, (0..48).map(|h| h as f64).collect());

        assert_eq!(forecast.get(30), Some(30.0));
        assert_eq!(forecast.get(origin.next().hour(6)), Some(30.0));
        assert_eq!(forecast.get(origin.hour(0)), Some(0.0));
        assert_eq!(forecast.get(Day::new(2030, 9).hour(23)), None);
        assert_eq!(forecast.get(48), None);
    }
}

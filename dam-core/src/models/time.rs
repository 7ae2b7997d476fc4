use std::fmt;

/// The number of hourly products cleared per auction
pub const HOURS_PER_DAY: usize = 24;

/// Simulation years are plain 365-day years
pub const DAYS_PER_YEAR: u32 = 365;

/// The number of hours in a simulation year
pub const HOURS_PER_YEAR: u32 = DAYS_PER_YEAR * HOURS_PER_DAY as u32;

/// A simulated delivery day, addressed by year and zero-based day of year.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Day {
    /// The calendar year
    pub year: u32,
    /// Zero-based day of the year, strictly less than `DAYS_PER_YEAR`
    pub day: u32,
}

impl Day {
    /// Construct a day, wrapping an out-of-range day of year into later years
    pub fn new(year: u32, day: u32) -> Self {
        Self {
            year: year + day / DAYS_PER_YEAR,
            day: day % DAYS_PER_YEAR,
        }
    }

    /// The following day
    pub fn next(self) -> Self {
        Self::new(self.year, self.day + 1)
    }

    /// The preceding day, if it does not underflow year zero
    pub fn previous(self) -> Option<Self> {
        if self.day > 0 {
            Some(Self {
                year: self.year,
                day: self.day - 1,
            })
        } else {
            self.year.checked_sub(1).map(|year| Self {
                year,
                day: DAYS_PER_YEAR - 1,
            })
        }
    }

    /// The absolute timestamp of an hour of this day
    pub fn hour(self, hour: usize) -> HourStamp {
        self.offset(hour)
    }

    /// The absolute timestamp `hours` after hour 0 of this day
    pub fn offset(self, hours: usize) -> HourStamp {
        let hour_of_year = self.day as u64 * HOURS_PER_DAY as u64 + hours as u64;
        HourStamp {
            year: self.year + (hour_of_year / HOURS_PER_YEAR as u64) as u32,
            hour_of_year: (hour_of_year % HOURS_PER_YEAR as u64) as u32,
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-d{:03}", self.year, self.day)
    }
}

/// An absolute hour: year plus zero-based hour of year.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HourStamp {
    /// The calendar year
    pub year: u32,
    /// Zero-based hour of the year, strictly less than `HOURS_PER_YEAR`
    pub hour_of_year: u32,
}

impl HourStamp {
    /// The hour of the day (0..24)
    pub fn hour_of_day(self) -> usize {
        self.hour_of_year as usize % HOURS_PER_DAY
    }

    /// The number of hours elapsed since hour 0 of `origin`, or None if this
    /// stamp precedes the origin.
    pub fn hours_since(self, origin: Day) -> Option<usize> {
        let this = self.year as i64 * HOURS_PER_YEAR as i64 + self.hour_of_year as i64;
        let start = origin.year as i64 * HOURS_PER_YEAR as i64
            + origin.day as i64 * HOURS_PER_DAY as i64;
        usize::try_from(this - start).ok()
    }
}

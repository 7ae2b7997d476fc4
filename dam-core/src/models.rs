mod area;
mod bid;
mod config;
mod flow;
mod forecast;
mod result;
mod time;

pub use area::{Area, AreaId, MarketType};
pub use bid::{
    BlockBid, Direction, ParticipantClass, PriceBounds, SimpleBid, UnitId, ValidationError,
    price_setting_sell,
};
pub use config::MarketConfig;
pub use flow::{CapacityMatrix, FLOW_TOLERANCE, FlowError, FlowMatrix};
pub use forecast::{Forecast, ForecastIndex, ForecastSnapshot};
pub use result::{AreaClearingResult, ClearingStatus, HourOutcome};
pub use time::{DAYS_PER_YEAR, Day, HOURS_PER_DAY, HOURS_PER_YEAR, HourStamp};

// We use non-std collections here for their ordering semantics and performance
/// A hashmap with deterministic (insertion) ordering
pub type Map<K, V> = indexmap::IndexMap<K, V, rustc_hash::FxBuildHasher>;
/// A hashset with deterministic (insertion) ordering
pub type Set<T> = indexmap::IndexSet<T, rustc_hash::FxBuildHasher>;

macro_rules! string_wrapper {
    ($struct:ident) => {
        #[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
        #[cfg_attr(
            feature = "serde",
            derive(serde::Serialize, serde::Deserialize),
            serde(transparent)
        )]
        #[doc = concat!("A newtype wrapper for ", stringify!($struct))]
        pub struct $struct(String);

        impl $struct {
            /// Borrow the underlying string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $struct {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $struct {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $struct {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

pub(crate) use string_wrapper;

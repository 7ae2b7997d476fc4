use super::string_wrapper;

string_wrapper!(AreaId);
string_wrapper!(MarketType);

/// A market area: a regulatory or geographic market with its own bidders and
/// its own clearing price.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Area {
    /// The identifier of the area
    pub id: AreaId,
    /// The kind of market this area belongs to. Storage forecasts only share
    /// daily-average regressors between areas of the same type.
    pub market_type: MarketType,
    /// Whether the area takes part in market coupling. Uncoupled areas always
    /// clear locally.
    #[cfg_attr(feature = "serde", serde(default = "coupled_by_default"))]
    pub coupled: bool,
}

#[cfg(feature = "serde")]
fn coupled_by_default() -> bool {
    true
}

impl Area {
    /// Construct a coupled area
    pub fn new(id: impl Into<AreaId>, market_type: impl Into<MarketType>) -> Self {
        Self {
            id: id.into(),
            market_type: market_type.into(),
            coupled: true,
        }
    }

    /// Mark the area as isolated from market coupling
    pub fn isolated(mut self) -> Self {
        self.coupled = false;
        self
    }
}

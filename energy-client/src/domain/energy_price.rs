use time::OffsetDateTime;

use super::{Point, ToPoint};

/// Day-ahead marginal price for one market period, in EUR/MWh.
///
/// `price1` is the Spanish price, `price2` the Portuguese one.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EnergyPrice {
    pub ts: OffsetDateTime,
    pub price1: f64,
    pub price2: f64,
}

impl EnergyPrice {
    pub const MEASUREMENT: &'static str = "omie_daily_prices";
    pub const PRICE1: &'static str = "price1";
    pub const PRICE2: &'static str = "price2";
}

impl ToPoint for EnergyPrice {
    fn to_point(&self) -> Point {
        Point::new(Self::MEASUREMENT, self.ts)
            .field(Self::PRICE1, self.price1)
            .field(Self::PRICE2, self.price2)
    }
}

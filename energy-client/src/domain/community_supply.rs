use time::OffsetDateTime;

use super::{Point, ToPoint};

/// Derived hourly figures for one supply point of the community.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CommunitySupply {
    pub ts: OffsetDateTime,
    pub cups: String,
    pub beta: f64,
    pub production: f64,
    pub surplus: f64,
    pub consumption_final: f64,
    pub self_consumption: f64,
    pub self_consumption_percentage: f64,
    pub utilization_percentage: f64,
    pub compensation: f64,
}

impl CommunitySupply {
    pub const MEASUREMENT: &'static str = "community_supply";
}

impl ToPoint for CommunitySupply {
    fn to_point(&self) -> Point {
        Point::new(Self::MEASUREMENT, self.ts)
            .tag("cups", &self.cups)
            .tag("beta", self.beta.to_string())
            .field("production", self.production)
            .field("surplus", self.surplus)
            .field("consumption_final", self.consumption_final)
            .field("self_consumption", self.self_consumption)
            .field("self_consumption_percentage", self.self_consumption_percentage)
            .field("utilization_percentage", self.utilization_percentage)
            .field("compensation", self.compensation)
    }
}

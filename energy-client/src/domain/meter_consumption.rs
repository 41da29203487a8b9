use time::OffsetDateTime;

use super::{Point, ToPoint};

/// Hourly active energy measured by a local energy meter.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MeterConsumption {
    pub ts: OffsetDateTime,
    pub device: String,
    pub active_energy_wh: f64,
}

impl MeterConsumption {
    pub const MEASUREMENT: &'static str = "energy_consumption_shelly_hourly";
    pub const ACTIVE_ENERGY_WH: &'static str = "active_energy_wh";
}

impl ToPoint for MeterConsumption {
    fn to_point(&self) -> Point {
        Point::new(Self::MEASUREMENT, self.ts)
            .tag("device", &self.device)
            .field(Self::ACTIVE_ENERGY_WH, self.active_energy_wh)
    }
}

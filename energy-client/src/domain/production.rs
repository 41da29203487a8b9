use time::OffsetDateTime;

use super::{Point, ToPoint};

/// Hourly production of the whole community installation (inverter output).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductionHour {
    pub ts: OffsetDateTime,
    pub inverter_power: f64,
}

impl ProductionHour {
    pub const MEASUREMENT: &'static str = "energy_production_huawei_hour";
    pub const INVERTER_POWER: &'static str = "inverter_power";
}

impl ToPoint for ProductionHour {
    fn to_point(&self) -> Point {
        Point::new(Self::MEASUREMENT, self.ts).field(Self::INVERTER_POWER, self.inverter_power)
    }
}

/// Daily production of the community installation, with the companion KPIs
/// FusionSolar reports for the day when it has them.
#[derive(Debug, Clone)]
pub struct ProductionDay {
    pub ts: OffsetDateTime,
    pub inverter_power: f64,
    pub installed_capacity: Option<f64>,
    pub power_profit: Option<f64>,
    pub perpower_ratio: Option<f64>,
    pub reduction_total_coal: Option<f64>,
    pub reduction_total_co2: Option<f64>,
}

impl ProductionDay {
    pub const MEASUREMENT: &'static str = "energy_production_huawei_day";
    pub const INVERTER_POWER: &'static str = "inverter_power";
}

impl ToPoint for ProductionDay {
    fn to_point(&self) -> Point {
        let mut p = Point::new(Self::MEASUREMENT, self.ts).field(Self::INVERTER_POWER, self.inverter_power);
        for (key, value) in [
            ("installed_capacity", self.installed_capacity),
            ("power_profit", self.power_profit),
            ("perpower_ratio", self.perpower_ratio),
            ("reduction_total_coal", self.reduction_total_coal),
            ("reduction_total_co2", self.reduction_total_co2),
        ] {
            if let Some(v) = value {
                p = p.field(key, v);
            }
        }
        p
    }
}

/// Production delta between two consecutive real-time inverter readings.
#[derive(Debug, Clone)]
pub struct RealtimeProduction {
    pub ts: OffsetDateTime,
    pub station_code: String,
    pub inverter_power_delta: f64,
}

impl RealtimeProduction {
    pub const MEASUREMENT: &'static str = "energy_production_huawei_realtime";
    pub const INVERTER_POWER_DELTA: &'static str = "inverter_power_10min";
}

impl ToPoint for RealtimeProduction {
    fn to_point(&self) -> Point {
        Point::new(Self::MEASUREMENT, self.ts)
            .tag("station_code", &self.station_code)
            .field(Self::INVERTER_POWER_DELTA, self.inverter_power_delta)
    }
}

use time::OffsetDateTime;

use super::{Point, ToPoint};

/// Hourly metered consumption and surplus of one supply point, as reported by
/// the distributor.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SupplyConsumption {
    pub ts: OffsetDateTime,
    pub cups: String,
    pub consumption_kwh: f64,
    pub surplus_energy_kwh: f64,
    pub obtain_method: Option<String>,
}

impl SupplyConsumption {
    pub const MEASUREMENT: &'static str = "energy_consumption_datadis";
    pub const CONSUMPTION_KWH: &'static str = "consumption_kwh";
    pub const SURPLUS_ENERGY_KWH: &'static str = "surplus_energy_kwh";
    pub const OBTAIN_METHOD: &'static str = "obtain_method";
}

impl ToPoint for SupplyConsumption {
    fn to_point(&self) -> Point {
        // Only cups keys the row: a reading republished as "Real" after an
        // "Estimada" one must replace it.
        let p = Point::new(Self::MEASUREMENT, self.ts)
            .tag("cups", &self.cups)
            .field(Self::CONSUMPTION_KWH, self.consumption_kwh)
            .field(Self::SURPLUS_ENERGY_KWH, self.surplus_energy_kwh);
        match &self.obtain_method {
            Some(method) => p.text(Self::OBTAIN_METHOD, method),
            None => p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn obtain_method_is_stored_outside_the_key() {
        let p = SupplyConsumption {
            ts: datetime!(2024-02-01 00:00:00 UTC),
            cups: "ES001".to_string(),
            consumption_kwh: 7.0,
            surplus_energy_kwh: 2.0,
            obtain_method: Some("Real".to_string()),
        }
        .to_point();

        assert_eq!(p.tags, vec![("cups", "ES001".to_string())]);
        assert_eq!(p.text_value(SupplyConsumption::OBTAIN_METHOD), Some("Real"));
        assert_eq!(p.field_value(SupplyConsumption::CONSUMPTION_KWH), Some(7.0));
    }
}

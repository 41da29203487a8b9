use std::marker::PhantomData;

use crate::pipeline::{Envelope, PipelineError, Transform};
use energy_client::domain::{
    EnergyPrice, MeterConsumption, ProductionDay, ProductionHour, RealtimeProduction, SupplyConsumption,
};
use time::{macros::datetime, OffsetDateTime};

/// Pure sanity checks run on every loaded record before it is stored.
pub trait Validate {
    /// Record kind, used as the `record` label of the rejection counter.
    const KIND: &'static str;

    fn validate(&self) -> Result<(), String>;
}

fn check_ts(ts: OffsetDateTime) -> Result<(), String> {
    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if ts < min_ts || ts > max_ts {
        return Err("timestamp out of allowed range".to_string());
    }
    Ok(())
}

fn check_non_negative(name: &str, v: f64) -> Result<(), String> {
    if !v.is_finite() || v < 0.0 {
        return Err(format!("{name} must be a non-negative number, got {v}"));
    }
    Ok(())
}

fn check_id(name: &str, v: &str) -> Result<(), String> {
    if v.trim().is_empty() {
        return Err(format!("{name} must not be empty"));
    }
    Ok(())
}

/// Prices may be negative but must be finite.
impl Validate for EnergyPrice {
    const KIND: &'static str = "energy_price";

    fn validate(&self) -> Result<(), String> {
        check_ts(self.ts)?;
        if !self.price1.is_finite() || !self.price2.is_finite() {
            return Err("prices must be finite".to_string());
        }
        Ok(())
    }
}

impl Validate for MeterConsumption {
    const KIND: &'static str = "meter_consumption";

    fn validate(&self) -> Result<(), String> {
        check_ts(self.ts)?;
        check_id("device", &self.device)?;
        check_non_negative("active_energy_wh", self.active_energy_wh)
    }
}

impl Validate for SupplyConsumption {
    const KIND: &'static str = "supply_consumption";

    fn validate(&self) -> Result<(), String> {
        check_ts(self.ts)?;
        check_id("cups", &self.cups)?;
        check_non_negative("consumption_kwh", self.consumption_kwh)?;
        check_non_negative("surplus_energy_kwh", self.surplus_energy_kwh)
    }
}

impl Validate for ProductionHour {
    const KIND: &'static str = "production_hour";

    fn validate(&self) -> Result<(), String> {
        check_ts(self.ts)?;
        check_non_negative("inverter_power", self.inverter_power)
    }
}

impl Validate for ProductionDay {
    const KIND: &'static str = "production_day";

    fn validate(&self) -> Result<(), String> {
        check_ts(self.ts)?;
        check_non_negative("inverter_power", self.inverter_power)
    }
}

impl Validate for RealtimeProduction {
    const KIND: &'static str = "realtime_production";

    fn validate(&self) -> Result<(), String> {
        check_ts(self.ts)?;
        check_id("station_code", &self.station_code)?;
        check_non_negative("inverter_power_delta", self.inverter_power_delta)
    }
}

/// Pure validation of one enveloped record.
pub fn validate_record<T: Validate>(env: Envelope<T>) -> Result<Envelope<T>, PipelineError> {
    match env.payload.validate() {
        Ok(()) => Ok(env),
        Err(reason) => Err(PipelineError::Transform(format!("{}: {reason}", T::KIND))),
    }
}

/// Pipeline transform rejecting records that fail [`Validate`].
pub struct Validation<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for Validation<T> {
    fn default() -> Self {
        Self { _marker: PhantomData }
    }
}

#[async_trait::async_trait]
impl<T> Transform<T, T> for Validation<T>
where
    T: Validate + Send + 'static,
{
    async fn apply(&self, input: Envelope<T>) -> Result<Envelope<T>, PipelineError> {
        match validate_record(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_rejected_total", "record" => T::KIND).increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn consumption(consumption_kwh: f64, surplus: f64) -> SupplyConsumption {
        SupplyConsumption {
            ts: datetime!(2024-01-01 00:00:00 UTC),
            cups: "ES001".to_string(),
            consumption_kwh,
            surplus_energy_kwh: surplus,
            obtain_method: None,
        }
    }

    #[test]
    fn supply_consumption_validation_accepts_valid_record() {
        let res = validate_record(Envelope::now(consumption(0.4, 0.0)));
        assert!(res.is_ok());
    }

    #[test]
    fn supply_consumption_validation_rejects_negative_surplus() {
        let res = validate_record(Envelope::now(consumption(0.4, -0.1)));
        assert!(matches!(res, Err(PipelineError::Transform(msg)) if msg.contains("surplus_energy_kwh")));
    }

    #[test]
    fn validation_rejects_out_of_range_ts() {
        let env = Envelope::now(ProductionHour {
            ts: datetime!(1800-01-01 00:00:00 UTC),
            inverter_power: 1.0,
        });

        let res = validate_record(env);
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }

    #[test]
    fn daily_production_rejects_negative_power() {
        let day = |inverter_power: f64| ProductionDay {
            ts: datetime!(2024-01-31 23:00:00 UTC),
            inverter_power,
            installed_capacity: Some(30.0),
            power_profit: None,
            perpower_ratio: None,
            reduction_total_coal: None,
            reduction_total_co2: None,
        };

        assert!(validate_record(Envelope::now(day(84.2))).is_ok());
        let res = validate_record(Envelope::now(day(-1.0)));
        assert!(matches!(res, Err(PipelineError::Transform(msg)) if msg.starts_with("production_day:")));
    }

    #[test]
    fn negative_prices_pass_but_nan_does_not() {
        let price = |p: f64| EnergyPrice {
            ts: datetime!(2024-04-14 12:00:00 UTC),
            price1: p,
            price2: p,
        };

        assert!(validate_record(Envelope::now(price(-2.5))).is_ok());
        assert!(validate_record(Envelope::now(price(f64::NAN))).is_err());
    }

    #[test]
    fn empty_identifiers_are_rejected() {
        let reading = MeterConsumption {
            ts: datetime!(2024-01-01 00:00:00 UTC),
            device: " ".to_string(),
            active_energy_wh: 10.0,
        };
        assert!(validate_record(Envelope::now(reading)).is_err());

        let realtime = RealtimeProduction {
            ts: datetime!(2024-01-01 00:00:00 UTC),
            station_code: String::new(),
            inverter_power_delta: 0.0,
        };
        assert!(validate_record(Envelope::now(realtime)).is_err());
    }

    #[tokio::test]
    async fn transform_surfaces_rejections_as_transform_errors() {
        let t = Validation::<SupplyConsumption>::default();
        let res = t.apply(Envelope::now(consumption(-1.0, 0.0))).await;
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }
}

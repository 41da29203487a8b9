//! In-memory store used by the aggregator and report tests.

use std::collections::BTreeMap;

use energy_client::{
    db::KWH_PER_MWH,
    domain::{EnergyPrice, Point, ProductionHour, SupplyConsumption},
};
use time::OffsetDateTime;

use super::{TimeSeriesReader, TimeSeriesWriter};
use crate::pipeline::PipelineError;

type Key = (&'static str, i128, Vec<(&'static str, String)>);

/// Overwrites points with the same `(measurement, ts, tags)` key, like a
/// deduplicating time-series table.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    points: BTreeMap<Key, Point>,
    pub flushed: bool,
}

impl MemoryStore {
    pub fn insert(&mut self, point: &Point) {
        let key = (point.measurement, point.ts.unix_timestamp_nanos(), point.tags.clone());
        self.points.insert(key, point.clone());
    }

    pub fn get(&self, measurement: &str, ts: OffsetDateTime, cups: &str) -> Option<&Point> {
        self.points
            .values()
            .find(|p| p.measurement == measurement && p.ts == ts && p.tag_value("cups") == Some(cups))
    }

    pub fn points(&self) -> Vec<&Point> {
        self.points.values().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    fn field(&self, measurement: &str, ts: OffsetDateTime, cups: Option<&str>, field: &str) -> Option<f64> {
        self.points
            .values()
            .filter(|p| p.measurement == measurement && p.ts == ts)
            .find(|p| cups.is_none() || p.tag_value("cups") == cups)
            .and_then(|p| p.field_value(field))
    }
}

#[async_trait::async_trait]
impl TimeSeriesReader for MemoryStore {
    async fn community_production(&self, at: OffsetDateTime) -> Result<Option<f64>, PipelineError> {
        Ok(self.field(ProductionHour::MEASUREMENT, at, None, ProductionHour::INVERTER_POWER))
    }

    async fn energy_price(&self, at: OffsetDateTime) -> Result<Option<f64>, PipelineError> {
        Ok(self
            .field(EnergyPrice::MEASUREMENT, at, None, EnergyPrice::PRICE1)
            .map(|p| p / KWH_PER_MWH))
    }

    async fn supply_surplus(&self, cups: &str, at: OffsetDateTime) -> Result<Option<f64>, PipelineError> {
        Ok(self.field(
            SupplyConsumption::MEASUREMENT,
            at,
            Some(cups),
            SupplyConsumption::SURPLUS_ENERGY_KWH,
        ))
    }

    async fn supply_consumption_final(
        &self,
        cups: &str,
        at: OffsetDateTime,
    ) -> Result<Option<f64>, PipelineError> {
        Ok(self.field(
            SupplyConsumption::MEASUREMENT,
            at,
            Some(cups),
            SupplyConsumption::CONSUMPTION_KWH,
        ))
    }
}

#[async_trait::async_trait]
impl TimeSeriesWriter for MemoryStore {
    async fn write(&mut self, point: Point) -> Result<(), PipelineError> {
        self.insert(&point);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), PipelineError> {
        self.flushed = true;
        Ok(())
    }
}

/// A reader whose store is unreachable.
pub struct FailingReader;

#[async_trait::async_trait]
impl TimeSeriesReader for FailingReader {
    async fn community_production(&self, _at: OffsetDateTime) -> Result<Option<f64>, PipelineError> {
        Err(PipelineError::Source("connection refused".to_string()))
    }

    async fn energy_price(&self, _at: OffsetDateTime) -> Result<Option<f64>, PipelineError> {
        Err(PipelineError::Source("connection refused".to_string()))
    }

    async fn supply_surplus(&self, _cups: &str, _at: OffsetDateTime) -> Result<Option<f64>, PipelineError> {
        Err(PipelineError::Source("connection refused".to_string()))
    }

    async fn supply_consumption_final(
        &self,
        _cups: &str,
        _at: OffsetDateTime,
    ) -> Result<Option<f64>, PipelineError> {
        Err(PipelineError::Source("connection refused".to_string()))
    }
}

use energy_client::domain::{CommunitySupply, Partner, SupplyPoint, ToPoint};
use time::{Date, OffsetDateTime};

use super::{
    compute_hourly_metrics, self_consumption_percentage, utilization_percentage, TimeSeriesReader,
    TimeSeriesWriter,
};
use crate::{
    calendar::{BillingMonth, CivilZone},
    pipeline::PipelineError,
};

/// One hour of a local civil day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourSlot {
    pub day: Date,
    /// Zero-based position of the hour within the local day (0..=24).
    pub index: usize,
    /// UTC instant at which the hour starts.
    pub ts: OffsetDateTime,
}

/// Destination of the hourly results of a monthly run.
#[async_trait::async_trait]
pub trait HourlySink: Send {
    async fn record(
        &mut self,
        slot: &HourSlot,
        supply: &SupplyPoint,
        row: &CommunitySupply,
    ) -> Result<(), PipelineError>;

    /// Called once every hour of `day` has been recorded.
    async fn end_day(&mut self, _day: Date) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Called once at the end of the month with the accumulated totals.
    async fn finish(&mut self, _totals: &MonthlyTotals) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl<A, B> HourlySink for (A, B)
where
    A: HourlySink,
    B: HourlySink,
{
    async fn record(
        &mut self,
        slot: &HourSlot,
        supply: &SupplyPoint,
        row: &CommunitySupply,
    ) -> Result<(), PipelineError> {
        self.0.record(slot, supply, row).await?;
        self.1.record(slot, supply, row).await
    }

    async fn end_day(&mut self, day: Date) -> Result<(), PipelineError> {
        self.0.end_day(day).await?;
        self.1.end_day(day).await
    }

    async fn finish(&mut self, totals: &MonthlyTotals) -> Result<(), PipelineError> {
        self.0.finish(totals).await?;
        self.1.finish(totals).await
    }
}

/// Writes every hourly result back into the store as a `community_supply`
/// point tagged with the supply's cups and beta.
pub struct PointSink<W> {
    writer: W,
    written: u64,
}

impl<W> PointSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait::async_trait]
impl<W: TimeSeriesWriter> HourlySink for PointSink<W> {
    async fn record(
        &mut self,
        _slot: &HourSlot,
        _supply: &SupplyPoint,
        row: &CommunitySupply,
    ) -> Result<(), PipelineError> {
        self.writer.write(row.to_point()).await?;
        self.written += 1;
        metrics::counter!("community_supply_points_total").increment(1);
        Ok(())
    }

    async fn finish(&mut self, _totals: &MonthlyTotals) -> Result<(), PipelineError> {
        self.writer.flush().await
    }
}

/// Monthly sums for one supply point.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplyTotals {
    pub cups: String,
    pub beta: f64,
    pub production: f64,
    pub surplus: f64,
    pub consumption_final: f64,
    pub self_consumption: f64,
    pub compensation: f64,
}

impl SupplyTotals {
    fn new(supply: &SupplyPoint) -> Self {
        Self {
            cups: supply.cups.clone(),
            beta: supply.beta,
            production: 0.0,
            surplus: 0.0,
            consumption_final: 0.0,
            self_consumption: 0.0,
            compensation: 0.0,
        }
    }

    fn add(&mut self, row: &CommunitySupply) {
        self.production += row.production;
        self.surplus += row.surplus;
        self.consumption_final += row.consumption_final;
        self.self_consumption += row.self_consumption;
        self.compensation += row.compensation;
    }

    /// Recomputed from the monthly sums, not averaged from hourly ratios.
    pub fn self_consumption_percentage(&self) -> f64 {
        self_consumption_percentage(self.self_consumption, self.consumption_final)
    }

    pub fn utilization_percentage(&self) -> f64 {
        utilization_percentage(self.self_consumption, self.surplus)
    }
}

/// Running totals of a monthly run, accumulated in chronological order.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyTotals {
    pub month: BillingMonth,
    /// Community compensation per local day, ascending.
    pub compensation_by_day: Vec<(Date, f64)>,
    pub compensation_by_month: f64,
    /// One entry per supply point, in registry order.
    pub supplies: Vec<SupplyTotals>,
    pub hours: usize,
    /// Samples the store had no value for and that were taken as `0.0`.
    ///
    /// A missing sample is indistinguishable from a true zero in the
    /// computed metrics; this count is the only trace of it.
    pub missing_samples: u64,
}

impl MonthlyTotals {
    fn new(month: BillingMonth, partners: &[Partner]) -> Self {
        let supplies = partners
            .iter()
            .flat_map(|p| p.supplies.iter())
            .map(SupplyTotals::new)
            .collect();

        Self {
            month,
            compensation_by_day: Vec::new(),
            compensation_by_month: 0.0,
            supplies,
            hours: 0,
            missing_samples: 0,
        }
    }
}

/// Resolves a reader result into a number, taking "no data" as zero.
fn resolve(
    result: Result<Option<f64>, PipelineError>,
    metric: &'static str,
    cups: Option<&str>,
    slot: &HourSlot,
    totals: &mut MonthlyTotals,
) -> Result<f64, PipelineError> {
    match result {
        Ok(Some(v)) => Ok(v),
        Ok(None) => {
            totals.missing_samples += 1;
            metrics::counter!("community_missing_samples_total", "metric" => metric).increment(1);
            tracing::debug!(metric, cups, ts = %slot.ts, "no data, using 0.0");
            Ok(0.0)
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                metric,
                cups,
                day = %slot.day,
                hour = slot.index,
                ts = %slot.ts,
                "failed to read sample"
            );
            Err(e)
        }
    }
}

/// Runs the hourly compensation engine over every hour of `month` for every
/// supply point of every partner.
///
/// Days and hours are processed in ascending order. Community production and
/// price are read once per hour and shared by all supply points. Any read or
/// sink error aborts the run; nothing is checkpointed, so a re-run processes
/// the whole month again.
pub async fn run_month<R, K>(
    month: BillingMonth,
    partners: &[Partner],
    zone: &CivilZone,
    reader: &R,
    sink: &mut K,
) -> Result<MonthlyTotals, PipelineError>
where
    R: TimeSeriesReader + ?Sized,
    K: HourlySink + ?Sized,
{
    let mut totals = MonthlyTotals::new(month, partners);

    tracing::info!(%month, %zone, supplies = totals.supplies.len(), "monthly run started");

    for day in month.days() {
        let slots = zone.hour_slots(day)?;
        let mut compensation_by_day = 0.0;

        for (index, ts) in slots.into_iter().enumerate() {
            let slot = HourSlot { day, index, ts };
            tracing::debug!(day = %day, hour = index, local = %zone.format_local(ts), "processing hour");

            let community_production = resolve(
                reader.community_production(ts).await,
                "community_production",
                None,
                &slot,
                &mut totals,
            )?;
            let price = resolve(reader.energy_price(ts).await, "energy_price", None, &slot, &mut totals)?;

            let mut supply_index = 0;
            for partner in partners {
                for supply in &partner.supplies {
                    let cups = supply.cups.as_str();
                    let surplus = resolve(
                        reader.supply_surplus(cups, ts).await,
                        "surplus",
                        Some(cups),
                        &slot,
                        &mut totals,
                    )?;
                    let consumption_final = resolve(
                        reader.supply_consumption_final(cups, ts).await,
                        "consumption_final",
                        Some(cups),
                        &slot,
                        &mut totals,
                    )?;

                    let m = compute_hourly_metrics(
                        community_production,
                        supply.beta,
                        surplus,
                        consumption_final,
                        price,
                    );
                    let row = CommunitySupply {
                        ts,
                        cups: supply.cups.clone(),
                        beta: supply.beta,
                        production: m.production,
                        surplus,
                        consumption_final,
                        self_consumption: m.self_consumption,
                        self_consumption_percentage: m.self_consumption_percentage,
                        utilization_percentage: m.utilization_percentage,
                        compensation: m.compensation,
                    };

                    if let Err(e) = sink.record(&slot, supply, &row).await {
                        tracing::error!(error = %e, partner = %partner.id, cups, ts = %ts, "failed to record hour");
                        return Err(e);
                    }

                    totals.supplies[supply_index].add(&row);
                    supply_index += 1;
                    compensation_by_day += row.compensation;
                }
            }

            totals.hours += 1;
        }

        totals.compensation_by_day.push((day, compensation_by_day));
        totals.compensation_by_month += compensation_by_day;
        sink.end_day(day).await?;

        tracing::debug!(
            day = %day,
            compensation_by_day,
            compensation_by_month = totals.compensation_by_month,
            "day processed"
        );
    }

    sink.finish(&totals).await?;

    if totals.missing_samples > 0 {
        tracing::warn!(
            %month,
            missing_samples = totals.missing_samples,
            "some samples had no data and were taken as zero"
        );
    }
    tracing::info!(
        %month,
        hours = totals.hours,
        compensation_by_month = totals.compensation_by_month,
        "monthly run finished"
    );

    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compensation::{
        memory::{FailingReader, MemoryStore},
        TimeSeriesReader,
    };
    use approx::assert_relative_eq;
    use energy_client::domain::{EnergyPrice, ProductionHour, SupplyConsumption};
    use time::macros::datetime;

    fn partners() -> Vec<Partner> {
        vec![
            Partner {
                id: "11111111A".to_string(),
                name: "Ana".to_string(),
                supplies: vec![SupplyPoint {
                    cups: "ES001".to_string(),
                    beta: 0.25,
                }],
            },
            Partner {
                id: "22222222B".to_string(),
                name: "Luis".to_string(),
                supplies: vec![
                    SupplyPoint {
                        cups: "ES002".to_string(),
                        beta: 0.5,
                    },
                    SupplyPoint {
                        cups: "ES003".to_string(),
                        beta: 0.25,
                    },
                ],
            },
        ]
    }

    fn madrid() -> CivilZone {
        CivilZone::parse("Europe/Madrid").unwrap()
    }

    fn consumption(ts: OffsetDateTime, cups: &str, consumption_kwh: f64, surplus: f64) -> SupplyConsumption {
        SupplyConsumption {
            ts,
            cups: cups.to_string(),
            consumption_kwh,
            surplus_energy_kwh: surplus,
            obtain_method: Some("Real".to_string()),
        }
    }

    /// Seeds one hour (local noon, 2024-02-10) with the reference scenario for ES001.
    fn seeded_store() -> MemoryStore {
        let noon = datetime!(2024-02-10 11:00:00 UTC);
        let mut store = MemoryStore::default();
        store.insert(
            &ProductionHour {
                ts: noon,
                inverter_power: 100.0,
            }
            .to_point(),
        );
        store.insert(
            &EnergyPrice {
                ts: noon,
                price1: 100.0,
                price2: 100.0,
            }
            .to_point(),
        );
        store.insert(&consumption(noon, "ES001", 5.0, 20.0).to_point());
        store.insert(&consumption(noon, "ES002", 1.0, 10.0).to_point());
        store.insert(&consumption(noon, "ES003", 0.0, 0.0).to_point());
        store
    }

    #[tokio::test]
    async fn writes_one_point_per_supply_and_hour() {
        let month: BillingMonth = "2024-02".parse().unwrap();
        let store = seeded_store();
        let mut sink = PointSink::new(MemoryStore::default());

        let totals = run_month(month, &partners(), &madrid(), &store, &mut sink).await.unwrap();

        // 29 days x 24 hours, February has no DST change.
        assert_eq!(totals.hours, 29 * 24);
        assert_eq!(sink.written(), 29 * 24 * 3);

        let out = sink.into_inner();
        assert!(out.flushed);
        let p = out
            .get(CommunitySupply::MEASUREMENT, datetime!(2024-02-10 11:00:00 UTC), "ES001")
            .unwrap();
        assert_relative_eq!(p.field_value("production").unwrap(), 25.0);
        assert_relative_eq!(p.field_value("self_consumption").unwrap(), 5.0);
        assert_relative_eq!(p.field_value("self_consumption_percentage").unwrap(), 0.5);
        assert_relative_eq!(p.field_value("utilization_percentage").unwrap(), 0.2);
        assert_relative_eq!(p.field_value("compensation").unwrap(), 2.0);
        assert_eq!(p.tag_value("beta"), Some("0.25"));
    }

    #[tokio::test]
    async fn accumulates_compensation_per_day_and_month() {
        let month: BillingMonth = "2024-02".parse().unwrap();
        let store = seeded_store();
        let mut sink = PointSink::new(MemoryStore::default());

        let totals = run_month(month, &partners(), &madrid(), &store, &mut sink).await.unwrap();

        // ES001: 20 kWh x 0.1 EUR/kWh, ES002: 10 kWh x 0.1 EUR/kWh.
        assert_eq!(totals.compensation_by_day.len(), 29);
        let (day, comp) = totals.compensation_by_day[9];
        assert_eq!(day, time::macros::date!(2024 - 02 - 10));
        assert_relative_eq!(comp, 3.0);
        assert_relative_eq!(totals.compensation_by_day[0].1, 0.0);
        assert_relative_eq!(totals.compensation_by_month, 3.0);

        let es002 = &totals.supplies[1];
        assert_eq!(es002.cups, "ES002");
        assert_relative_eq!(es002.production, 50.0);
        assert_relative_eq!(es002.self_consumption, 40.0);
        assert_relative_eq!(es002.self_consumption_percentage(), 40.0 / 41.0);
        assert_relative_eq!(es002.utilization_percentage(), 40.0 / 50.0);
    }

    #[tokio::test]
    async fn missing_samples_are_zero_and_counted() {
        // Known limitation: an hour without data cannot be told apart from an
        // hour that genuinely metered zero. Only the counter records it.
        let month: BillingMonth = "2023-02".parse().unwrap();
        let store = MemoryStore::default();
        let mut sink = PointSink::new(MemoryStore::default());

        let totals = run_month(month, &partners(), &madrid(), &store, &mut sink).await.unwrap();

        let hours = 28 * 24;
        assert_eq!(totals.hours, hours);
        // production + price per hour, surplus + consumption per supply and hour.
        assert_eq!(totals.missing_samples, (hours * (2 + 3 * 2)) as u64);
        assert_eq!(totals.compensation_by_month, 0.0);
        assert!(totals.supplies.iter().all(|s| s.self_consumption_percentage() == 0.0));
    }

    #[tokio::test]
    async fn rerunning_a_month_leaves_the_store_unchanged() {
        let month: BillingMonth = "2024-02".parse().unwrap();
        let store = seeded_store();

        let mut sink = PointSink::new(MemoryStore::default());
        run_month(month, &partners(), &madrid(), &store, &mut sink).await.unwrap();
        let first = sink.into_inner();

        let mut sink = PointSink::new(first.clone());
        run_month(month, &partners(), &madrid(), &store, &mut sink).await.unwrap();
        let second = sink.into_inner();

        assert_eq!(first.points(), second.points());
        assert_eq!(second.len(), 29 * 24 * 3);
    }

    #[tokio::test]
    async fn corrected_reading_replaces_the_estimate() {
        let noon = datetime!(2024-02-10 11:00:00 UTC);
        let mut store = seeded_store();
        let rows = store.len();

        let estimate = SupplyConsumption {
            obtain_method: Some("Estimada".to_string()),
            ..consumption(noon, "ES001", 5.0, 1.0)
        };
        store.insert(&estimate.to_point());
        store.insert(&consumption(noon, "ES001", 7.0, 2.0).to_point());

        assert_eq!(store.len(), rows);
        assert_eq!(store.supply_consumption_final("ES001", noon).await.unwrap(), Some(7.0));
        assert_eq!(store.supply_surplus("ES001", noon).await.unwrap(), Some(2.0));

        let month: BillingMonth = "2024-02".parse().unwrap();
        let mut sink = PointSink::new(MemoryStore::default());
        let totals = run_month(month, &partners(), &madrid(), &store, &mut sink).await.unwrap();

        // ES001: 2 kWh x 0.1 EUR/kWh, ES002 unchanged at 1.0.
        assert_relative_eq!(totals.supplies[0].compensation, 0.2);
        assert_relative_eq!(totals.compensation_by_month, 1.2);
    }

    #[tokio::test]
    async fn fall_back_month_has_an_extra_hour() {
        let month: BillingMonth = "2024-10".parse().unwrap();
        let mut sink = PointSink::new(MemoryStore::default());

        let totals = run_month(month, &partners(), &madrid(), &MemoryStore::default(), &mut sink)
            .await
            .unwrap();

        assert_eq!(totals.hours, 31 * 24 + 1);
    }

    #[tokio::test]
    async fn reader_error_aborts_the_run() {
        let month: BillingMonth = "2024-02".parse().unwrap();
        let mut sink = PointSink::new(MemoryStore::default());

        let err = run_month(month, &partners(), &madrid(), &FailingReader, &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Source(_)));
        assert_eq!(sink.written(), 0);
        assert!(!sink.into_inner().flushed);
    }
}

use energy_client::{db, domain::Point};
use sqlx::postgres::PgPool;
use time::OffsetDateTime;

use crate::pipeline::PipelineError;

/// Read side of the time-series store, as consumed by the monthly aggregator.
///
/// Every method returns `Ok(None)` when nothing is stored for the requested
/// key; only transport or decoding failures are errors.
#[async_trait::async_trait]
pub trait TimeSeriesReader: Send + Sync {
    /// Total installation production for the hour starting at `at`, in kWh.
    async fn community_production(&self, at: OffsetDateTime) -> Result<Option<f64>, PipelineError>;

    /// Day-ahead price for the hour starting at `at`, in EUR/kWh.
    async fn energy_price(&self, at: OffsetDateTime) -> Result<Option<f64>, PipelineError>;

    async fn supply_surplus(&self, cups: &str, at: OffsetDateTime) -> Result<Option<f64>, PipelineError>;

    async fn supply_consumption_final(
        &self,
        cups: &str,
        at: OffsetDateTime,
    ) -> Result<Option<f64>, PipelineError>;
}

/// Write side of the time-series store.
///
/// Writes are fire-and-forget: implementations may buffer, and `flush` must
/// be called before the writer is dropped.
#[async_trait::async_trait]
pub trait TimeSeriesWriter: Send {
    async fn write(&mut self, point: Point) -> Result<(), PipelineError>;

    async fn flush(&mut self) -> Result<(), PipelineError>;
}

/// Reads samples from QuestDB over the PostgreSQL wire protocol.
pub struct QuestDbReader {
    pool: PgPool,
}

impl QuestDbReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_error(metric: &str, e: anyhow::Error) -> PipelineError {
    metrics::counter!("questdb_query_errors_total").increment(1);
    PipelineError::Source(format!("{metric} query failed: {e:#}"))
}

#[async_trait::async_trait]
impl TimeSeriesReader for QuestDbReader {
    async fn community_production(&self, at: OffsetDateTime) -> Result<Option<f64>, PipelineError> {
        db::community_production_at(&self.pool, at)
            .await
            .map_err(|e| query_error("community_production", e))
    }

    async fn energy_price(&self, at: OffsetDateTime) -> Result<Option<f64>, PipelineError> {
        db::energy_price_at(&self.pool, at)
            .await
            .map_err(|e| query_error("energy_price", e))
    }

    async fn supply_surplus(&self, cups: &str, at: OffsetDateTime) -> Result<Option<f64>, PipelineError> {
        db::supply_surplus_at(&self.pool, cups, at)
            .await
            .map_err(|e| query_error("surplus", e))
    }

    async fn supply_consumption_final(
        &self,
        cups: &str,
        at: OffsetDateTime,
    ) -> Result<Option<f64>, PipelineError> {
        db::supply_consumption_final_at(&self.pool, cups, at)
            .await
            .map_err(|e| query_error("consumption_final", e))
    }
}

use anyhow::Result;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::{EnergyPrice, ProductionHour, SupplyConsumption};

/// Day-ahead prices are stored per MWh; the compensation formulas work per kWh.
pub const KWH_PER_MWH: f64 = 1000.0;

async fn scalar_at(pool: &PgPool, sql: &str, at: OffsetDateTime) -> Result<Option<f64>> {
    let value = sqlx::query_scalar::<_, Option<f64>>(sql)
        .bind(at)
        .fetch_optional(pool)
        .await?;

    Ok(value.flatten())
}

async fn supply_scalar_at(
    pool: &PgPool,
    sql: &str,
    cups: &str,
    at: OffsetDateTime,
) -> Result<Option<f64>> {
    let value = sqlx::query_scalar::<_, Option<f64>>(sql)
        .bind(cups)
        .bind(at)
        .fetch_optional(pool)
        .await?;

    Ok(value.flatten())
}

/// Total installation production for the hour starting at `at`.
///
/// `None` means nothing was stored for that hour.
pub async fn community_production_at(pool: &PgPool, at: OffsetDateTime) -> Result<Option<f64>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE ts = $1 LIMIT 1",
        ProductionHour::INVERTER_POWER,
        ProductionHour::MEASUREMENT,
    );
    scalar_at(pool, &sql, at).await
}

/// Day-ahead price for the hour starting at `at`, in EUR/kWh.
pub async fn energy_price_at(pool: &PgPool, at: OffsetDateTime) -> Result<Option<f64>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE ts = $1 LIMIT 1",
        EnergyPrice::PRICE1,
        EnergyPrice::MEASUREMENT,
    );
    let per_mwh = scalar_at(pool, &sql, at).await?;
    Ok(per_mwh.map(|p| p / KWH_PER_MWH))
}

/// Metered surplus exported by `cups` during the hour starting at `at`.
pub async fn supply_surplus_at(
    pool: &PgPool,
    cups: &str,
    at: OffsetDateTime,
) -> Result<Option<f64>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE cups = $1 AND ts = $2 LIMIT 1",
        SupplyConsumption::SURPLUS_ENERGY_KWH,
        SupplyConsumption::MEASUREMENT,
    );
    supply_scalar_at(pool, &sql, cups, at).await
}

/// Metered consumption imported by `cups` during the hour starting at `at`.
pub async fn supply_consumption_final_at(
    pool: &PgPool,
    cups: &str,
    at: OffsetDateTime,
) -> Result<Option<f64>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE cups = $1 AND ts = $2 LIMIT 1",
        SupplyConsumption::CONSUMPTION_KWH,
        SupplyConsumption::MEASUREMENT,
    );
    supply_scalar_at(pool, &sql, cups, at).await
}

//! Hourly compensation for the supply points of a shared solar installation.
//!
//! The engine is a pure function of five numbers. The monthly aggregator
//! feeds it with stored samples, hour by hour, and routes every result to a
//! [`HourlySink`]: back into the store as a point, or into a CSV report.

mod aggregator;
mod report;
mod store;
#[cfg(test)]
pub(crate) mod memory;

pub use aggregator::{run_month, HourSlot, HourlySink, MonthlyTotals, PointSink, SupplyTotals};
pub use report::{write_month_reports, HourlyCsvReport, MonthReports, MonthlySummaryReport};
pub use store::{QuestDbReader, TimeSeriesReader, TimeSeriesWriter};

/// Quantities derived for one supply point and one hour.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedMetrics {
    /// Share of community production attributed to the supply point.
    pub production: f64,
    /// `production - surplus`. Negative when the metered surplus exceeds the
    /// attributed production; kept as is.
    pub self_consumption: f64,
    pub self_consumption_percentage: f64,
    pub utilization_percentage: f64,
    pub compensation: f64,
}

/// `numerator / denominator`, or `0.0` unless the denominator is strictly
/// positive. Never NaN or infinite for finite inputs.
pub fn guarded_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Share of the supply's demand covered by its own production.
pub fn self_consumption_percentage(self_consumption: f64, consumption_final: f64) -> f64 {
    guarded_ratio(self_consumption, self_consumption + consumption_final)
}

/// Share of the supply's attributed production that it used itself.
pub fn utilization_percentage(self_consumption: f64, surplus: f64) -> f64 {
    guarded_ratio(self_consumption, self_consumption + surplus)
}

/// Computes the derived metrics of one supply point for one hour.
///
/// `price` is per kWh and may be zero or negative, in which case the
/// compensation is zero or negative too.
pub fn compute_hourly_metrics(
    community_production: f64,
    beta: f64,
    surplus: f64,
    consumption_final: f64,
    price: f64,
) -> DerivedMetrics {
    let production = community_production * beta;
    let self_consumption = production - surplus;

    DerivedMetrics {
        production,
        self_consumption,
        self_consumption_percentage: self_consumption_percentage(self_consumption, consumption_final),
        utilization_percentage: utilization_percentage(self_consumption, surplus),
        compensation: surplus * price,
    }
}

use std::{fs, path::PathBuf};

use energy_client::domain::{ProductionDay, ProductionHour};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// FusionSolar answers 407 when the KPI endpoint is queried too often.
const FAIL_CODE_ACCESS_FREQUENCY: i64 = 407;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KpiResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    fail_code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Vec<KpiEntry>>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KpiEntry {
    /// Start of the hour or day, in milliseconds since the epoch.
    collect_time: i64,
    #[serde(default)]
    data_item_map: KpiItems,
}

impl KpiEntry {
    fn ts(&self) -> Result<OffsetDateTime, PipelineError> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.collect_time) * 1_000_000)
            .map_err(|e| PipelineError::Source(format!("invalid collectTime {}: {e}", self.collect_time)))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KpiItems {
    inverter_power: Option<f64>,
    installed_capacity: Option<f64>,
    power_profit: Option<f64>,
    perpower_ratio: Option<f64>,
    reduction_total_coal: Option<f64>,
    reduction_total_co2: Option<f64>,
}

fn parse_entries(contents: &str) -> Result<Vec<KpiEntry>, PipelineError> {
    let response: KpiResponse = serde_json::from_str(contents)
        .map_err(|e| PipelineError::Source(format!("malformed KPI response: {e}")))?;

    if response.fail_code == FAIL_CODE_ACCESS_FREQUENCY {
        return Err(PipelineError::Source(
            "KPI request rejected: access frequency is too high (failCode 407)".to_string(),
        ));
    }
    if !response.success {
        return Err(PipelineError::Source(format!(
            "KPI request failed: failCode {}, {}",
            response.fail_code,
            response.message.as_deref().unwrap_or("no message")
        )));
    }

    Ok(response.data.unwrap_or_default())
}

/// Parses a `getKpiStationHour` response into hourly production samples.
///
/// A null `inverter_power` (the inverter was asleep) counts as no production.
pub fn parse_kpi_response(contents: &str) -> Result<Vec<ProductionHour>, PipelineError> {
    parse_entries(contents)?
        .into_iter()
        .map(|entry| {
            Ok(ProductionHour {
                ts: entry.ts()?,
                inverter_power: entry.data_item_map.inverter_power.unwrap_or(0.0),
            })
        })
        .collect()
}

/// Parses a `getKpiStationDay` response into daily production totals.
///
/// Days without an `inverter_power` reading are skipped.
pub fn parse_kpi_day_response(contents: &str) -> Result<Vec<ProductionDay>, PipelineError> {
    let mut days = Vec::new();
    for entry in parse_entries(contents)? {
        let Some(inverter_power) = entry.data_item_map.inverter_power else {
            tracing::debug!(collect_time = entry.collect_time, "day without inverter_power skipped");
            continue;
        };
        let items = &entry.data_item_map;
        days.push(ProductionDay {
            ts: entry.ts()?,
            inverter_power,
            installed_capacity: items.installed_capacity,
            power_profit: items.power_profit,
            perpower_ratio: items.perpower_ratio,
            reduction_total_coal: items.reduction_total_coal,
            reduction_total_co2: items.reduction_total_co2,
        });
    }
    Ok(days)
}

fn read_kpi_file<T>(
    path: &std::path::Path,
    parse: fn(&str) -> Result<Vec<T>, PipelineError>,
) -> Result<Vec<T>, PipelineError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| PipelineError::Source(format!("failed to read KPI file {}: {e}", path.display())))?;
    parse(&contents).map_err(|e| {
        metrics::counter!("huawei_kpi_parse_errors_total").increment(1);
        PipelineError::Source(format!("{}: {e}", path.display()))
    })
}

/// Hourly station production saved from the FusionSolar KPI API.
pub struct HuaweiKpiFileSource {
    path: PathBuf,
}

impl HuaweiKpiFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source<ProductionHour> for HuaweiKpiFileSource {
    async fn stream(&self) -> EnvelopeStream<ProductionHour> {
        let path = self.path.clone();
        let s = async_stream::try_stream! {
            let hours = read_kpi_file(&path, parse_kpi_response)?;
            for hour in hours {
                yield Envelope::now(hour);
            }
        };

        Box::pin(s)
    }
}

/// Daily station production saved from the FusionSolar KPI API.
pub struct HuaweiKpiDayFileSource {
    path: PathBuf,
}

impl HuaweiKpiDayFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source<ProductionDay> for HuaweiKpiDayFileSource {
    async fn stream(&self) -> EnvelopeStream<ProductionDay> {
        let path = self.path.clone();
        let s = async_stream::try_stream! {
            let days = read_kpi_file(&path, parse_kpi_day_response)?;
            for day in days {
                yield Envelope::now(day);
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_client::domain::ToPoint;
    use time::macros::datetime;

    #[test]
    fn entries_become_hourly_samples() {
        let hours = parse_kpi_response(
            r#"{"success": true, "failCode": 0, "data": [
                {"collectTime": 1707559200000, "stationCode": "NE=1", "dataItemMap": {"inverter_power": 12.5}},
                {"collectTime": 1707562800000, "stationCode": "NE=1", "dataItemMap": {"inverter_power": null}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(hours.len(), 2);
        assert_eq!(hours[0].ts, datetime!(2024-02-10 10:00:00 UTC));
        assert_eq!(hours[0].inverter_power, 12.5);
        assert_eq!(hours[1].ts, datetime!(2024-02-10 11:00:00 UTC));
        assert_eq!(hours[1].inverter_power, 0.0);
    }

    #[test]
    fn access_frequency_rejection_is_an_error() {
        let err = parse_kpi_response(r#"{"success": false, "failCode": 407, "data": null}"#);
        assert!(matches!(err, Err(PipelineError::Source(msg)) if msg.contains("407")));
    }

    #[test]
    fn unsuccessful_response_is_an_error() {
        let err = parse_kpi_response(r#"{"success": false, "failCode": 305, "message": "USER_MUST_RELOGIN"}"#);
        assert!(matches!(err, Err(PipelineError::Source(msg)) if msg.contains("USER_MUST_RELOGIN")));
    }

    #[test]
    fn daily_entries_keep_their_kpis_and_skip_days_without_power() {
        let days = parse_kpi_day_response(
            r#"{"success": true, "failCode": 0, "data": [
                {"collectTime": 1706742000000, "stationCode": "NE=1", "dataItemMap": {
                    "inverter_power": 84.2, "installed_capacity": 30.0, "power_profit": 9.1,
                    "reduction_total_coal": 0.034, "perpower_ratio": 2.8, "reduction_total_co2": 0.084
                }},
                {"collectTime": 1706828400000, "stationCode": "NE=1", "dataItemMap": {"installed_capacity": 30.0}},
                {"collectTime": 1706914800000, "stationCode": "NE=1", "dataItemMap": {"inverter_power": 51.0}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(days.len(), 2);
        // Local midnight of 2024-02-01 in Madrid.
        assert_eq!(days[0].ts, datetime!(2024-01-31 23:00:00 UTC));
        assert_eq!(days[0].inverter_power, 84.2);
        assert_eq!(days[0].installed_capacity, Some(30.0));
        assert_eq!(days[1].ts, datetime!(2024-02-02 23:00:00 UTC));
        assert_eq!(days[1].power_profit, None);

        let p = days[1].to_point();
        assert_eq!(p.measurement, ProductionDay::MEASUREMENT);
        assert_eq!(p.fields, vec![(ProductionDay::INVERTER_POWER, 51.0)]);
    }

    #[test]
    fn daily_access_frequency_rejection_is_an_error() {
        let err = parse_kpi_day_response(r#"{"success": false, "failCode": 407, "data": null}"#);
        assert!(matches!(err, Err(PipelineError::Source(msg)) if msg.contains("407")));
    }

    #[tokio::test]
    async fn daily_source_streams_every_day_of_the_file() {
        use futures::StreamExt;
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{"success": true, "failCode": 0, "data": [
                {"collectTime": 1706742000000, "dataItemMap": {"inverter_power": 84.2}}
            ]}"#,
        )
        .unwrap();

        let items: Vec<_> = HuaweiKpiDayFileSource::new(file.path()).stream().await.collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().payload.inverter_power, 84.2);
    }
}

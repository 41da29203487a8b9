use std::{fs, path::PathBuf};

use energy_client::domain::SupplyConsumption;
use serde::Deserialize;
use time::{macros::format_description, Date, OffsetDateTime};

use crate::{
    calendar::CivilZone,
    pipeline::{Envelope, EnvelopeStream, PipelineError, Source},
};

/// One hourly entry of a Datadis `get_consumption_data` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatadisEntry {
    pub cups: String,
    /// `YYYY/MM/DD`
    pub date: String,
    /// `HH:MM`, labelling the end of the hour.
    pub time: String,
    #[serde(rename = "consumptionKWh")]
    pub consumption_kwh: f64,
    #[serde(rename = "surplusEnergyKWh", default)]
    pub surplus_energy_kwh: Option<f64>,
    #[serde(default)]
    pub obtain_method: Option<String>,
}

/// Start of the hour labelled `time` on `date`.
///
/// Datadis labels hours by their end: `01:00` is the first hour of the day
/// and `24:00` the last one of the same date (`25:00` on the fall-back day).
pub fn hour_start(zone: &CivilZone, date: &str, time: &str) -> Result<OffsetDateTime, PipelineError> {
    let day = Date::parse(date.trim(), format_description!("[year]/[month]/[day]"))
        .map_err(|e| PipelineError::Source(format!("invalid date '{date}': {e}")))?;

    let period: usize = time
        .trim()
        .split_once(':')
        .filter(|(_, minutes)| *minutes == "00")
        .and_then(|(hours, _)| hours.parse().ok())
        .ok_or_else(|| PipelineError::Source(format!("invalid hour label '{time}'")))?;

    zone.period_start(day, period)
        .map_err(|e| PipelineError::Source(e.to_string()))
}

fn entry_to_consumption(entry: DatadisEntry, zone: &CivilZone) -> Result<SupplyConsumption, PipelineError> {
    let ts = hour_start(zone, &entry.date, &entry.time)?;

    Ok(SupplyConsumption {
        ts,
        cups: entry.cups,
        consumption_kwh: entry.consumption_kwh,
        surplus_energy_kwh: entry.surplus_energy_kwh.unwrap_or(0.0),
        obtain_method: entry.obtain_method.filter(|m| !m.trim().is_empty()),
    })
}

/// Hourly consumption and surplus per supply point, as downloaded from the
/// Datadis API into a JSON array file.
pub struct DatadisJsonFileSource {
    path: PathBuf,
    zone: CivilZone,
}

impl DatadisJsonFileSource {
    pub fn new<P: Into<PathBuf>>(path: P, zone: CivilZone) -> Self {
        Self {
            path: path.into(),
            zone,
        }
    }
}

#[async_trait::async_trait]
impl Source<SupplyConsumption> for DatadisJsonFileSource {
    async fn stream(&self) -> EnvelopeStream<SupplyConsumption> {
        let path = self.path.clone();
        let zone = self.zone;
        let s = async_stream::try_stream! {
            let contents = fs::read_to_string(&path)
                .map_err(|e| PipelineError::Source(format!("failed to read Datadis file {}: {e}", path.display())))?;
            let entries: Vec<DatadisEntry> = serde_json::from_str(&contents).map_err(|e| {
                metrics::counter!("datadis_parse_errors_total").increment(1);
                PipelineError::Source(format!("malformed Datadis file {}: {e}", path.display()))
            })?;

            for entry in entries {
                let consumption = match entry_to_consumption(entry, &zone) {
                    Ok(c) => c,
                    Err(e) => {
                        metrics::counter!("datadis_parse_errors_total").increment(1);
                        Err(e)?
                    }
                };

                yield Envelope::now(consumption);
            }
        };

        Box::pin(s)
    }
}

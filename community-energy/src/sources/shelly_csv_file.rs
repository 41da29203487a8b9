use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use energy_client::domain::MeterConsumption;
use time::{macros::format_description, OffsetDateTime, PrimitiveDateTime};

use super::parse_f64;
use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

const TS_COLUMN: &str = "Date/time UTC";
const ENERGY_COLUMN: &str = "Active energy Wh";

/// Folds per-minute energy readings into hourly totals.
///
/// Readings accumulate until one falls on minute `00`; that reading closes
/// the hour, is included in its total and resets the accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HourAccumulator {
    energy_wh: f64,
}

impl HourAccumulator {
    /// Returns the next state and, when `ts` is on the hour, the closed total.
    pub fn push(self, ts: OffsetDateTime, energy_wh: f64) -> (Self, Option<f64>) {
        let total = self.energy_wh + energy_wh;
        if ts.minute() == 0 {
            (Self::default(), Some(total))
        } else {
            (Self { energy_wh: total }, None)
        }
    }

    pub fn pending_wh(&self) -> f64 {
        self.energy_wh
    }
}

/// Per-minute CSV export of a Shelly energy meter (`em_data.csv`).
///
/// Expected header columns (by name):
/// - `Date/time UTC` (`YYYY-MM-DD HH:MM`)
/// - `Active energy Wh`
///
/// Other columns are ignored.
pub struct ShellyCsvFileSource {
    path: PathBuf,
    device: String,
}

impl ShellyCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P, device: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            device: device.into(),
        }
    }
}

fn record_to_reading(record: &StringRecord, headers: &StringRecord) -> Result<(OffsetDateTime, f64), PipelineError> {
    let get = |name: &str| -> Result<&str, PipelineError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in Shelly record")))
    };

    let ts_str = get(TS_COLUMN)?;
    let ts = PrimitiveDateTime::parse(ts_str, format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .map_err(|e| PipelineError::Source(format!("invalid ts '{ts_str}': {e}")))?
        .assume_utc();

    let energy_wh = parse_f64(get(ENERGY_COLUMN)?, ENERGY_COLUMN)?;
    Ok((ts, energy_wh))
}

#[async_trait::async_trait]
impl Source<MeterConsumption> for ShellyCsvFileSource {
    async fn stream(&self) -> EnvelopeStream<MeterConsumption> {
        let path = self.path.clone();
        let device = self.device.clone();
        let s = async_stream::try_stream! {
            let file = File::open(&path)
                .map_err(|e| PipelineError::Source(format!("failed to open Shelly CSV file {}: {e}", path.display())))?;
            let mut rdr = csv::Reader::from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read Shelly CSV headers: {e}")))?
                .clone();

            let mut acc = HourAccumulator::default();
            for result in rdr.records() {
                let record = result.map_err(|e| PipelineError::Source(format!(
                    "failed to read Shelly CSV record: {e}"
                )))?;

                let (ts, energy_wh) = match record_to_reading(&record, &headers) {
                    Ok(r) => r,
                    Err(e) => {
                        metrics::counter!("shelly_csv_parse_errors_total").increment(1);
                        Err(e)?
                    }
                };

                let (next, closed) = acc.push(ts, energy_wh);
                acc = next;
                if let Some(active_energy_wh) = closed {
                    yield Envelope::now(MeterConsumption {
                        ts,
                        device: device.clone(),
                        active_energy_wh,
                    });
                }
            }

            if acc.pending_wh() != 0.0 {
                tracing::debug!(
                    device = %device,
                    pending_wh = acc.pending_wh(),
                    "trailing minutes do not close an hour, left out"
                );
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;
    use time::macros::datetime;

    #[test]
    fn accumulator_closes_the_hour_on_minute_zero() {
        let acc = HourAccumulator::default();
        let (acc, closed) = acc.push(datetime!(2023-08-19 09:58:00 UTC), 2.0);
        assert_eq!(closed, None);
        let (acc, closed) = acc.push(datetime!(2023-08-19 09:59:00 UTC), 3.0);
        assert_eq!(closed, None);
        assert_eq!(acc.pending_wh(), 5.0);

        let (acc, closed) = acc.push(datetime!(2023-08-19 10:00:00 UTC), 1.5);
        assert_eq!(closed, Some(6.5));
        assert_eq!(acc, HourAccumulator::default());
    }

    #[tokio::test]
    async fn emits_one_reading_per_closed_hour() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "Date/time UTC,Active energy Wh,Returned energy Wh,Min V,Max V\n\
             2023-08-19 09:58,2.0,0,229,231\n\
             2023-08-19 09:59,3.0,0,229,231\n\
             2023-08-19 10:00,1.5,0,229,231\n\
             2023-08-19 10:01,4.0,0,229,231\n\
             2023-08-19 11:00,0.5,0,229,231\n\
             2023-08-19 11:01,9.0,0,229,231\n"
        )
        .unwrap();

        let source = ShellyCsvFileSource::new(file.path(), "shelly-em-1");
        let readings: Vec<MeterConsumption> = source
            .stream()
            .await
            .map(|r| r.unwrap().payload)
            .collect()
            .await;

        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].ts, datetime!(2023-08-19 10:00:00 UTC));
        assert_eq!(readings[0].active_energy_wh, 6.5);
        assert_eq!(readings[0].device, "shelly-em-1");
        assert_eq!(readings[1].ts, datetime!(2023-08-19 11:00:00 UTC));
        assert_eq!(readings[1].active_energy_wh, 4.5);
    }

    #[tokio::test]
    async fn unparsable_energy_is_a_source_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Date/time UTC,Active energy Wh\n2023-08-19 10:00,n/a\n").unwrap();

        let source = ShellyCsvFileSource::new(file.path(), "em");
        let items: Vec<_> = source.stream().await.collect().await;
        assert!(matches!(items[0], Err(PipelineError::Source(_))));
    }
}

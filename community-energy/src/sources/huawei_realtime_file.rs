use std::{collections::HashMap, path::PathBuf};

use energy_client::domain::RealtimeProduction;
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// Turns cumulative production totals into per-interval deltas, per station.
///
/// The first total seen for a station yields `0.0`. Every observation
/// replaces the previous total, and a total lower than the previous one
/// (a counter reset, e.g. at midnight) also yields `0.0`.
#[derive(Debug, Clone, Default)]
pub struct ProductionDeltaTracker {
    previous: HashMap<String, f64>,
}

impl ProductionDeltaTracker {
    pub fn observe(&mut self, station_code: &str, total: f64) -> f64 {
        let delta = match self.previous.get(station_code) {
            Some(&prev) if total >= prev => total - prev,
            Some(&prev) => {
                tracing::debug!(station_code, prev, total, "production total decreased, counter reset");
                0.0
            }
            None => 0.0,
        };
        self.previous.insert(station_code.to_string(), total);
        delta
    }
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    collected_at: String,
    station_code: String,
    total_power: f64,
}

/// Newline-delimited JSON snapshots of a station's real-time KPI, one per
/// polling interval: `{"collected_at": RFC3339, "station_code", "total_power"}`.
///
/// Each stream owns a fresh [`ProductionDeltaTracker`], so the first snapshot
/// of every station in the file yields a zero delta.
pub struct HuaweiRealtimeFileSource {
    path: PathBuf,
}

impl HuaweiRealtimeFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source<RealtimeProduction> for HuaweiRealtimeFileSource {
    async fn stream(&self) -> EnvelopeStream<RealtimeProduction> {
        let path = self.path.clone();
        let s = async_stream::try_stream! {
            let file = File::open(&path).await.map_err(|e| {
                PipelineError::Source(format!("failed to open snapshot file {}: {e}", path.display()))
            })?;
            let mut lines = BufReader::new(file).lines();
            let mut tracker = ProductionDeltaTracker::default();
            let mut line_no = 0usize;

            while let Some(line) = lines.next_line().await.map_err(|e| {
                PipelineError::Source(format!("failed to read snapshot line: {e}"))
            })? {
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }

                let snapshot: Snapshot = match serde_json::from_str(&line) {
                    Ok(s) => s,
                    Err(e) => {
                        metrics::counter!("huawei_realtime_parse_errors_total").increment(1);
                        Err(PipelineError::Source(format!("{}:{line_no}: {e}", path.display())))?
                    }
                };

                let ts = match OffsetDateTime::parse(snapshot.collected_at.trim(), &Rfc3339) {
                    Ok(ts) => ts,
                    Err(e) => {
                        metrics::counter!("huawei_realtime_parse_errors_total").increment(1);
                        Err(PipelineError::Source(format!(
                            "invalid collected_at '{}': {e}",
                            snapshot.collected_at
                        )))?
                    }
                };

                let delta = tracker.observe(&snapshot.station_code, snapshot.total_power);
                yield Envelope::now(RealtimeProduction {
                    ts,
                    station_code: snapshot.station_code,
                    inverter_power_delta: delta,
                });
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use futures::StreamExt;
    use std::io::Write;
    use time::macros::datetime;

    #[test]
    fn first_observation_yields_zero_then_differences() {
        let mut tracker = ProductionDeltaTracker::default();
        assert_eq!(tracker.observe("NE=1", 10.0), 0.0);
        assert_relative_eq!(tracker.observe("NE=1", 12.5), 2.5);
        assert_relative_eq!(tracker.observe("NE=1", 12.5), 0.0);
        assert_relative_eq!(tracker.observe("NE=1", 13.0), 0.5);
    }

    #[test]
    fn counter_reset_yields_zero_and_rebases() {
        let mut tracker = ProductionDeltaTracker::default();
        tracker.observe("NE=1", 40.0);
        assert_eq!(tracker.observe("NE=1", 0.3), 0.0);
        assert_relative_eq!(tracker.observe("NE=1", 1.0), 0.7);
    }

    #[test]
    fn stations_are_tracked_independently() {
        let mut tracker = ProductionDeltaTracker::default();
        tracker.observe("NE=1", 5.0);
        assert_eq!(tracker.observe("NE=2", 100.0), 0.0);
        assert_relative_eq!(tracker.observe("NE=1", 6.0), 1.0);
    }

    #[tokio::test]
    async fn snapshots_become_deltas() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"collected_at": "2024-02-10T10:00:00Z", "station_code": "NE=1", "total_power": 3.0}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"collected_at": "2024-02-10T10:10:00Z", "station_code": "NE=1", "total_power": 4.5}}"#).unwrap();

        let source = HuaweiRealtimeFileSource::new(file.path());
        let rows: Vec<RealtimeProduction> = source
            .stream()
            .await
            .map(|r| r.unwrap().payload)
            .collect()
            .await;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].inverter_power_delta, 0.0);
        assert_eq!(rows[1].ts, datetime!(2024-02-10 10:10:00 UTC));
        assert_relative_eq!(rows[1].inverter_power_delta, 1.5);
    }
}

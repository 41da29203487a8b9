use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use energy_client::domain::EnergyPrice;
use time::{Date, Month};

use super::parse_f64;
use crate::{
    calendar::CivilZone,
    pipeline::{Envelope, EnvelopeStream, PipelineError, Source},
};

/// OMIE day-ahead marginal price file (`marginalpdbc_YYYYMMDD.1`).
///
/// `;`-separated, no named header: a title line, then
/// `year;month;day;period;price1;price2;` rows, closed by a `*` line.
/// Prices are EUR/MWh and may be negative. Period `p` is the `p`-th hour of
/// the local day.
pub struct OmiePriceFileSource {
    path: PathBuf,
    zone: CivilZone,
}

impl OmiePriceFileSource {
    pub fn new<P: Into<PathBuf>>(path: P, zone: CivilZone) -> Self {
        Self {
            path: path.into(),
            zone,
        }
    }
}

fn field<'r>(record: &'r StringRecord, idx: usize, name: &str) -> Result<&'r str, PipelineError> {
    record
        .get(idx)
        .map(str::trim)
        .ok_or_else(|| PipelineError::Source(format!("missing {name} in OMIE record")))
}

fn parse_int<T: std::str::FromStr>(s: &str, name: &str) -> Result<T, PipelineError>
where
    T::Err: std::fmt::Display,
{
    s.parse()
        .map_err(|e| PipelineError::Source(format!("invalid {name} '{s}': {e}")))
}

fn record_to_price(record: &StringRecord, zone: &CivilZone) -> Result<EnergyPrice, PipelineError> {
    let year: i32 = parse_int(field(record, 0, "year")?, "year")?;
    let month: u8 = parse_int(field(record, 1, "month")?, "month")?;
    let day: u8 = parse_int(field(record, 2, "day")?, "day")?;
    let period: usize = parse_int(field(record, 3, "period")?, "period")?;

    let month = Month::try_from(month).map_err(|e| PipelineError::Source(format!("invalid month: {e}")))?;
    let date = Date::from_calendar_date(year, month, day)
        .map_err(|e| PipelineError::Source(format!("invalid date: {e}")))?;
    let ts = zone
        .period_start(date, period)
        .map_err(|e| PipelineError::Source(e.to_string()))?;

    Ok(EnergyPrice {
        ts,
        price1: parse_f64(field(record, 4, "price1")?, "price1")?,
        price2: parse_f64(field(record, 5, "price2")?, "price2")?,
    })
}

fn is_title(record: &StringRecord) -> bool {
    record
        .get(0)
        .map(|f| f.trim().parse::<i32>().is_err())
        .unwrap_or(true)
}

#[async_trait::async_trait]
impl Source<EnergyPrice> for OmiePriceFileSource {
    async fn stream(&self) -> EnvelopeStream<EnergyPrice> {
        let path = self.path.clone();
        let zone = self.zone;
        let s = async_stream::try_stream! {
            let file = File::open(&path)
                .map_err(|e| PipelineError::Source(format!("failed to open OMIE file {}: {e}", path.display())))?;
            let mut rdr = csv::ReaderBuilder::new()
                .delimiter(b';')
                .has_headers(false)
                .flexible(true)
                .from_reader(file);

            for (line, result) in rdr.records().enumerate() {
                let record = result.map_err(|e| PipelineError::Source(format!(
                    "failed to read OMIE record: {e}"
                )))?;

                if record.get(0).is_some_and(|f| f.trim_start().starts_with('*')) {
                    break;
                }
                if line == 0 && is_title(&record) {
                    continue;
                }

                let price = match record_to_price(&record, &zone) {
                    Ok(p) => p,
                    Err(e) => {
                        metrics::counter!("omie_price_parse_errors_total").increment(1);
                        Err(PipelineError::Source(format!("{}:{}: {e}", path.display(), line + 1)))?
                    }
                };

                yield Envelope::now(price);
            }
        };

        Box::pin(s)
    }
}

use std::{
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use energy_client::domain::{CommunitySupply, Partner, SupplyPoint};
use tempfile::NamedTempFile;
use time::{macros::format_description, Date};

use super::{run_month, HourSlot, HourlySink, MonthlyTotals, TimeSeriesReader};
use crate::{
    calendar::{BillingMonth, CivilZone},
    config::{ReportConfig, ReportMetric},
    pipeline::PipelineError,
};

/// Hour columns in the hourly report; the fall-back day has 25 hours.
pub const HOUR_COLUMNS: usize = 25;

fn sink_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Sink(format!("report write failed: {e}"))
}

impl ReportMetric {
    fn value(self, row: &CommunitySupply) -> f64 {
        match self {
            ReportMetric::Surplus => row.surplus,
            ReportMetric::Compensation => row.compensation,
            ReportMetric::SelfConsumption => row.self_consumption,
            ReportMetric::Production => row.production,
        }
    }

    fn format(self, value: f64) -> String {
        match self {
            ReportMetric::Compensation => format!("{value:.4}"),
            _ => format!("{value:.3}"),
        }
    }
}

struct DayRow {
    cups: String,
    cells: [Option<f64>; HOUR_COLUMNS],
}

/// Hourly report: one `;`-separated row per supply point and day, with one
/// cell per local hour (`HOR1`..`HOR25`).
pub struct HourlyCsvReport<W: Write> {
    writer: csv::Writer<W>,
    config: ReportConfig,
    day_rows: Vec<DayRow>,
    header_written: bool,
}

impl<W: Write> HourlyCsvReport<W> {
    pub fn new(inner: W, config: ReportConfig) -> Self {
        let writer = csv::WriterBuilder::new().delimiter(b';').from_writer(inner);
        Self {
            writer,
            config,
            day_rows: Vec::new(),
            header_written: false,
        }
    }

    pub fn into_inner(self) -> Result<W, PipelineError> {
        self.writer.into_inner().map_err(|e| sink_error(e.error()))
    }

    fn write_header(&mut self) -> Result<(), PipelineError> {
        let mut header = vec![
            "CIL".to_string(),
            "Tipo de medida (AS/RC/RI)".to_string(),
            "Estado (R/E)".to_string(),
            "FECHA (dd/mm/aaaa)".to_string(),
        ];
        header.extend((1..=HOUR_COLUMNS).map(|h| format!("HOR{h}")));
        self.writer.write_record(&header).map_err(sink_error)?;
        self.header_written = true;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<W: Write + Send> HourlySink for HourlyCsvReport<W> {
    async fn record(
        &mut self,
        slot: &HourSlot,
        supply: &SupplyPoint,
        row: &CommunitySupply,
    ) -> Result<(), PipelineError> {
        if slot.index >= HOUR_COLUMNS {
            return Err(PipelineError::Sink(format!(
                "hour slot {} of {} does not fit the report",
                slot.index, slot.day
            )));
        }

        let pos = match self.day_rows.iter().position(|r| r.cups == supply.cups) {
            Some(pos) => pos,
            None => {
                self.day_rows.push(DayRow {
                    cups: supply.cups.clone(),
                    cells: [None; HOUR_COLUMNS],
                });
                self.day_rows.len() - 1
            }
        };
        self.day_rows[pos].cells[slot.index] = Some(self.config.metric.value(row));
        Ok(())
    }

    async fn end_day(&mut self, day: Date) -> Result<(), PipelineError> {
        if !self.header_written {
            self.write_header()?;
        }

        let date = day
            .format(format_description!("[day]/[month]/[year]"))
            .map_err(sink_error)?;
        let metric = self.config.metric;

        for row in self.day_rows.drain(..) {
            let mut record = vec![
                row.cups,
                self.config.measurement_type.clone(),
                self.config.status.clone(),
                date.clone(),
            ];
            record.extend(
                row.cells
                    .iter()
                    .map(|c| c.map(|v| metric.format(v)).unwrap_or_default()),
            );
            self.writer.write_record(&record).map_err(sink_error)?;
        }
        Ok(())
    }

    async fn finish(&mut self, _totals: &MonthlyTotals) -> Result<(), PipelineError> {
        if !self.header_written {
            self.write_header()?;
        }
        self.writer.flush().map_err(sink_error)
    }
}

/// Monthly summary: one `;`-separated row per supply point with the month's
/// sums and the ratios recomputed from them.
pub struct MonthlySummaryReport<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> MonthlySummaryReport<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().delimiter(b';').from_writer(inner),
        }
    }

    pub fn into_inner(self) -> Result<W, PipelineError> {
        self.writer.into_inner().map_err(|e| sink_error(e.error()))
    }
}

#[async_trait::async_trait]
impl<W: Write + Send> HourlySink for MonthlySummaryReport<W> {
    async fn record(
        &mut self,
        _slot: &HourSlot,
        _supply: &SupplyPoint,
        _row: &CommunitySupply,
    ) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn finish(&mut self, totals: &MonthlyTotals) -> Result<(), PipelineError> {
        self.writer
            .write_record([
                "cups",
                "beta",
                "consumption_final",
                "surplus",
                "self_consumption",
                "self_consumption_percentage",
                "utilization_percentage",
                "compensation",
            ])
            .map_err(sink_error)?;

        for s in &totals.supplies {
            self.writer
                .write_record([
                    s.cups.clone(),
                    s.beta.to_string(),
                    format!("{:.3}", s.consumption_final),
                    format!("{:.3}", s.surplus),
                    format!("{:.3}", s.self_consumption),
                    format!("{:.4}", s.self_consumption_percentage()),
                    format!("{:.4}", s.utilization_percentage()),
                    format!("{:.4}", s.compensation),
                ])
                .map_err(sink_error)?;
        }

        self.writer.flush().map_err(sink_error)
    }
}

/// Where the report files of one month were written.
#[derive(Debug, Clone)]
pub struct MonthReports {
    pub hourly: PathBuf,
    pub summary: PathBuf,
}

fn staging_file(dir: &Path, prefix: &str) -> Result<BufWriter<NamedTempFile>, PipelineError> {
    tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map(BufWriter::new)
        .map_err(|e| sink_error(format!("cannot create file in {}: {e}", dir.display())))
}

fn finish_file(file: BufWriter<NamedTempFile>) -> Result<NamedTempFile, PipelineError> {
    file.into_inner().map_err(|e| sink_error(e.error()))
}

/// Runs `month` into the hourly report and the monthly summary under `dir`.
///
/// Both reports are staged in `dir` and only renamed to
/// `supplies_report_YYYY-MM.csv` and `supplies_summary_YYYY-MM.csv` once the
/// whole month went through. A failed run leaves neither file behind.
pub async fn write_month_reports<R>(
    month: BillingMonth,
    partners: &[Partner],
    zone: &CivilZone,
    reader: &R,
    dir: &Path,
    config: ReportConfig,
) -> Result<(MonthlyTotals, MonthReports), PipelineError>
where
    R: TimeSeriesReader + ?Sized,
{
    std::fs::create_dir_all(dir).map_err(|e| sink_error(format!("cannot create {}: {e}", dir.display())))?;

    let mut sink = (
        HourlyCsvReport::new(staging_file(dir, ".supplies_report_")?, config),
        MonthlySummaryReport::new(staging_file(dir, ".supplies_summary_")?),
    );

    let totals = run_month(month, partners, zone, reader, &mut sink).await?;

    let (hourly, summary) = sink;
    let hourly = finish_file(hourly.into_inner()?)?;
    let summary = finish_file(summary.into_inner()?)?;

    let paths = MonthReports {
        hourly: dir.join(format!("supplies_report_{month}.csv")),
        summary: dir.join(format!("supplies_summary_{month}.csv")),
    };
    hourly.persist(&paths.hourly).map_err(|e| sink_error(e.error))?;
    summary.persist(&paths.summary).map_err(|e| sink_error(e.error))?;

    Ok((totals, paths))
}

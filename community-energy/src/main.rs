use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use community_energy::{
    calendar::{BillingMonth, CivilZone},
    cli::{Args, Command},
    compensation::{run_month, write_month_reports, MonthlyTotals, PointSink, QuestDbReader},
    config::AppConfig,
    metrics_server, observability,
    pipeline::{Pipeline, SinkSummary, Source},
    registry,
    sinks::{IlpWriter, QuestDbIlpSink},
    sources::{
        DatadisJsonFileSource, HuaweiKpiDayFileSource, HuaweiKpiFileSource, HuaweiRealtimeFileSource,
        OmiePriceFileSource, ShellyCsvFileSource,
    },
    transform::{Validate, Validation},
};
use energy_client::domain::{
    EnergyPrice, MeterConsumption, ProductionDay, ProductionHour, RealtimeProduction, SupplyConsumption,
    ToPoint,
};
use sqlx::postgres::{PgPool, PgPoolOptions};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    observability::init_tracing();

    let args = Args::parse();
    let cfg = AppConfig::load(&args.config)?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let zone = CivilZone::parse(&cfg.community.timezone).context("invalid community.timezone")?;

    match args.command {
        Command::Supplies { month } => run_supplies(&cfg, &zone, month).await,
        Command::Report { month } => run_report(&cfg, &zone, month).await,
        Command::LoadPrices { files } => {
            for file in files {
                let source = OmiePriceFileSource::new(&file, zone);
                load_file::<EnergyPrice, _>(&cfg, "omie_prices", &file, source).await?;
            }
            Ok(())
        }
        Command::LoadShelly { file, device } => {
            let source = ShellyCsvFileSource::new(&file, device);
            load_file::<MeterConsumption, _>(&cfg, "shelly", &file, source).await?;
            Ok(())
        }
        Command::LoadDatadis { files } => {
            for file in files {
                let source = DatadisJsonFileSource::new(&file, zone);
                load_file::<SupplyConsumption, _>(&cfg, "datadis", &file, source).await?;
            }
            Ok(())
        }
        Command::LoadProduction { files } => {
            for file in files {
                let source = HuaweiKpiFileSource::new(&file);
                load_file::<ProductionHour, _>(&cfg, "huawei_hourly", &file, source).await?;
            }
            Ok(())
        }
        Command::LoadProductionDaily { files } => {
            for file in files {
                let source = HuaweiKpiDayFileSource::new(&file);
                load_file::<ProductionDay, _>(&cfg, "huawei_daily", &file, source).await?;
            }
            Ok(())
        }
        Command::LoadRealtime { file } => {
            let source = HuaweiRealtimeFileSource::new(&file);
            load_file::<RealtimeProduction, _>(&cfg, "huawei_realtime", &file, source).await?;
            Ok(())
        }
    }
}

async fn connect_pool(cfg: &AppConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(cfg.questdb.max_connections)
        .connect(&cfg.questdb.uri)
        .await
        .context("failed to connect to QuestDB over pgwire")
}

fn ilp_addr(cfg: &AppConfig) -> Result<SocketAddr> {
    cfg.questdb
        .ilp_tcp_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid questdb.ilp_tcp_addr: {e}"))
}

fn log_totals(totals: &MonthlyTotals) {
    for (day, compensation) in &totals.compensation_by_day {
        tracing::debug!(%day, compensation, "daily compensation");
    }
    tracing::info!(
        month = %totals.month,
        hours = totals.hours,
        supplies = totals.supplies.len(),
        missing_samples = totals.missing_samples,
        compensation_by_month = totals.compensation_by_month,
        "month processed"
    );
}

async fn run_supplies(cfg: &AppConfig, zone: &CivilZone, month: BillingMonth) -> Result<()> {
    let partners = registry::load_partners(&cfg.community.partners_file)?;
    let reader = QuestDbReader::new(connect_pool(cfg).await?);

    let writer = IlpWriter::new(
        ilp_addr(cfg)?,
        cfg.sink.batch_size,
        cfg.sink.max_retries,
        Duration::from_millis(cfg.sink.retry_backoff_ms),
    );
    let mut sink = PointSink::new(writer);

    let totals = run_month(month, &partners, zone, &reader, &mut sink)
        .await
        .with_context(|| format!("monthly run for {month} failed"))?;

    log_totals(&totals);
    tracing::info!(points = sink.written(), "community supply points written");
    Ok(())
}

async fn run_report(cfg: &AppConfig, zone: &CivilZone, month: BillingMonth) -> Result<()> {
    let partners = registry::load_partners(&cfg.community.partners_file)?;
    let reader = QuestDbReader::new(connect_pool(cfg).await?);

    let (totals, reports) = write_month_reports(
        month,
        &partners,
        zone,
        &reader,
        &cfg.community.report_dir,
        cfg.community.report.clone(),
    )
    .await
    .with_context(|| format!("report for {month} failed"))?;

    log_totals(&totals);
    tracing::info!(
        hourly = %reports.hourly.display(),
        summary = %reports.summary.display(),
        "reports written"
    );
    Ok(())
}

async fn load_file<T, S>(cfg: &AppConfig, name: &'static str, file: &Path, source: S) -> Result<SinkSummary>
where
    T: Validate + ToPoint + Send + Sync + 'static,
    S: Source<T> + Send + Sync + 'static,
{
    let pipeline: Pipeline<_, T, _> = Pipeline {
        name,
        source,
        transforms: vec![Arc::new(Validation::<T>::default())],
        sink: QuestDbIlpSink::<T>::new(
            ilp_addr(cfg)?,
            cfg.sink.batch_size,
            cfg.sink.max_retries,
            Duration::from_millis(cfg.sink.retry_backoff_ms),
        ),
    };

    let summary = pipeline
        .run()
        .await
        .with_context(|| format!("loading {} failed", file.display()))?;

    tracing::info!(
        file = %file.display(),
        written = summary.written,
        rejected = summary.rejected,
        "file loaded"
    );
    Ok(summary)
}

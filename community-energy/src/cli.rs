use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::calendar::BillingMonth;

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Args {
    /// TOML configuration file.
    #[clap(
        long,
        global = true,
        env = "COMMUNITY_CONFIG",
        default_value = "community-config.toml"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compute the hourly compensation of every supply point for a month and
    /// store it back as `community_supply` points.
    #[clap(name = "supplies")]
    Supplies {
        /// Month to process, as `YYYY-MM`.
        month: BillingMonth,
    },

    /// Write the hourly report and the monthly summary CSV files for a month.
    #[clap(name = "report")]
    Report {
        /// Month to report, as `YYYY-MM`.
        month: BillingMonth,
    },

    /// Load OMIE day-ahead price files (`marginalpdbc_YYYYMMDD.1`).
    #[clap(name = "load-prices")]
    LoadPrices {
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },

    /// Load a per-minute Shelly energy meter export as hourly totals.
    #[clap(name = "load-shelly")]
    LoadShelly {
        file: PathBuf,

        /// Device name stored as the `device` tag.
        #[clap(long, env = "SHELLY_DEVICE")]
        device: String,
    },

    /// Load hourly consumption and surplus downloaded from Datadis.
    #[clap(name = "load-datadis")]
    LoadDatadis {
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },

    /// Load hourly installation production (FusionSolar `getKpiStationHour` responses).
    #[clap(name = "load-production")]
    LoadProduction {
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },

    /// Load daily installation production (FusionSolar `getKpiStationDay` responses).
    #[clap(name = "load-production-daily")]
    LoadProductionDaily {
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },

    /// Load real-time production snapshots (NDJSON) as per-interval deltas.
    #[clap(name = "load-realtime")]
    LoadRealtime { file: PathBuf },
}

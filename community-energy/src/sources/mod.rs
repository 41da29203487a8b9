pub mod datadis_json_file;
pub mod huawei_kpi_file;
pub mod huawei_realtime_file;
pub mod omie_price_file;
pub mod shelly_csv_file;

pub use datadis_json_file::DatadisJsonFileSource;
pub use huawei_kpi_file::{HuaweiKpiDayFileSource, HuaweiKpiFileSource};
pub use huawei_realtime_file::{HuaweiRealtimeFileSource, ProductionDeltaTracker};
pub use omie_price_file::OmiePriceFileSource;
pub use shelly_csv_file::{HourAccumulator, ShellyCsvFileSource};

use crate::pipeline::PipelineError;

fn parse_f64(s: &str, name: &str) -> Result<f64, PipelineError> {
    s.trim()
        .parse()
        .map_err(|e| PipelineError::Source(format!("invalid {name} '{s}': {e}")))
}

//! Calendar helpers: the billing month argument and civil-time localization.

mod civil;
mod month;

pub use civil::CivilZone;
pub use month::BillingMonth;

use crate::pipeline::PipelineError;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CalendarError {
    #[error("month '{0}' has an invalid format, use yyyy-mm")]
    InvalidMonth(String),
    #[error("unknown time zone '{0}': {1}")]
    UnknownZone(String, String),
    #[error("local time {0} cannot be resolved in {1}")]
    Unresolvable(String, String),
    #[error("date out of range: {0}")]
    OutOfRange(String),
}

impl From<CalendarError> for PipelineError {
    fn from(e: CalendarError) -> Self {
        PipelineError::Config(e.to_string())
    }
}

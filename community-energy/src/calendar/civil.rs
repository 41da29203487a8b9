use std::fmt;

use chrono::{NaiveDate, TimeZone};
use chrono_tz::Tz;
use time::{Date, Duration, OffsetDateTime};

use super::CalendarError;

/// The civil time zone in which the community reads its meters and reports.
///
/// Stores index by UTC instant while source files and reports use local
/// civil time; every local hour goes through here before hitting a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilZone {
    tz: Tz,
}

impl CivilZone {
    pub fn parse(name: &str) -> Result<Self, CalendarError> {
        let tz: Tz = name
            .parse()
            .map_err(|e| CalendarError::UnknownZone(name.to_string(), format!("{e}")))?;
        Ok(Self { tz })
    }

    /// UTC instant at which `day` starts in this zone.
    pub fn local_midnight_utc(&self, day: Date) -> Result<OffsetDateTime, CalendarError> {
        self.local_hour_utc(day, 0)
    }

    /// UTC instant of `hour:00` local time on `day`.
    ///
    /// Ambiguous times (the repeated hour when clocks go back) resolve to the
    /// first occurrence. Skipped times are an error.
    pub fn local_hour_utc(&self, day: Date, hour: u32) -> Result<OffsetDateTime, CalendarError> {
        let naive = NaiveDate::from_ymd_opt(day.year(), u32::from(u8::from(day.month())), u32::from(day.day()))
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .ok_or_else(|| CalendarError::OutOfRange(format!("{day} {hour:02}:00")))?;

        let local = self
            .tz
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| CalendarError::Unresolvable(naive.to_string(), self.tz.name().to_string()))?;

        OffsetDateTime::from_unix_timestamp(local.timestamp())
            .map_err(|e| CalendarError::OutOfRange(e.to_string()))
    }

    /// Start instants of every hour of the local day, ascending.
    ///
    /// Ordinary days yield 24 slots, the spring-forward day 23 and the
    /// fall-back day 25.
    pub fn hour_slots(&self, day: Date) -> Result<Vec<OffsetDateTime>, CalendarError> {
        let start = self.local_midnight_utc(day)?;
        let next = day
            .next_day()
            .ok_or_else(|| CalendarError::OutOfRange(format!("day after {day}")))?;
        let end = self.local_midnight_utc(next)?;

        let mut slots = Vec::with_capacity(25);
        let mut t = start;
        while t < end {
            slots.push(t);
            t += Duration::HOUR;
        }
        Ok(slots)
    }

    /// Start of the 1-based hourly `period` of `day`, counted from local
    /// midnight in elapsed hours. Period 25 only exists on the fall-back day.
    pub fn period_start(&self, day: Date, period: usize) -> Result<OffsetDateTime, CalendarError> {
        let slots = self.hour_slots(day)?;
        period
            .checked_sub(1)
            .and_then(|i| slots.get(i).copied())
            .ok_or_else(|| {
                CalendarError::OutOfRange(format!("period {period} of {day} ({} hours)", slots.len()))
            })
    }

    /// Renders a UTC instant in local time, for logs and report cells.
    pub fn format_local(&self, at: OffsetDateTime) -> String {
        match self.tz.timestamp_opt(at.unix_timestamp(), 0).single() {
            Some(local) => local.format("%Y-%m-%d %H:%M%:z").to_string(),
            None => at.to_string(),
        }
    }
}

impl fmt::Display for CivilZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tz.name())
    }
}

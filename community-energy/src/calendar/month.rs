use std::{fmt, str::FromStr};

use time::{Date, Month};

use super::CalendarError;

/// A calendar month given as `YYYY-MM` on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingMonth {
    first_day: Date,
    last_day: Date,
}

impl BillingMonth {
    pub fn new(year: i32, month: Month) -> Result<Self, CalendarError> {
        let out_of_range = |e: time::error::ComponentRange| CalendarError::OutOfRange(e.to_string());
        let first_day = Date::from_calendar_date(year, month, 1).map_err(out_of_range)?;
        let last_day = Date::from_calendar_date(year, month, month.length(year)).map_err(out_of_range)?;
        Ok(Self { first_day, last_day })
    }

    pub fn first_day(&self) -> Date {
        self.first_day
    }

    pub fn last_day(&self) -> Date {
        self.last_day
    }

    /// Every day of the month in ascending order.
    pub fn days(&self) -> impl Iterator<Item = Date> {
        let last = self.last_day;
        std::iter::successors(Some(self.first_day), move |d| d.next_day().filter(|n| *n <= last))
    }
}

impl FromStr for BillingMonth {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CalendarError::InvalidMonth(s.to_string());

        let (y, m) = s.split_once('-').ok_or_else(invalid)?;
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if y.len() != 4 || m.len() != 2 || !all_digits(y) || !all_digits(m) {
            return Err(invalid());
        }

        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u8 = m.parse().map_err(|_| invalid())?;
        let month = Month::try_from(month).map_err(|_| invalid())?;

        Self::new(year, month)
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.first_day.year(), u8::from(self.first_day.month()))
    }
}

use std::fmt;
use std::str::FromStr;

use time::{macros::format_description, Date, Month};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GranularityError {
    #[error("unknown granularity '{0}'; expected day, month, year or custom")]
    Unknown(String),
    #[error("invalid date '{0}'; expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("range start {start} is after end {end}")]
    InvertedRange { start: Date, end: Date },
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: Date,
    end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Result<Self, GranularityError> {
        if start > end {
            return Err(GranularityError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Date {
        self.start
    }

    pub fn end(&self) -> Date {
        self.end
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }

    /// Parses `YYYY-MM-DD..YYYY-MM-DD`.
    pub fn parse(s: &str) -> Result<Self, GranularityError> {
        let (start, end) = s
            .split_once("..")
            .ok_or_else(|| GranularityError::InvalidDate(s.to_string()))?;
        Self::new(parse_date(start)?, parse_date(end)?)
    }
}

pub fn parse_date(s: &str) -> Result<Date, GranularityError> {
    Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| GranularityError::InvalidDate(s.trim().to_string()))
}

/// Resolution requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Month,
    Year,
    Custom(Option<DateRange>),
}

/// Granularity without its payload, used as decision-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GranularityKind {
    Day,
    Month,
    Year,
    Custom,
}

impl Granularity {
    pub fn kind(&self) -> GranularityKind {
        match self {
            Granularity::Day => GranularityKind::Day,
            Granularity::Month => GranularityKind::Month,
            Granularity::Year => GranularityKind::Year,
            Granularity::Custom(_) => GranularityKind::Custom,
        }
    }

    pub fn range(&self) -> Option<&DateRange> {
        match self {
            Granularity::Custom(range) => range.as_ref(),
            _ => None,
        }
    }
}

impl FromStr for Granularity {
    type Err = GranularityError;

    /// Accepts `day`, `month`, `year`, `custom` and
    /// `custom:YYYY-MM-DD..YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, range) = match s.split_once(':') {
            Some((name, range)) => (name, Some(range)),
            None => (s, None),
        };
        match (name.to_ascii_lowercase().as_str(), range) {
            ("day", None) => Ok(Granularity::Day),
            ("month", None) => Ok(Granularity::Month),
            ("year", None) => Ok(Granularity::Year),
            ("custom", None) => Ok(Granularity::Custom(None)),
            ("custom", Some(range)) => Ok(Granularity::Custom(Some(DateRange::parse(range)?))),
            _ => Err(GranularityError::Unknown(s.to_string())),
        }
    }
}

impl fmt::Display for GranularityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GranularityKind::Day => "day",
            GranularityKind::Month => "month",
            GranularityKind::Year => "year",
            GranularityKind::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// Adds calendar months, clamping the day to the target month's length.
///
/// Returns `None` outside the supported year range.
pub fn add_months(date: Date, months: u32) -> Option<Date> {
    let index = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1 + i64::from(months);
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(index.rem_euclid(12) + 1).ok()?).ok()?;
    let day = date.day().min(time::util::days_in_year_month(year, month));
    Date::from_calendar_date(year, month, day).ok()
}

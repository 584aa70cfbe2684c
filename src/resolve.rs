//! Duration resolution: turns a duration selection into one canonical
//! [`DateRange`] before dispatch.
//!
//! Two calendar policies exist. [`Calendar::Legacy`] reproduces the fixed
//! lookup tables the forms were built around: February always ends on the
//! 28th, and the december-february season ends in the *same* year it starts
//! (so its range is inverted). [`Calendar::Gregorian`] uses real month
//! lengths and rolls the winter season into the following year.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PlotError;
use crate::request::{DateRange, DurationMode, DurationSelection, HalfYear, parse_date, parse_year};

/// Last day of each month in the legacy table (non-leap February).
const MONTH_END_DAYS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// First day offered in the week picker.
pub fn week_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 5, 1).expect("week epoch is a valid date")
}

/// Calendar policy for month and season resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Calendar {
    #[default]
    Legacy,
    Gregorian,
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Gregorian => write!(f, "gregorian"),
        }
    }
}

/// Meteorological seasons offered by the forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    MarchMay,
    JuneAugust,
    SeptemberNovember,
    DecemberFebruary,
}

impl Season {
    pub const ALL: [Season; 4] = [
        Self::MarchMay,
        Self::JuneAugust,
        Self::SeptemberNovember,
        Self::DecemberFebruary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MarchMay => "march-may",
            Self::JuneAugust => "june-august",
            Self::SeptemberNovember => "september-november",
            Self::DecemberFebruary => "december-february",
        }
    }

    /// (start month, start day, end month, end day) from the season table.
    fn bounds(self) -> (u32, u32, u32, u32) {
        match self {
            Self::MarchMay => (3, 1, 5, 31),
            Self::JuneAugust => (6, 1, 8, 31),
            Self::SeptemberNovember => (9, 1, 11, 30),
            Self::DecemberFebruary => (12, 1, 2, 28),
        }
    }
}

impl FromStr for Season {
    type Err = PlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|season| season.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                PlotError::invalid(
                    "timeframe",
                    s,
                    "one of march-may, june-august, september-november, december-february",
                )
            })
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve a validated duration selection into a date range.
pub fn resolve(selection: &DurationSelection, calendar: Calendar) -> Result<DateRange, PlotError> {
    match selection {
        DurationSelection::Date(range) => Ok(*range),
        DurationSelection::Year { year_field, year } => {
            let year = year
                .as_deref()
                .ok_or(PlotError::UnresolvedTimeframe(DurationMode::Year))?;
            year_range(parse_year(year_field, year)?)
        }
        DurationSelection::Month { year_field, year, month } => {
            let month = month
                .as_deref()
                .ok_or(PlotError::UnresolvedTimeframe(DurationMode::Month))?;
            let year = year.as_deref().ok_or_else(|| PlotError::missing(year_field))?;
            month_range(parse_year(year_field, year)?, parse_month(month)?, calendar)
        }
        DurationSelection::Season { year_field, year, season } => {
            let season = season
                .as_deref()
                .ok_or(PlotError::UnresolvedTimeframe(DurationMode::Season))?;
            let year = year.as_deref().ok_or_else(|| PlotError::missing(year_field))?;
            season_range(parse_year(year_field, year)?, season.parse()?, calendar)
        }
        DurationSelection::Week { token } => {
            let token = token
                .as_deref()
                .ok_or(PlotError::UnresolvedTimeframe(DurationMode::Week))?;
            parse_week_token(token)
        }
    }
}

/// `[Y-01-01, Y-12-31]`.
pub fn year_range(year: i32) -> Result<DateRange, PlotError> {
    Ok(DateRange::new(ymd(year, 1, 1)?, ymd(year, 12, 31)?))
}

/// `[Y-M-01, Y-M-last]`.
pub fn month_range(year: i32, month: u32, calendar: Calendar) -> Result<DateRange, PlotError> {
    let last = match calendar {
        Calendar::Legacy => *MONTH_END_DAYS
            .get((month as usize).wrapping_sub(1))
            .ok_or_else(|| PlotError::invalid("timeframe", &month.to_string(), "a month from 01 to 12"))?,
        Calendar::Gregorian => last_day_of_month(year, month)?,
    };
    Ok(DateRange::new(ymd(year, month, 1)?, ymd(year, month, last)?))
}

/// Season bounds for the given year.
///
/// Under [`Calendar::Legacy`] december-february resolves to
/// `[Y-12-01, Y-02-28]`, an inverted range, and is passed on unchanged.
pub fn season_range(year: i32, season: Season, calendar: Calendar) -> Result<DateRange, PlotError> {
    let (sm, sd, em, ed) = season.bounds();
    let start = ymd(year, sm, sd)?;
    let end = match (calendar, season) {
        (Calendar::Legacy, _) => ymd(year, em, ed)?,
        (Calendar::Gregorian, Season::DecemberFebruary) => {
            ymd(year + 1, em, last_day_of_month(year + 1, em)?)?
        }
        (Calendar::Gregorian, _) => ymd(year, em, ed)?,
    };
    Ok(DateRange::new(start, end))
}

/// Window covered by a nightlight half-year token.
///
/// `jul-dec` ends on December 30th, matching the window the nightlight
/// script itself queries.
pub fn half_year_range(year: i32, half: HalfYear) -> Result<DateRange, PlotError> {
    let (start, end) = match half {
        HalfYear::JanJun => (ymd(year, 1, 1)?, ymd(year, 6, 30)?),
        HalfYear::JulDec => (ymd(year, 7, 1)?, ymd(year, 12, 30)?),
        HalfYear::JanDec => (ymd(year, 1, 1)?, ymd(year, 12, 31)?),
    };
    Ok(DateRange::new(start, end))
}

// ---------------------------------------------------------------------------
// Weeks
// ---------------------------------------------------------------------------

/// Week options from `epoch` through `today`: each starts 7 days after the
/// previous one and spans 6 days inclusive.
pub fn week_options(epoch: NaiveDate, today: NaiveDate) -> Vec<DateRange> {
    let mut weeks = Vec::new();
    let mut start = epoch;
    while start <= today {
        weeks.push(DateRange::new(start, start + Duration::days(6)));
        start += Duration::days(7);
    }
    weeks
}

/// Encode a week as the `START_END` token the forms submit.
pub fn week_token(range: &DateRange) -> String {
    format!("{}_{}", range.start, range.end)
}

static WEEK_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})_(\d{4}-\d{2}-\d{2})$").expect("valid week token regex")
});

/// Decode a `START_END` week token.
pub fn parse_week_token(token: &str) -> Result<DateRange, PlotError> {
    let token = token.trim();
    let caps = WEEK_TOKEN_RE
        .captures(token)
        .ok_or_else(|| PlotError::invalid("timeframe", token, "a START_END week token"))?;
    let range = DateRange::new(
        parse_date("timeframe", &caps[1])?,
        parse_date("timeframe", &caps[2])?,
    );
    if !range.is_ordered() {
        return Err(PlotError::invalid("timeframe", token, "a week that ends after it starts"));
    }
    Ok(range)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const MONTH_NAMES: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

/// Month number from `01`..`12`, a full English name, or its first three
/// letters.
fn parse_month(token: &str) -> Result<u32, PlotError> {
    let trimmed = token.trim();
    let by_number = trimmed.parse::<u32>().ok().filter(|m| (1..=12).contains(m));
    let by_name = || {
        let lower = trimmed.to_ascii_lowercase();
        MONTH_NAMES
            .iter()
            .position(|name| *name == lower || (lower.len() == 3 && name.starts_with(&lower)))
            .map(|i| i as u32 + 1)
    };
    by_number
        .or_else(by_name)
        .ok_or_else(|| PlotError::invalid("timeframe", token, "a month from 01 to 12"))
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate, PlotError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        PlotError::Validation(format!("{year:04}-{month:02}-{day:02} is not a valid date"))
    })
}

fn last_day_of_month(year: i32, month: u32) -> Result<u32, PlotError> {
    let next = if month == 12 {
        ymd(year + 1, 1, 1)?
    } else {
        ymd(year, month + 1, 1)?
    };
    next.pred_opt()
        .map(|d| d.day())
        .ok_or_else(|| PlotError::Validation(format!("no last day for {year}-{month:02}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

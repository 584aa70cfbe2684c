//! Request model and validation.
//!
//! Turns a raw JSON body into a typed [`PlotRequest`] or [`NtlRequest`].
//! Validation is pure: it checks presence and shape of the fields required
//! for the selected plot kind and duration mode, and the supported data
//! window for explicit date ranges. Turning the remaining duration modes into
//! dates is the resolver's job (see [`crate::resolve`]).

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::AirplotConfig;
use crate::error::PlotError;

// ---------------------------------------------------------------------------
// Core value types
// ---------------------------------------------------------------------------

/// Pollutants with a Sentinel-5P analysis script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Pollutant {
    Co,
    Hcho,
    No2,
    So2,
}

impl Pollutant {
    pub const ALL: [Pollutant; 4] = [Self::Co, Self::Hcho, Self::No2, Self::So2];

    /// Token used in script names and request bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Co => "CO",
            Self::Hcho => "HCHO",
            Self::No2 => "NO2",
            Self::So2 => "SO2",
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pollutant {
    type Err = PlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PlotError::invalid("pollutant", s, "one of CO, HCHO, NO2, SO2"))
    }
}

/// Category of pollutant visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PlotKind {
    Map,
    TimeSeries,
}

impl PlotKind {
    pub const ALL: [PlotKind; 2] = [Self::Map, Self::TimeSeries];

    /// Suffix used in script names (`NO2_Map`, `CO_Time_Series`).
    pub fn script_suffix(self) -> &'static str {
        match self {
            Self::Map => "Map",
            Self::TimeSeries => "Time_Series",
        }
    }
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.script_suffix())
    }
}

impl FromStr for PlotKind {
    type Err = PlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "map" => Ok(Self::Map),
            "timeseries" => Ok(Self::TimeSeries),
            _ => Err(PlotError::invalid("plotType", s, "Map or TimeSeries")),
        }
    }
}

/// Granularity of the requested time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DurationMode {
    Date,
    Year,
    Month,
    Season,
    Week,
}

impl fmt::Display for DurationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Date => "date",
            Self::Year => "year",
            Self::Month => "month",
            Self::Season => "season",
            Self::Week => "week",
        };
        f.write_str(s)
    }
}

impl FromStr for DurationMode {
    type Err = PlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" => Ok(Self::Date),
            "year" => Ok(Self::Year),
            "month" => Ok(Self::Month),
            "season" => Ok(Self::Season),
            "week" => Ok(Self::Week),
            _ => Err(PlotError::invalid(
                "duration",
                s,
                "one of Date, Year, Month, Season, Week",
            )),
        }
    }
}

/// Half-year window accepted by the nightlight script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HalfYear {
    JanJun,
    JulDec,
    JanDec,
}

impl HalfYear {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JanJun => "jan-jun",
            Self::JulDec => "jul-dec",
            Self::JanDec => "jan-dec",
        }
    }
}

impl FromStr for HalfYear {
    type Err = PlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jan-jun" => Ok(Self::JanJun),
            "jul-dec" => Ok(Self::JulDec),
            "jan-dec" => Ok(Self::JanDec),
            _ => Err(PlotError::invalid(
                "halfYear",
                s,
                "one of jan-jun, jul-dec, jan-dec",
            )),
        }
    }
}

/// Inclusive calendar date range passed to the analysis scripts.
///
/// Display and script arguments use `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Supported data window for explicit date-range requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub min: NaiveDate,
    pub max: NaiveDate,
}

impl DateWindow {
    /// Check an explicit range against the window.
    pub fn check(&self, range: &DateRange) -> Result<(), PlotError> {
        let reason = if range.start < self.min {
            format!("start is before {}", self.min)
        } else if range.end > self.max {
            format!("end is after {}", self.max)
        } else if !range.is_ordered() {
            "start is after end".to_string()
        } else {
            return Ok(());
        };
        Err(PlotError::OutOfRange {
            start: range.start,
            end: range.end,
            reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// The active duration representation of a pollutant request.
///
/// Explicit dates are parsed and window-checked during validation; the other
/// modes keep their raw tokens until resolution, which is where a missing
/// timeframe is reported. `year_field` is the form field the year came from
/// and names it in resolver errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DurationSelection {
    Date(DateRange),
    Year { year_field: &'static str, year: Option<String> },
    Month { year_field: &'static str, year: Option<String>, month: Option<String> },
    Season { year_field: &'static str, year: Option<String>, season: Option<String> },
    Week { token: Option<String> },
}

impl DurationSelection {
    pub fn mode(&self) -> DurationMode {
        match self {
            Self::Date(_) => DurationMode::Date,
            Self::Year { .. } => DurationMode::Year,
            Self::Month { .. } => DurationMode::Month,
            Self::Season { .. } => DurationMode::Season,
            Self::Week { .. } => DurationMode::Week,
        }
    }
}

/// A validated pollutant map or time-series request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotRequest {
    pub city: String,
    pub pollutant: Pollutant,
    pub kind: PlotKind,
    pub duration: DurationSelection,
}

/// A validated nightlight (NTL) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtlRequest {
    pub city: String,
    pub year: i32,
    pub half_year: HalfYear,
}

/// JSON field names used by one endpoint.
struct FieldNames {
    city: &'static str,
    pollutant: &'static str,
    plot_type: Option<&'static str>,
    duration: &'static str,
    start_date: &'static str,
    end_date: &'static str,
    year: &'static str,
    timeframe: &'static str,
}

const POLLUTION_FIELDS: FieldNames = FieldNames {
    city: "city",
    pollutant: "pollutant",
    plot_type: Some("plotType"),
    duration: "duration",
    start_date: "startDate",
    end_date: "endDate",
    year: "year",
    timeframe: "timeframe",
};

const TIME_SERIES_FIELDS: FieldNames = FieldNames {
    city: "timeSeriesCity",
    pollutant: "timeSeriesPollutant",
    plot_type: None,
    duration: "timeSeriesDuration",
    start_date: "timeSeriesStartDate",
    end_date: "timeSeriesEndDate",
    year: "timeSeriesYear",
    timeframe: "timeSeriesTimeframe",
};

/// A parsed JSON object body with lenient field access.
struct RequestBody(Map<String, Value>);

impl RequestBody {
    fn parse(raw: &str) -> Result<Self, PlotError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            _ => Err(PlotError::Validation(
                "request body must be a JSON object".to_string(),
            )),
        }
    }

    /// Field text, or `None` when absent, null, or blank. Numbers are
    /// accepted for fields like `ntlYear` that forms sometimes send unquoted.
    fn text(&self, key: &str) -> Option<String> {
        let text = match self.0.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    fn required(&self, key: &str) -> Result<String, PlotError> {
        self.text(key).ok_or_else(|| PlotError::missing(key))
    }
}

/// Parse a `YYYY-MM-DD` field.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, PlotError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| PlotError::invalid(field, value, "a YYYY-MM-DD date"))
}

/// Parse a four-digit year field.
pub fn parse_year(field: &str, value: &str) -> Result<i32, PlotError> {
    let value = value.trim();
    if value.len() != 4 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PlotError::invalid(field, value, "a four-digit year"));
    }
    value
        .parse()
        .map_err(|_| PlotError::invalid(field, value, "a four-digit year"))
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Field-presence and range checks for incoming requests.
#[derive(Debug, Clone)]
pub struct Validator {
    cities: Vec<String>,
    window: DateWindow,
}

impl Validator {
    /// An empty city list accepts any non-blank city.
    pub fn new(cities: Vec<String>, window: DateWindow) -> Self {
        Self { cities, window }
    }

    pub fn from_config(config: &AirplotConfig) -> Self {
        Self::new(config.cities.supported.clone(), config.resolver.window())
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    pub fn cities(&self) -> &[String] {
        &self.cities
    }

    /// Validate a `POST /pollution-data` body.
    pub fn pollution(&self, raw: &str) -> Result<PlotRequest, PlotError> {
        self.plot_request(raw, &POLLUTION_FIELDS, PlotKind::Map)
    }

    /// Validate a `POST /time-series-data` body.
    pub fn time_series(&self, raw: &str) -> Result<PlotRequest, PlotError> {
        self.plot_request(raw, &TIME_SERIES_FIELDS, PlotKind::TimeSeries)
    }

    /// Validate a `POST /ntl-data` body.
    pub fn ntl(&self, raw: &str) -> Result<NtlRequest, PlotError> {
        let body = RequestBody::parse(raw)?;
        let city = body.required("ntlCity")?;
        let year = body.required("ntlYear")?;
        let half_year = body.required("halfYear")?;

        Ok(NtlRequest {
            city: self.city("ntlCity", &city)?,
            year: parse_year("ntlYear", &year)?,
            half_year: half_year.parse()?,
        })
    }

    fn plot_request(
        &self,
        raw: &str,
        fields: &FieldNames,
        default_kind: PlotKind,
    ) -> Result<PlotRequest, PlotError> {
        let body = RequestBody::parse(raw)?;

        let city = body.required(fields.city)?;
        let pollutant = body.required(fields.pollutant)?;
        let kind = match fields.plot_type.and_then(|f| body.text(f)) {
            Some(token) => token.parse()?,
            None => default_kind,
        };
        let mode = match body.text(fields.duration) {
            Some(token) => token.parse()?,
            None => DurationMode::Date,
        };

        let duration = match mode {
            DurationMode::Date => {
                let start = body.required(fields.start_date)?;
                let end = body.required(fields.end_date)?;
                let range = DateRange::new(
                    parse_date(fields.start_date, &start)?,
                    parse_date(fields.end_date, &end)?,
                );
                self.window.check(&range)?;
                DurationSelection::Date(range)
            }
            DurationMode::Year => DurationSelection::Year {
                year_field: fields.year,
                year: body.text(fields.year),
            },
            DurationMode::Month => DurationSelection::Month {
                year_field: fields.year,
                year: body.text(fields.year),
                month: body.text(fields.timeframe),
            },
            DurationMode::Season => DurationSelection::Season {
                year_field: fields.year,
                year: body.text(fields.year),
                season: body.text(fields.timeframe),
            },
            DurationMode::Week => DurationSelection::Week {
                token: body.text(fields.timeframe),
            },
        };

        Ok(PlotRequest {
            city: self.city(fields.city, &city)?,
            pollutant: pollutant.parse()?,
            kind,
            duration,
        })
    }

    /// Match a city against the supported list, returning its canonical
    /// spelling.
    fn city(&self, field: &str, value: &str) -> Result<String, PlotError> {
        if self.cities.is_empty() {
            return Ok(value.to_string());
        }
        self.cities
            .iter()
            .find(|c| c.eq_ignore_ascii_case(value))
            .cloned()
            .ok_or_else(|| PlotError::invalid(field, value, "a supported city"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn validator() -> Validator {
        Validator::new(
            vec!["Mumbai".to_string(), "Delhi".to_string()],
            DateWindow {
                min: date(2018, 4, 30),
                max: date(2025, 6, 5),
            },
        )
    }

    #[test]
    fn pollution_body_with_explicit_dates() {
        let req = validator()
            .pollution(
                r#"{"city":"Mumbai","pollutant":"NO2","startDate":"2020-01-01","endDate":"2020-01-31","plotType":"Map"}"#,
            )
            .unwrap();
        assert_eq!(req.city, "Mumbai");
        assert_eq!(req.pollutant, Pollutant::No2);
        assert_eq!(req.kind, PlotKind::Map);
        assert_eq!(
            req.duration,
            DurationSelection::Date(DateRange::new(date(2020, 1, 1), date(2020, 1, 31)))
        );
    }

    #[test]
    fn missing_city_is_a_validation_error() {
        let err = validator()
            .pollution(r#"{"pollutant":"NO2","startDate":"2020-01-01","endDate":"2020-01-31"}"#)
            .unwrap_err();
        assert!(matches!(err, PlotError::Validation(_)));
        assert!(err.to_string().contains("city"));
    }

    #[test]
    fn blank_field_counts_as_missing() {
        let err = validator()
            .pollution(r#"{"city":"  ","pollutant":"NO2","startDate":"2020-01-01","endDate":"2020-01-31"}"#)
            .unwrap_err();
        assert!(matches!(err, PlotError::Validation(_)));
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(matches!(
            validator().pollution("[1,2]"),
            Err(PlotError::Validation(_))
        ));
        assert!(matches!(
            validator().pollution("not json"),
            Err(PlotError::Validation(_))
        ));
    }

    #[test]
    fn start_before_window_is_out_of_range() {
        let err = validator()
            .pollution(r#"{"city":"Mumbai","pollutant":"CO","startDate":"2018-04-29","endDate":"2018-05-10"}"#)
            .unwrap_err();
        assert!(matches!(err, PlotError::OutOfRange { .. }));
    }

    #[test]
    fn end_after_window_is_out_of_range() {
        let err = validator()
            .pollution(r#"{"city":"Mumbai","pollutant":"CO","startDate":"2025-06-01","endDate":"2025-06-06"}"#)
            .unwrap_err();
        assert!(matches!(err, PlotError::OutOfRange { .. }));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let req = validator()
            .pollution(r#"{"city":"Mumbai","pollutant":"CO","startDate":"2018-04-30","endDate":"2025-06-05"}"#);
        assert!(req.is_ok());
    }

    #[test]
    fn inverted_range_is_out_of_range() {
        let err = validator()
            .pollution(r#"{"city":"Mumbai","pollutant":"CO","startDate":"2020-02-01","endDate":"2020-01-01"}"#)
            .unwrap_err();
        assert!(matches!(err, PlotError::OutOfRange { .. }));
    }

    #[test]
    fn malformed_date_is_a_validation_error() {
        let err = validator()
            .pollution(r#"{"city":"Mumbai","pollutant":"CO","startDate":"01-01-2020","endDate":"2020-01-31"}"#)
            .unwrap_err();
        assert!(matches!(err, PlotError::Validation(_)));
    }

    #[test]
    fn unknown_pollutant_and_city_are_rejected() {
        let err = validator()
            .pollution(r#"{"city":"Mumbai","pollutant":"O3","startDate":"2020-01-01","endDate":"2020-01-31"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("pollutant"));

        let err = validator()
            .pollution(r#"{"city":"Atlantis","pollutant":"CO","startDate":"2020-01-01","endDate":"2020-01-31"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("city"));
    }

    #[test]
    fn city_match_is_case_insensitive_and_canonical() {
        let req = validator()
            .pollution(r#"{"city":"mumbai","pollutant":"so2","startDate":"2020-01-01","endDate":"2020-01-31"}"#)
            .unwrap();
        assert_eq!(req.city, "Mumbai");
        assert_eq!(req.pollutant, Pollutant::So2);
    }

    #[test]
    fn duration_tokens_are_kept_for_the_resolver() {
        let req = validator()
            .pollution(r#"{"city":"Delhi","pollutant":"HCHO","duration":"Season","year":"2021","timeframe":"june-august"}"#)
            .unwrap();
        assert_eq!(
            req.duration,
            DurationSelection::Season {
                year_field: "year",
                year: Some("2021".to_string()),
                season: Some("june-august".to_string()),
            }
        );
    }

    #[test]
    fn week_without_token_passes_validation() {
        let req = validator()
            .pollution(r#"{"city":"Delhi","pollutant":"CO","duration":"Week"}"#)
            .unwrap();
        assert_eq!(req.duration, DurationSelection::Week { token: None });
    }

    #[test]
    fn time_series_fields_are_prefixed() {
        let req = validator()
            .time_series(r#"{"timeSeriesCity":"Delhi","timeSeriesPollutant":"CO","timeSeriesStartDate":"2021-03-01","timeSeriesEndDate":"2021-05-31"}"#)
            .unwrap();
        assert_eq!(req.kind, PlotKind::TimeSeries);
        assert_eq!(req.duration.mode(), DurationMode::Date);
    }

    #[test]
    fn plot_type_accepts_time_series_spellings() {
        for token in ["TimeSeries", "Time_Series", "time-series", "Time Series"] {
            assert_eq!(token.parse::<PlotKind>().unwrap(), PlotKind::TimeSeries);
        }
        assert!("Histogram".parse::<PlotKind>().is_err());
    }

    #[test]
    fn ntl_body_accepts_numeric_year() {
        let req = validator()
            .ntl(r#"{"ntlCity":"Delhi","ntlYear":2022,"halfYear":"jul-dec"}"#)
            .unwrap();
        assert_eq!(req.year, 2022);
        assert_eq!(req.half_year, HalfYear::JulDec);
    }

    #[test]
    fn ntl_body_requires_all_fields() {
        let err = validator()
            .ntl(r#"{"ntlCity":"Delhi","ntlYear":"2022"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("halfYear"));
    }

    #[test]
    fn parse_year_rejects_short_and_alpha() {
        assert!(parse_year("year", "22").is_err());
        assert!(parse_year("year", "20x2").is_err());
        assert_eq!(parse_year("year", "2024").unwrap(), 2024);
    }

    #[test]
    fn empty_city_list_accepts_anything() {
        let v = Validator::new(Vec::new(), validator().window());
        let req = v
            .pollution(r#"{"city":"Nowhere","pollutant":"CO","startDate":"2020-01-01","endDate":"2020-01-02"}"#)
            .unwrap();
        assert_eq!(req.city, "Nowhere");
    }
}

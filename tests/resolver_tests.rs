//! Validation and duration resolution through the public API, driven by raw
//! form bodies the way the HTTP layer sees them.

use chrono::NaiveDate;

use airplot::config::AirplotConfig;
use airplot::request::{DateRange, DurationSelection, PlotKind, Pollutant, Validator};
use airplot::resolve::{self, Calendar};

fn validator() -> Validator {
    Validator::from_config(&AirplotConfig::default())
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn resolve_body(body: &str, calendar: Calendar) -> DateRange {
    let req = validator().pollution(body).unwrap();
    resolve::resolve(&req.duration, calendar).unwrap()
}

// ---------------------------------------------------------------------------
// 1. Duration modes
// ---------------------------------------------------------------------------

#[test]
fn explicit_dates_pass_through() {
    let range = resolve_body(
        r#"{"city":"Mumbai","pollutant":"NO2","startDate":"2020-01-01","endDate":"2020-01-31"}"#,
        Calendar::Legacy,
    );
    assert_eq!(range, DateRange::new(date(2020, 1, 1), date(2020, 1, 31)));
}

#[test]
fn year_covers_whole_year() {
    let range = resolve_body(
        r#"{"city":"Delhi","pollutant":"CO","duration":"Year","year":"2021"}"#,
        Calendar::Legacy,
    );
    assert_eq!(range, DateRange::new(date(2021, 1, 1), date(2021, 12, 31)));
}

#[test]
fn february_depends_on_calendar() {
    let body = r#"{"city":"Delhi","pollutant":"CO","duration":"Month","year":"2024","timeframe":"02"}"#;
    assert_eq!(resolve_body(body, Calendar::Legacy).end, date(2024, 2, 28));
    assert_eq!(resolve_body(body, Calendar::Gregorian).end, date(2024, 2, 29));
}

#[test]
fn winter_season_depends_on_calendar() {
    let body = r#"{"city":"Agra","pollutant":"SO2","duration":"Season","year":"2022","timeframe":"december-february"}"#;

    let legacy = resolve_body(body, Calendar::Legacy);
    assert_eq!(legacy, DateRange::new(date(2022, 12, 1), date(2022, 2, 28)));
    assert!(!legacy.is_ordered());

    let gregorian = resolve_body(body, Calendar::Gregorian);
    assert_eq!(gregorian, DateRange::new(date(2022, 12, 1), date(2023, 2, 28)));
}

#[test]
fn week_token_round_trips_through_form() {
    let weeks = resolve::week_options(resolve::week_epoch(), date(2018, 6, 1));
    let third = weeks[2];
    let body = format!(
        r#"{{"city":"Pune","pollutant":"HCHO","duration":"Week","timeframe":"{}"}}"#,
        resolve::week_token(&third)
    );
    assert_eq!(resolve_body(&body, Calendar::Legacy), third);
    assert_eq!(third, DateRange::new(date(2018, 5, 15), date(2018, 5, 21)));
}

#[test]
fn unresolved_timeframes_are_reported() {
    for body in [
        r#"{"city":"Pune","pollutant":"NO2","duration":"Week"}"#,
        r#"{"city":"Pune","pollutant":"NO2","duration":"Month","year":"2020"}"#,
        r#"{"city":"Pune","pollutant":"NO2","duration":"Season","year":"2020"}"#,
    ] {
        let req = validator().pollution(body).unwrap();
        let err = resolve::resolve(&req.duration, Calendar::Legacy).unwrap_err();
        assert_eq!(err.kind(), "unresolved-timeframe", "{body}");
        assert_eq!(err.status_code(), 400);
    }
}

#[test]
fn missing_year_names_the_form_field() {
    let v = validator();
    let req = v
        .time_series(
            r#"{"timeSeriesCity":"Delhi","timeSeriesPollutant":"CO","timeSeriesDuration":"Month","timeSeriesTimeframe":"04"}"#,
        )
        .unwrap();
    let err = resolve::resolve(&req.duration, Calendar::Legacy).unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(err.to_string().contains("`timeSeriesYear`"), "{err}");

    let req = v
        .pollution(r#"{"city":"Delhi","pollutant":"CO","duration":"Season","timeframe":"june-august"}"#)
        .unwrap();
    let err = resolve::resolve(&req.duration, Calendar::Legacy).unwrap_err();
    assert!(err.to_string().contains("`year`"), "{err}");
}

#[test]
fn bad_time_series_year_names_the_form_field() {
    let req = validator()
        .time_series(
            r#"{"timeSeriesCity":"Delhi","timeSeriesPollutant":"CO","timeSeriesDuration":"Year","timeSeriesYear":"20x1"}"#,
        )
        .unwrap();
    let err = resolve::resolve(&req.duration, Calendar::Legacy).unwrap_err();
    assert!(err.to_string().contains("timeSeriesYear"), "{err}");
}

// ---------------------------------------------------------------------------
// 2. Validation
// ---------------------------------------------------------------------------

#[test]
fn time_series_form_uses_prefixed_fields() {
    let req = validator()
        .time_series(
            r#"{"timeSeriesCity":"chennai","timeSeriesPollutant":"no2","timeSeriesDuration":"Year","timeSeriesYear":2019}"#,
        )
        .unwrap();
    assert_eq!(req.city, "Chennai");
    assert_eq!(req.pollutant, Pollutant::No2);
    assert_eq!(req.kind, PlotKind::TimeSeries);
    assert!(matches!(req.duration, DurationSelection::Year { .. }));
}

#[test]
fn unknown_city_and_pollutant_are_rejected() {
    let v = validator();
    let err = v
        .pollution(r#"{"city":"Atlantis","pollutant":"NO2","startDate":"2020-01-01","endDate":"2020-01-02"}"#)
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    let err = v
        .pollution(r#"{"city":"Mumbai","pollutant":"O3","startDate":"2020-01-01","endDate":"2020-01-02"}"#)
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[test]
fn inverted_explicit_range_is_out_of_range() {
    let err = validator()
        .pollution(r#"{"city":"Mumbai","pollutant":"NO2","startDate":"2020-02-01","endDate":"2020-01-01"}"#)
        .unwrap_err();
    assert_eq!(err.kind(), "out-of-range");
}

#[test]
fn ntl_half_year_windows() {
    let req = validator()
        .ntl(r#"{"ntlCity":"Patna","ntlYear":"2023","halfYear":"jul-dec"}"#)
        .unwrap();
    let range = resolve::half_year_range(req.year, req.half_year).unwrap();
    assert_eq!(range, DateRange::new(date(2023, 7, 1), date(2023, 12, 30)));
}

#[test]
fn body_must_be_json_object() {
    for body in ["", "[]", "not json", "\"city\""] {
        let err = validator().pollution(body).unwrap_err();
        assert_eq!(err.kind(), "validation", "{body:?}");
    }
}

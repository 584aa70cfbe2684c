//! Handlers for the plot endpoints and the JSON API.
//!
//! Each handler returns a `Response<Cursor<Vec<u8>>>`; plot failures are
//! turned into `{"error", "kind"}` bodies here rather than bubbling up.

use std::io::Cursor;

use anyhow::{Context, Result};
use serde::Serialize;
use tiny_http::{Response, StatusCode};

use crate::pipeline::{Endpoint, PlotService};
use crate::request::DateRange;
use crate::resolve;
use crate::utils::process;

use super::{AppState, content_type, content_type_json, plot_error_response};

// ---------------------------------------------------------------------------
// JSON response types
// ---------------------------------------------------------------------------

/// Week options for the week selector.
#[derive(Serialize)]
struct WeeksResponse {
    epoch: String,
    count: usize,
    weeks: Vec<WeekOption>,
}

#[derive(Serialize)]
struct WeekOption {
    /// `START_END`, sent back as the timeframe.
    token: String,
    start: String,
    end: String,
    label: String,
}

impl From<&DateRange> for WeekOption {
    fn from(range: &DateRange) -> Self {
        Self {
            token: resolve::week_token(range),
            start: range.start.to_string(),
            end: range.end.to_string(),
            label: range.to_string(),
        }
    }
}

/// Health API response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    platform: String,
    interpreter: Option<String>,
    interpreter_available: bool,
    timeout_secs: u64,
    workers: usize,
    artifact_policy: String,
    calendar: String,
    window: WindowResponse,
    cities: Vec<String>,
    scripts: Vec<ScriptHealth>,
    missing_scripts: usize,
}

#[derive(Serialize)]
struct WindowResponse {
    min: String,
    max: String,
}

#[derive(Serialize)]
struct ScriptHealth {
    name: String,
    path: String,
    present: bool,
    overridden: bool,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a JSON success response.
fn json_response<T: Serialize>(data: &T) -> Result<Response<Cursor<Vec<u8>>>> {
    let body = serde_json::to_string(data).context("failed to serialize JSON response")?;
    Ok(Response::from_data(body.into_bytes())
        .with_header(content_type_json())
        .with_status_code(StatusCode(200)))
}

/// Parse a numeric query parameter such as `?limit=N`.
fn parse_query_param(url: &str, key: &str) -> Option<usize> {
    url.split('?').nth(1)?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k == key { v.parse().ok() } else { None }
    })
}

// ---------------------------------------------------------------------------
// Plot handlers
// ---------------------------------------------------------------------------

/// `POST /pollution-data`, `/time-series-data`, `/ntl-data`.
pub fn post_plot(service: &PlotService, endpoint: Endpoint, body: &str) -> Response<Cursor<Vec<u8>>> {
    match service.handle(endpoint, body) {
        Ok(payload) => {
            let content = content_type(payload.content_type());
            Response::from_data(payload.into_bytes())
                .with_header(content)
                .with_status_code(StatusCode(200))
        }
        Err(err) => plot_error_response(&err),
    }
}

// ---------------------------------------------------------------------------
// API handlers
// ---------------------------------------------------------------------------

/// `GET /api/weeks?limit=N`. With a limit, only the most recent N weeks.
pub fn get_weeks(url: &str) -> Result<Response<Cursor<Vec<u8>>>> {
    let epoch = resolve::week_epoch();
    let today = chrono::Local::now().date_naive();
    let mut weeks = resolve::week_options(epoch, today);
    if let Some(limit) = parse_query_param(url, "limit") {
        let skip = weeks.len().saturating_sub(limit);
        weeks.drain(..skip);
    }

    let resp = WeeksResponse {
        epoch: epoch.to_string(),
        count: weeks.len(),
        weeks: weeks.iter().map(WeekOption::from).collect(),
    };
    json_response(&resp)
}

/// `GET /api/health`: registry and configuration summary.
pub fn get_health(state: &AppState) -> Result<Response<Cursor<Vec<u8>>>> {
    let dispatcher = state.service.dispatcher();
    let validator = state.service.validator();
    let window = validator.window();

    let scripts: Vec<ScriptHealth> = dispatcher
        .registry()
        .iter()
        .map(|d| ScriptHealth {
            name: d.key.name(),
            path: d.path.display().to_string(),
            present: d.exists(),
            overridden: d.overridden,
        })
        .collect();
    let missing_scripts = scripts.iter().filter(|s| !s.present).count();

    let resp = HealthResponse {
        status: if missing_scripts == 0 { "ok" } else { "degraded" },
        platform: process::platform_name().to_string(),
        interpreter: dispatcher.interpreter().map(str::to_string),
        interpreter_available: dispatcher
            .interpreter()
            .is_none_or(process::is_command_available),
        timeout_secs: dispatcher.timeout().as_secs(),
        workers: state.config.server.workers,
        artifact_policy: state.service.artifacts().policy().to_string(),
        calendar: state.service.calendar().to_string(),
        window: WindowResponse {
            min: window.min.to_string(),
            max: window.max.to_string(),
        },
        cities: validator.cities().to_vec(),
        scripts,
        missing_scripts,
    };

    json_response(&resp)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

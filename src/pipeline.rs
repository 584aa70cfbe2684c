//! Request pipeline: validate, resolve, dispatch, materialize.
//!
//! [`PlotService`] is shared by every HTTP worker. It holds no per-request
//! state; each call owns its invocation and artifact slot.

use std::fmt;
use std::time::Instant;

use anyhow::Result;

use crate::analytics::logger::{InvocationLog, InvocationLogEntry};
use crate::config::AirplotConfig;
use crate::dispatch::{Dispatcher, ScriptKey, ScriptRegistry};
use crate::error::PlotError;
use crate::materialize::{ArtifactKind, ArtifactStore, Payload};
use crate::request::{DateRange, PlotRequest, Validator};
use crate::resolve::{self, Calendar};

/// The three plot endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Pollution,
    TimeSeries,
    Ntl,
}

impl Endpoint {
    pub const ALL: [Endpoint; 3] = [Self::Pollution, Self::TimeSeries, Self::Ntl];

    pub fn path(self) -> &'static str {
        match self {
            Self::Pollution => "/pollution-data",
            Self::TimeSeries => "/time-series-data",
            Self::Ntl => "/ntl-data",
        }
    }

    pub fn from_path(path: &str) -> Option<Endpoint> {
        Self::ALL.into_iter().find(|e| e.path() == path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

pub struct PlotService {
    validator: Validator,
    calendar: Calendar,
    dispatcher: Dispatcher,
    artifacts: ArtifactStore,
    log: InvocationLog,
}

impl PlotService {
    pub fn new(
        validator: Validator,
        calendar: Calendar,
        dispatcher: Dispatcher,
        artifacts: ArtifactStore,
        log: InvocationLog,
    ) -> Self {
        Self {
            validator,
            calendar,
            dispatcher,
            artifacts,
            log,
        }
    }

    /// Build the service, discovering scripts on disk. Fails only on a bad
    /// script name in the config or, in strict mode, a missing script.
    pub fn from_config(config: &AirplotConfig) -> Result<Self> {
        let registry = ScriptRegistry::discover(&config.scripts)?;
        Ok(Self::new(
            Validator::from_config(config),
            config.resolver.calendar,
            Dispatcher::new(registry, &config.scripts),
            ArtifactStore::from_config(config)?,
            InvocationLog::from_config(config),
        ))
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn pollution(&self, body: &str) -> Result<Payload, PlotError> {
        self.handle(Endpoint::Pollution, body)
    }

    pub fn time_series(&self, body: &str) -> Result<Payload, PlotError> {
        self.handle(Endpoint::TimeSeries, body)
    }

    pub fn ntl(&self, body: &str) -> Result<Payload, PlotError> {
        self.handle(Endpoint::Ntl, body)
    }

    /// Run one request end to end and record it in the invocation log.
    pub fn handle(&self, endpoint: Endpoint, body: &str) -> Result<Payload, PlotError> {
        let started = Instant::now();
        let mut entry = InvocationLogEntry::new(endpoint.path());

        let result = match endpoint {
            Endpoint::Pollution => self
                .validator
                .pollution(body)
                .and_then(|req| self.plot(req, ArtifactKind::PngBinary, &mut entry)),
            Endpoint::TimeSeries => self
                .validator
                .time_series(body)
                .and_then(|req| self.plot(req, ArtifactKind::HtmlText, &mut entry)),
            Endpoint::Ntl => self.validator.ntl(body).and_then(|req| {
                entry.city = Some(req.city.clone());
                let window = resolve::half_year_range(req.year, req.half_year)?;
                note_range(&mut entry, &window);
                let args = vec![
                    req.city,
                    req.year.to_string(),
                    req.half_year.as_str().to_string(),
                ];
                self.run(ScriptKey::Ntl, args, ArtifactKind::PngBase64Json, &mut entry)
            }),
        };

        entry.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(payload) => entry.artifact_bytes = Some(payload.len()),
            Err(err) => {
                entry.outcome = err.kind().to_string();
                entry.status = err.status_code();
                entry.error = Some(err.to_string());
            }
        }
        self.log.record(&entry);

        result
    }

    fn plot(
        &self,
        req: PlotRequest,
        artifact: ArtifactKind,
        entry: &mut InvocationLogEntry,
    ) -> Result<Payload, PlotError> {
        entry.city = Some(req.city.clone());
        let key = ScriptKey::Plot(req.pollutant, req.kind);
        entry.script = Some(key.name());

        let range = resolve::resolve(&req.duration, self.calendar)?;
        note_range(entry, &range);

        let args = vec![req.city, range.start.to_string(), range.end.to_string()];
        self.run(key, args, artifact, entry)
    }

    /// Dispatch one script and read back its artifact.
    fn run(
        &self,
        key: ScriptKey,
        args: Vec<String>,
        artifact: ArtifactKind,
        entry: &mut InvocationLogEntry,
    ) -> Result<Payload, PlotError> {
        entry.script = Some(key.name());
        let mut invocation = self.dispatcher.prepare(key, args)?;
        let slot = self.artifacts.reserve(key, artifact)?;
        if let Some(output) = slot.script_arg() {
            invocation.args.push(output);
        }
        self.dispatcher.invoke(&invocation)?;
        slot.materialize(key)
    }
}

fn note_range(entry: &mut InvocationLogEntry, range: &DateRange) {
    entry.start = Some(range.start.to_string());
    entry.end = Some(range.end.to_string());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

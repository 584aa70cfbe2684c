//! Error taxonomy for the request path.
//!
//! Every failure a plot request can hit maps to exactly one [`PlotError`]
//! variant, and every variant maps to one HTTP status. Startup, config and
//! CLI code use `anyhow` instead.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use crate::request::DurationMode;

#[derive(Debug, Error)]
pub enum PlotError {
    /// A required field is missing, empty, or malformed.
    #[error("{0}")]
    Validation(String),

    /// An explicit date range falls outside the supported data window or is
    /// inverted.
    #[error("data is not available for {start} to {end}: {reason}")]
    OutOfRange {
        start: NaiveDate,
        end: NaiveDate,
        reason: String,
    },

    /// The duration mode needs a timeframe token that was not supplied.
    #[error("no timeframe selected for {0} duration")]
    UnresolvedTimeframe(DurationMode),

    #[error("script {key} not found at {}", path.display())]
    ScriptNotFound { key: String, path: PathBuf },

    /// The script exited 0 but left no artifact behind.
    #[error("script {key} reported success but produced no plot at {}", path.display())]
    ArtifactNotFound { key: String, path: PathBuf },

    #[error("script {key} failed ({status}): {stderr}")]
    ExternalProcess {
        key: String,
        status: String,
        stderr: String,
    },

    #[error("script {key} did not finish within {}s and was terminated", after.as_secs())]
    ExternalProcessTimeout { key: String, after: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlotError {
    /// Shorthand for a missing-field validation failure.
    pub fn missing(field: &str) -> Self {
        Self::Validation(format!("missing required field `{field}`"))
    }

    /// Shorthand for a malformed-field validation failure.
    pub fn invalid(field: &str, value: &str, expected: &str) -> Self {
        Self::Validation(format!(
            "invalid value {value:?} for `{field}` (expected {expected})"
        ))
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::OutOfRange { .. } | Self::UnresolvedTimeframe(_) => 400,
            Self::ScriptNotFound { .. } | Self::ArtifactNotFound { .. } => 404,
            Self::ExternalProcess { .. } | Self::Io(_) => 500,
            Self::ExternalProcessTimeout { .. } => 504,
        }
    }

    /// Stable machine-readable name, used in JSON error bodies and the
    /// invocation log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::OutOfRange { .. } => "out-of-range",
            Self::UnresolvedTimeframe(_) => "unresolved-timeframe",
            Self::ScriptNotFound { .. } => "script-not-found",
            Self::ArtifactNotFound { .. } => "artifact-not-found",
            Self::ExternalProcess { .. } => "external-process",
            Self::ExternalProcessTimeout { .. } => "external-process-timeout",
            Self::Io(_) => "io",
        }
    }
}

/// Configuration schema and defaults for airplot.
///
/// Defines the TOML-serializable configuration structure with all sections:
/// `[server]`, `[scripts]`, `[artifacts]`, `[resolver]`, `[cities]`, and
/// `[logging]`.
///
/// Every field has a built-in default. Users only need to set the values
/// they want to override.
use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::request::DateWindow;
use crate::resolve::Calendar;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level airplot configuration.
///
/// Maps directly to `~/.airplot/config.toml` and `.airplot.toml`. All
/// sections and fields are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AirplotConfig {
    pub server: ServerConfig,
    pub scripts: ScriptsConfig,
    pub artifacts: ArtifactsConfig,
    pub resolver: ResolverConfig,
    pub cities: CitiesConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// [server]
// ---------------------------------------------------------------------------

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    pub addr: String,
    /// Number of worker threads pulling requests off the listener. Each
    /// in-flight request holds one worker for the lifetime of its script.
    pub workers: usize,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:3001".to_string(),
            workers: 4,
            max_body_bytes: 64 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// [scripts]
// ---------------------------------------------------------------------------

/// Analysis script registry and invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Directory holding `{POLLUTANT}_Map`, `{POLLUTANT}_Time_Series` and
    /// `NTL` scripts.
    pub dir: String,
    /// Program used to run each script. Empty runs the script directly.
    pub interpreter: String,
    /// Script file extension, matched case-insensitively.
    pub extension: String,
    /// Kill a script that runs longer than this.
    pub timeout_secs: u64,
    /// Refuse to start when a registered script is missing.
    pub strict: bool,
    /// Working directory for script processes.
    pub working_dir: String,
    /// Explicit script paths keyed by script name (`NO2_Map = "..."`).
    pub overrides: BTreeMap<String, String>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            dir: "python".to_string(),
            interpreter: "python".to_string(),
            extension: "py".to_string(),
            timeout_secs: 300,
            strict: false,
            working_dir: ".".to_string(),
            overrides: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// [artifacts]
// ---------------------------------------------------------------------------

/// Where scripts write their output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactPolicy {
    /// Fresh directory per request; the output path is passed to the script
    /// as its last argument.
    #[default]
    Unique,
    /// Scripts write to fixed paths; requests sharing a path are serialized.
    Legacy,
}

impl std::fmt::Display for ArtifactPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unique => write!(f, "unique"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

/// Where each unmodified script writes its plot, relative to
/// `scripts.working_dir`. Several scripts share `plots/latest_plot.png`.
const DEFAULT_LEGACY_PATHS: [(&str, &str); 9] = [
    ("CO_Map", "plots/latest_Map.png"),
    ("HCHO_Map", "plots/latest_plot.png"),
    ("NO2_Map", "plots/latest_Map.png"),
    ("SO2_Map", "plots/latest_plot.png"),
    ("CO_Time_Series", "plots/latest_Timeseries.html"),
    ("HCHO_Time_Series", "plots/latest_plot.png"),
    ("NO2_Time_Series", "plots/latest_Timeseries.html"),
    ("SO2_Time_Series", "plots/latest_Timeseries.html"),
    ("NTL", "plots/NTL.png"),
];

fn default_legacy_paths() -> BTreeMap<String, String> {
    DEFAULT_LEGACY_PATHS
        .iter()
        .map(|(name, path)| (name.to_string(), path.to_string()))
        .collect()
}

/// Artifact location settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Parent directory for per-request output directories.
    pub dir: String,
    pub policy: ArtifactPolicy,
    /// Fixed output path per script name, used by the `legacy` policy.
    pub legacy: BTreeMap<String, String>,
}

impl ArtifactsConfig {
    /// Fixed output path for `script`. Names missing from `legacy` fall back
    /// to the built-in table.
    pub fn legacy_path(&self, script: &str) -> Option<&str> {
        self.legacy.get(script).map(String::as_str).or_else(|| {
            DEFAULT_LEGACY_PATHS
                .iter()
                .find(|(name, _)| *name == script)
                .map(|(_, path)| *path)
        })
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: "plots".to_string(),
            policy: ArtifactPolicy::default(),
            legacy: default_legacy_paths(),
        }
    }
}

// ---------------------------------------------------------------------------
// [resolver]
// ---------------------------------------------------------------------------

/// Date resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// `legacy` keeps the fixed February 28th and the same-year winter
    /// season; `gregorian` uses real month lengths.
    pub calendar: Calendar,
    /// First day with data, inclusive.
    pub min_date: NaiveDate,
    /// Last day with data, inclusive.
    pub max_date: NaiveDate,
}

impl ResolverConfig {
    pub fn window(&self) -> DateWindow {
        DateWindow {
            min: self.min_date,
            max: self.max_date,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            calendar: Calendar::default(),
            min_date: NaiveDate::from_ymd_opt(2018, 4, 30).expect("valid default min date"),
            max_date: NaiveDate::from_ymd_opt(2025, 6, 5).expect("valid default max date"),
        }
    }
}

// ---------------------------------------------------------------------------
// [cities]
// ---------------------------------------------------------------------------

/// Cities the scripts have coordinates for. Empty accepts any city.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CitiesConfig {
    pub supported: Vec<String>,
}

impl Default for CitiesConfig {
    fn default() -> Self {
        Self {
            supported: default_cities(),
        }
    }
}

fn default_cities() -> Vec<String> {
    [
        "Mumbai",
        "Delhi",
        "Chennai",
        "Kolkata",
        "Bangalore",
        "Pune",
        "Ahmedabad",
        "Surat",
        "Agra",
        "Chandigarh",
        "Asansol",
        "Moradabad",
        "Muzaffarpur",
        "Patna",
        "Agartala",
        "Bhopal",
        "Rourkela",
        "Jodhpur",
        "Indore",
        "Hyderabad",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ---------------------------------------------------------------------------
// [logging]
// ---------------------------------------------------------------------------

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Whether the invocation log is written.
    pub enabled: bool,
    /// Path to the invocation log. `~` is expanded to the home directory.
    pub path: String,
    /// Print one line per HTTP request to stdout.
    pub access_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "~/.airplot/invocations.jsonl".to_string(),
            access_log: true,
        }
    }
}

impl LoggingConfig {
    /// Resolved log path, or `None` when logging is off or `~` cannot be
    /// expanded.
    pub fn log_path(&self) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        super::expand_tilde(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Default TOML content
// ---------------------------------------------------------------------------

impl AirplotConfig {
    /// Generate the annotated default TOML config file content.
    ///
    /// Used by `airplot config init`.
    pub fn default_toml() -> String {
        r#"# airplot configuration
#
# Configuration hierarchy (highest precedence wins):
#   1. Environment variables (AIRPLOT_*)
#   2. Project config (.airplot.toml in current directory)
#   3. User global config (~/.airplot/config.toml)
#   4. Built-in defaults

[server]
addr = "127.0.0.1:3001"
workers = 4                           # Concurrent requests (one script each)
max_body_bytes = 65536

[scripts]
dir = "python"
interpreter = "python"                # Empty string runs scripts directly
extension = "py"                      # Matched case-insensitively
timeout_secs = 300
strict = false                        # true: refuse to start if a script is missing
working_dir = "."

[scripts.overrides]
# NO2_Map = "/opt/analysis/no2_map.py"

[artifacts]
dir = "plots"
policy = "unique"                     # unique | legacy

[artifacts.legacy]                    # Fixed output path per script (legacy policy)
CO_Map = "plots/latest_Map.png"
HCHO_Map = "plots/latest_plot.png"
NO2_Map = "plots/latest_Map.png"
SO2_Map = "plots/latest_plot.png"
CO_Time_Series = "plots/latest_Timeseries.html"
HCHO_Time_Series = "plots/latest_plot.png"
NO2_Time_Series = "plots/latest_Timeseries.html"
SO2_Time_Series = "plots/latest_Timeseries.html"
NTL = "plots/NTL.png"

[resolver]
calendar = "legacy"                   # legacy | gregorian
min_date = "2018-04-30"
max_date = "2025-06-05"

[cities]
supported = ["Mumbai", "Delhi", "Chennai", "Kolkata", "Bangalore", "Pune", "Ahmedabad", "Surat", "Agra", "Chandigarh", "Asansol", "Moradabad", "Muzaffarpur", "Patna", "Agartala", "Bhopal", "Rourkela", "Jodhpur", "Indore", "Hyderabad"]

[logging]
enabled = true
path = "~/.airplot/invocations.jsonl"
access_log = true
"#
        .to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = AirplotConfig::default();
        assert_eq!(config.server.addr, "127.0.0.1:3001");
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.scripts.interpreter, "python");
        assert_eq!(config.scripts.timeout_secs, 300);
        assert_eq!(config.artifacts.policy, ArtifactPolicy::Unique);
        assert_eq!(config.resolver.calendar, Calendar::Legacy);
        assert_eq!(config.resolver.min_date.to_string(), "2018-04-30");
        assert_eq!(config.resolver.max_date.to_string(), "2025-06-05");
        assert_eq!(config.cities.supported.len(), 20);
        assert!(config.logging.enabled);
    }

    #[test]
    fn deserialize_minimal_toml() {
        let toml_str = r#"
[scripts]
timeout_secs = 30
"#;
        let config: AirplotConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scripts.timeout_secs, 30);
        assert_eq!(config.scripts.dir, "python");
        assert_eq!(config.server.workers, 4);
    }

    #[test]
    fn deserialize_full_toml() {
        let toml_str = r#"
[server]
addr = "0.0.0.0:8080"
workers = 8

[scripts]
dir = "/srv/scripts"
interpreter = ""
extension = "sh"
timeout_secs = 10
strict = true

[scripts.overrides]
NO2_Map = "/srv/custom/no2.sh"

[artifacts]
dir = "/tmp/plots"
policy = "legacy"

[resolver]
calendar = "gregorian"
min_date = "2019-01-01"
max_date = "2024-12-31"

[cities]
supported = ["Pune"]

[logging]
enabled = false
access_log = false
"#;
        let config: AirplotConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.addr, "0.0.0.0:8080");
        assert_eq!(config.server.workers, 8);
        assert!(config.scripts.interpreter.is_empty());
        assert!(config.scripts.strict);
        assert_eq!(
            config.scripts.overrides.get("NO2_Map").map(String::as_str),
            Some("/srv/custom/no2.sh")
        );
        assert_eq!(config.artifacts.policy, ArtifactPolicy::Legacy);
        assert_eq!(config.artifacts.legacy_path("NTL"), Some("plots/NTL.png"));
        assert_eq!(config.resolver.calendar, Calendar::Gregorian);
        assert_eq!(config.resolver.window().min.to_string(), "2019-01-01");
        assert_eq!(config.cities.supported, vec!["Pune"]);
        assert!(config.logging.log_path().is_none());
    }

    #[test]
    fn empty_toml_produces_defaults() {
        let config: AirplotConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:3001");
        assert_eq!(config.artifacts.policy, ArtifactPolicy::Unique);
    }

    #[test]
    fn default_toml_parses_back() {
        let config: AirplotConfig = toml::from_str(&AirplotConfig::default_toml()).unwrap();
        let defaults = AirplotConfig::default();
        assert_eq!(config.server.addr, defaults.server.addr);
        assert_eq!(config.cities.supported, defaults.cities.supported);
        assert_eq!(config.resolver.min_date, defaults.resolver.min_date);
        assert_eq!(config.artifacts.legacy, defaults.artifacts.legacy);
    }

    #[test]
    fn legacy_paths_follow_each_script() {
        let artifacts = ArtifactsConfig::default();
        assert_eq!(artifacts.legacy_path("CO_Map"), Some("plots/latest_Map.png"));
        assert_eq!(artifacts.legacy_path("SO2_Map"), Some("plots/latest_plot.png"));
        assert_eq!(artifacts.legacy_path("HCHO_Map"), Some("plots/latest_plot.png"));
        assert_eq!(artifacts.legacy_path("HCHO_Time_Series"), Some("plots/latest_plot.png"));
        assert_eq!(artifacts.legacy_path("O3_Map"), None);
    }

    #[test]
    fn partial_legacy_table_falls_back_per_script() {
        let config: AirplotConfig = toml::from_str(
            r#"
[artifacts.legacy]
SO2_Map = "out/so2.png"
"#,
        )
        .unwrap();
        assert_eq!(config.artifacts.legacy_path("SO2_Map"), Some("out/so2.png"));
        assert_eq!(config.artifacts.legacy_path("NTL"), Some("plots/NTL.png"));
    }

    #[test]
    fn policy_display() {
        assert_eq!(ArtifactPolicy::Unique.to_string(), "unique");
        assert_eq!(ArtifactPolicy::Legacy.to_string(), "legacy");
    }
}

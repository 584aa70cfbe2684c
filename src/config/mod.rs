/// Configuration system for airplot.
///
/// Provides a layered configuration hierarchy:
///
/// 1. **Built-in defaults**: hardcoded in [`schema::AirplotConfig::default()`]
/// 2. **User global config**: `~/.airplot/config.toml`
/// 3. **Project local config**: `.airplot.toml` in the current working directory
/// 4. **Environment variables**: `AIRPLOT_*` overrides (highest precedence)
///
/// Layers are merged key by key: a file that only sets `scripts.timeout_secs`
/// leaves every other value from the layers below untouched. A malformed
/// file is a startup error.
///
/// # Usage
///
/// ```rust,ignore
/// use airplot::config;
///
/// let cfg = config::load()?;
/// println!("listening on {}", cfg.server.addr);
/// ```
pub mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub use schema::{AirplotConfig, ArtifactPolicy};

use crate::resolve::Calendar;

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the fully resolved configuration from the standard locations.
pub fn load() -> Result<AirplotConfig> {
    load_layers(&[global_config_path(), project_config_path()])
}

/// Load defaults, then a single explicit file, then environment overrides.
pub fn load_from(path: &Path) -> Result<AirplotConfig> {
    if !path.exists() {
        anyhow::bail!("config file not found: {}", path.display());
    }
    load_layers(&[Some(path.to_path_buf())])
}

fn load_layers(paths: &[Option<PathBuf>]) -> Result<AirplotConfig> {
    let defaults = toml::Value::try_from(AirplotConfig::default())
        .context("failed to serialize default config")?;
    let mut merged = defaults;

    for path in paths.iter().flatten() {
        if let Some(layer) = load_toml_file(path)? {
            merge_values(&mut merged, layer);
        }
    }

    let mut config: AirplotConfig = merged
        .try_into()
        .context("merged configuration does not match the config schema")?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Read a TOML file as a raw value tree. A missing file is not an error.
fn load_toml_file(path: &Path) -> Result<Option<toml::Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let value = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(Some(value))
}

/// Merge `overlay` into `base`, recursing into tables. Non-table values in
/// the overlay replace the base value.
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

// ---------------------------------------------------------------------------
// File paths
// ---------------------------------------------------------------------------

/// Path to the user global config: `~/.airplot/config.toml`.
fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".airplot").join("config.toml"))
}

/// Path to the project local config: `.airplot.toml` in the current directory.
fn project_config_path() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .map(|cwd| cwd.join(".airplot.toml"))
}

/// Return the path to the global config file for display/init purposes.
pub fn global_config_file() -> Option<PathBuf> {
    global_config_path()
}

/// Return the path to the project config file for display purposes.
pub fn project_config_file() -> Option<PathBuf> {
    project_config_path()
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    if path == "~" {
        return dirs::home_dir();
    }
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides (highest precedence layer).
///
/// Supported variables:
/// - `AIRPLOT_ADDR`: listen address
/// - `AIRPLOT_WORKERS`: worker thread count
/// - `AIRPLOT_SCRIPTS_DIR`: script directory
/// - `AIRPLOT_INTERPRETER`: script interpreter (may be empty)
/// - `AIRPLOT_TIMEOUT_SECS`: script timeout
/// - `AIRPLOT_ARTIFACT_DIR`: per-request output parent directory
/// - `AIRPLOT_ARTIFACT_POLICY`: `unique` or `legacy`
/// - `AIRPLOT_CALENDAR`: `legacy` or `gregorian`
/// - `AIRPLOT_LOG`: invocation log on/off (`1`/`true`/`yes`/`on`)
/// - `AIRPLOT_LOG_PATH`: invocation log path
fn apply_env_overrides(config: &mut AirplotConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("AIRPLOT_ADDR")
        && !val.is_empty()
    {
        config.server.addr = val;
    }
    if let Some(val) = var("AIRPLOT_WORKERS")
        && let Ok(n) = val.parse::<usize>()
        && n > 0
    {
        config.server.workers = n;
    }
    if let Some(val) = var("AIRPLOT_SCRIPTS_DIR")
        && !val.is_empty()
    {
        config.scripts.dir = val;
    }
    if let Some(val) = var("AIRPLOT_INTERPRETER") {
        config.scripts.interpreter = val;
    }
    if let Some(val) = var("AIRPLOT_TIMEOUT_SECS")
        && let Ok(secs) = val.parse::<u64>()
    {
        config.scripts.timeout_secs = secs;
    }
    if let Some(val) = var("AIRPLOT_ARTIFACT_DIR")
        && !val.is_empty()
    {
        config.artifacts.dir = val;
    }
    if let Some(val) = var("AIRPLOT_ARTIFACT_POLICY")
        && let Some(policy) = parse_policy(&val)
    {
        config.artifacts.policy = policy;
    }
    if let Some(val) = var("AIRPLOT_CALENDAR")
        && let Some(calendar) = parse_calendar(&val)
    {
        config.resolver.calendar = calendar;
    }
    if let Some(val) = var("AIRPLOT_LOG") {
        config.logging.enabled = is_truthy(&val);
    }
    if let Some(val) = var("AIRPLOT_LOG_PATH")
        && !val.is_empty()
    {
        config.logging.path = val;
    }
}

/// Check if a string value represents a truthy boolean.
fn is_truthy(val: &str) -> bool {
    matches!(
        val.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_policy(val: &str) -> Option<ArtifactPolicy> {
    match val.to_ascii_lowercase().as_str() {
        "unique" => Some(ArtifactPolicy::Unique),
        "legacy" | "shared" => Some(ArtifactPolicy::Legacy),
        _ => None,
    }
}

pub fn parse_calendar(val: &str) -> Option<Calendar> {
    match val.to_ascii_lowercase().as_str() {
        "legacy" => Some(Calendar::Legacy),
        "gregorian" => Some(Calendar::Gregorian),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Config init / set / reset
// ---------------------------------------------------------------------------

/// Write the default annotated config to `~/.airplot/config.toml`.
///
/// Returns an error if the file already exists (use `force = true` to
/// overwrite).
pub fn init_config(force: bool) -> Result<PathBuf> {
    let path = global_config_path().context("could not determine home directory")?;

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create ~/.airplot/ directory")?;
    }

    fs::write(&path, AirplotConfig::default_toml()).context("failed to write config file")?;

    Ok(path)
}

/// Set a single config key in the global config file.
///
/// Supports dotted keys like `scripts.timeout_secs`. Keys must exist in the
/// schema; the updated file is checked against the schema before writing.
pub fn set_config_value(key: &str, value: &str) -> Result<PathBuf> {
    let path = global_config_path().context("could not determine home directory")?;

    let mut root = if path.exists() {
        let content = fs::read_to_string(&path).context("failed to read config file")?;
        toml::from_str(&content).context("failed to parse config as TOML value")?
    } else {
        toml::Value::try_from(AirplotConfig::default())
            .context("failed to serialize default config")?
    };

    // Keys missing from a sparse file are looked up against the defaults so
    // the value is parsed with the right type.
    let defaults = toml::Value::try_from(AirplotConfig::default())
        .context("failed to serialize default config")?;
    set_toml_value(&mut root, &defaults, key, value)?;

    let _: AirplotConfig = root
        .clone()
        .try_into()
        .with_context(|| format!("invalid value for '{key}': {value}"))?;

    let output = toml::to_string_pretty(&root).context("failed to serialize updated config")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    fs::write(&path, output).context("failed to write config file")?;

    Ok(path)
}

/// Set a value in a TOML value tree using a dotted key path.
///
/// The type of the new value follows the existing value at that key in
/// `root`, or in `schema` when `root` does not have it yet. Keys under
/// `scripts.overrides` and `artifacts.legacy` may be new.
fn set_toml_value(
    root: &mut toml::Value,
    schema: &toml::Value,
    key: &str,
    raw_value: &str,
) -> Result<()> {
    let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
    let Some((leaf, sections)) = parts.split_last() else {
        anyhow::bail!("empty config key");
    };

    let open_section = sections == ["scripts", "overrides"] || sections == ["artifacts", "legacy"];

    let mut current = root;
    let mut schema_current = Some(schema);
    for &part in sections {
        schema_current = schema_current.and_then(|s| s.get(part));
        if schema_current.is_none() && !open_section {
            anyhow::bail!("config key not found: section '{part}' in '{key}'");
        }
        let table = current
            .as_table_mut()
            .with_context(|| format!("expected table above '{part}' in '{key}'"))?;
        current = table
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    let table = current.as_table_mut().with_context(|| {
        format!(
            "expected table at '{}'",
            key.rsplit_once('.').map(|(s, _)| s).unwrap_or("")
        )
    })?;

    let existing = table
        .get(*leaf)
        .or_else(|| schema_current.and_then(|s| s.get(*leaf)));
    let new_value = match existing {
        Some(toml::Value::Boolean(_)) => toml::Value::Boolean(is_truthy(raw_value)),
        Some(toml::Value::Integer(_)) => {
            let n: i64 = raw_value
                .parse()
                .with_context(|| format!("expected integer for '{key}', got '{raw_value}'"))?;
            toml::Value::Integer(n)
        }
        Some(toml::Value::Array(_)) => {
            // Comma-separated list
            let items: Vec<toml::Value> = raw_value
                .split(',')
                .map(|s| toml::Value::String(s.trim().to_string()))
                .filter(|v| v.as_str().is_some_and(|s| !s.is_empty()))
                .collect();
            toml::Value::Array(items)
        }
        Some(_) => toml::Value::String(raw_value.to_string()),
        None if open_section => toml::Value::String(raw_value.to_string()),
        None => anyhow::bail!("config key not found: '{key}'"),
    };

    table.insert(leaf.to_string(), new_value);
    Ok(())
}

/// Reset the global config to defaults (overwrite the file).
pub fn reset_config() -> Result<PathBuf> {
    init_config(true)
}

/// Show the effective (fully resolved) config as TOML.
pub fn show_effective_config(config: &AirplotConfig) -> Result<String> {
    toml::to_string_pretty(config).context("failed to serialize effective config")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn defaults_value() -> toml::Value {
        toml::Value::try_from(AirplotConfig::default()).unwrap()
    }

    #[test]
    fn is_truthy_accepts_variants() {
        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(is_truthy("YES"));
        assert!(is_truthy("on"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("off"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn parse_policy_and_calendar() {
        assert_eq!(parse_policy("unique"), Some(ArtifactPolicy::Unique));
        assert_eq!(parse_policy("LEGACY"), Some(ArtifactPolicy::Legacy));
        assert_eq!(parse_policy("random"), None);
        assert_eq!(parse_calendar("gregorian"), Some(Calendar::Gregorian));
        assert_eq!(parse_calendar("julian"), None);
    }

    #[test]
    fn merge_keeps_unset_keys_from_lower_layers() {
        let mut base = defaults_value();
        let overlay: toml::Value = toml::from_str(
            r#"
[scripts]
timeout_secs = 12
"#,
        )
        .unwrap();
        merge_values(&mut base, overlay);
        let config: AirplotConfig = base.try_into().unwrap();
        assert_eq!(config.scripts.timeout_secs, 12);
        assert_eq!(config.scripts.interpreter, "python");
        assert_eq!(config.server.addr, "127.0.0.1:3001");
    }

    #[test]
    fn later_layers_win() {
        let mut base = defaults_value();
        merge_values(&mut base, toml::from_str("[server]\nworkers = 2").unwrap());
        merge_values(&mut base, toml::from_str("[server]\nworkers = 9").unwrap());
        let config: AirplotConfig = base.try_into().unwrap();
        assert_eq!(config.server.workers, 9);
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("AIRPLOT_ADDR", "0.0.0.0:9000"),
            ("AIRPLOT_WORKERS", "16"),
            ("AIRPLOT_INTERPRETER", ""),
            ("AIRPLOT_TIMEOUT_SECS", "45"),
            ("AIRPLOT_ARTIFACT_POLICY", "legacy"),
            ("AIRPLOT_CALENDAR", "gregorian"),
            ("AIRPLOT_LOG", "off"),
        ]
        .into_iter()
        .collect();

        let mut config = AirplotConfig::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.addr, "0.0.0.0:9000");
        assert_eq!(config.server.workers, 16);
        assert!(config.scripts.interpreter.is_empty());
        assert_eq!(config.scripts.timeout_secs, 45);
        assert_eq!(config.artifacts.policy, ArtifactPolicy::Legacy);
        assert_eq!(config.resolver.calendar, Calendar::Gregorian);
        assert!(!config.logging.enabled);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut config = AirplotConfig::default();
        apply_env_overrides(&mut config, |k| match k {
            "AIRPLOT_WORKERS" => Some("0".to_string()),
            "AIRPLOT_TIMEOUT_SECS" => Some("soon".to_string()),
            "AIRPLOT_CALENDAR" => Some("lunar".to_string()),
            _ => None,
        });
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.scripts.timeout_secs, 300);
        assert_eq!(config.resolver.calendar, Calendar::Legacy);
    }

    #[test]
    fn set_toml_value_updates_typed_values() {
        let schema = defaults_value();
        let mut root = defaults_value();
        set_toml_value(&mut root, &schema, "scripts.timeout_secs", "60").unwrap();
        set_toml_value(&mut root, &schema, "scripts.strict", "yes").unwrap();
        set_toml_value(&mut root, &schema, "resolver.calendar", "gregorian").unwrap();
        set_toml_value(&mut root, &schema, "cities.supported", "Pune, Patna").unwrap();

        let config: AirplotConfig = root.try_into().unwrap();
        assert_eq!(config.scripts.timeout_secs, 60);
        assert!(config.scripts.strict);
        assert_eq!(config.resolver.calendar, Calendar::Gregorian);
        assert_eq!(config.cities.supported, vec!["Pune", "Patna"]);
    }

    #[test]
    fn set_toml_value_fills_sparse_files_from_schema() {
        let schema = defaults_value();
        let mut root: toml::Value = toml::from_str("[server]\naddr = \"0.0.0.0:1\"").unwrap();
        set_toml_value(&mut root, &schema, "scripts.timeout_secs", "5").unwrap();
        let config: AirplotConfig = root.try_into().unwrap();
        assert_eq!(config.scripts.timeout_secs, 5);
        assert_eq!(config.server.addr, "0.0.0.0:1");
    }

    #[test]
    fn set_toml_value_allows_new_overrides() {
        let schema = defaults_value();
        let mut root = defaults_value();
        set_toml_value(&mut root, &schema, "scripts.overrides.NO2_Map", "/opt/no2.py").unwrap();
        let config: AirplotConfig = root.try_into().unwrap();
        assert_eq!(
            config.scripts.overrides.get("NO2_Map").map(String::as_str),
            Some("/opt/no2.py")
        );
    }

    #[test]
    fn set_toml_value_rejects_unknown_keys() {
        let schema = defaults_value();
        let mut root = defaults_value();
        assert!(set_toml_value(&mut root, &schema, "nonexistent.key", "v").is_err());
        assert!(set_toml_value(&mut root, &schema, "server.port", "80").is_err());
        assert!(set_toml_value(&mut root, &schema, "server.workers", "many").is_err());
    }

    #[test]
    fn expand_tilde_handles_plain_paths() {
        assert_eq!(expand_tilde("/var/log/a.jsonl"), Some(PathBuf::from("/var/log/a.jsonl")));
        assert_eq!(expand_tilde("rel/a.jsonl"), Some(PathBuf::from("rel/a.jsonl")));
    }

    #[test]
    fn load_from_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airplot.toml");
        fs::write(&path, "[scripts]\ndir = \"/srv/scripts\"\n").unwrap();
        let config = load_from(&path).unwrap();
        assert_eq!(config.scripts.dir, "/srv/scripts");
    }

    #[test]
    fn load_from_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airplot.toml");
        fs::write(&path, "[scripts\ndir = ").unwrap();
        assert!(load_from(&path).is_err());
        assert!(load_from(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn show_effective_config_round_trips() {
        let toml_str = show_effective_config(&AirplotConfig::default()).unwrap();
        let _: AirplotConfig = toml::from_str(&toml_str).unwrap();
    }
}

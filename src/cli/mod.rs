//! CLI command implementations for airplot.
//!
//! Provides subcommand handlers for:
//! - `airplot scripts`: list the script registry and what is on disk
//! - `airplot weeks`: week options offered by the week selector
//! - `airplot resolve`: dry-run the duration resolver
//! - `airplot fetch`: post a request to a running server and save the plot
//! - `airplot stats`: invocation log summary
//! - `airplot config show|init|set|reset`: configuration management

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use colored::Colorize;

use crate::analytics::reporter::{self, Stats};
use crate::config::{self, AirplotConfig};
use crate::dispatch::{ScriptDescriptor, ScriptRegistry};
use crate::request::{DateRange, DurationMode, DurationSelection, parse_date};
use crate::resolve::{self, Calendar};
use crate::utils::process;

/// Output format for listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn from_str_opt(s: Option<&str>) -> Self {
        match s {
            Some("json") => Self::Json,
            Some("csv") => Self::Csv,
            _ => Self::Table,
        }
    }
}

// ---------------------------------------------------------------------------
// airplot scripts
// ---------------------------------------------------------------------------

/// List every registered script and whether it exists.
pub fn run_scripts(config: &AirplotConfig, format: OutputFormat) -> Result<()> {
    let registry = ScriptRegistry::discover(&config.scripts)?;
    let scripts: Vec<&ScriptDescriptor> = registry.iter().collect();

    match format {
        OutputFormat::Json => {
            let values: Vec<_> = scripts
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "name": d.key.name(),
                        "path": d.path.display().to_string(),
                        "present": d.exists(),
                        "overridden": d.overridden,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        OutputFormat::Csv => {
            println!("name,path,present,overridden");
            for d in &scripts {
                println!(
                    "{},{},{},{}",
                    d.key.name(),
                    d.path.display(),
                    d.exists(),
                    d.overridden
                );
            }
        }
        OutputFormat::Table => print_scripts_table(config, &scripts),
    }

    Ok(())
}

fn print_scripts_table(config: &AirplotConfig, scripts: &[&ScriptDescriptor]) {
    println!("{}", "airplot Script Registry".bold().cyan());
    println!("{}", "=".repeat(60));

    let interpreter = config.scripts.interpreter.trim();
    if interpreter.is_empty() {
        print_check_item("Interpreter", true, "none (scripts run directly)");
    } else {
        let ok = process::is_command_available(interpreter);
        let detail = if ok {
            interpreter.to_string()
        } else {
            format!("{interpreter} not found on PATH")
        };
        print_check_item("Interpreter", ok, &detail);
    }
    print_check_item(
        "Timeout",
        true,
        &format!("{}s", config.scripts.timeout_secs),
    );
    print_check_item(
        "Artifact policy",
        true,
        &config.artifacts.policy.to_string(),
    );
    println!();

    println!("  {:<20} {:<8} Path", "Script", "Status");
    println!("  {}", "-".repeat(58));
    for d in scripts {
        let status = if d.exists() {
            "ok".green()
        } else {
            "missing".red()
        };
        let path = if d.overridden {
            format!("{} (override)", d.path.display())
        } else {
            d.path.display().to_string()
        };
        println!("  {:<20} {:<8} {}", d.key.name(), status, path.dimmed());
    }

    let missing = scripts.iter().filter(|d| !d.exists()).count();
    if missing > 0 {
        println!();
        println!(
            "{}",
            format!("{missing} script(s) missing; requests for them will return 404.").yellow()
        );
    }
}

fn print_check_item(name: &str, ok: bool, detail: &str) {
    let status = if ok {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!("  {} {:<20} {}", status, name, detail.dimmed());
}

// ---------------------------------------------------------------------------
// airplot weeks
// ---------------------------------------------------------------------------

/// Print week options, optionally only the most recent `limit`.
pub fn run_weeks(limit: Option<usize>, format: OutputFormat) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    let weeks = resolve::week_options(resolve::week_epoch(), today);
    let skip = limit.map_or(0, |n| weeks.len().saturating_sub(n));
    let weeks = &weeks[skip..];

    match format {
        OutputFormat::Json => {
            let values: Vec<_> = weeks
                .iter()
                .map(|w| {
                    serde_json::json!({
                        "token": resolve::week_token(w),
                        "start": w.start.to_string(),
                        "end": w.end.to_string(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        OutputFormat::Csv => {
            println!("token,start,end");
            for w in weeks {
                println!("{},{},{}", resolve::week_token(w), w.start, w.end);
            }
        }
        OutputFormat::Table => {
            for w in weeks {
                println!("  {:<23} {}", resolve::week_token(w), w.to_string().dimmed());
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// airplot resolve
// ---------------------------------------------------------------------------

/// Inputs for a resolver dry run.
#[derive(Debug, Clone, Default)]
pub struct ResolveArgs {
    pub duration: String,
    pub year: Option<String>,
    pub timeframe: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub calendar: Option<String>,
}

/// Resolve a duration selection the way a request would be.
pub fn resolve_selection(config: &AirplotConfig, args: &ResolveArgs) -> Result<(DateRange, Calendar)> {
    let calendar = match &args.calendar {
        Some(name) => config::parse_calendar(name)
            .with_context(|| format!("unknown calendar '{name}' (expected legacy or gregorian)"))?,
        None => config.resolver.calendar,
    };

    let mode: DurationMode = args.duration.parse()?;
    let selection = match mode {
        DurationMode::Date => {
            let start = args.start.as_deref().context("--start is required for date ranges")?;
            let end = args.end.as_deref().context("--end is required for date ranges")?;
            let range = DateRange::new(parse_date("start", start)?, parse_date("end", end)?);
            config.resolver.window().check(&range)?;
            DurationSelection::Date(range)
        }
        DurationMode::Year => DurationSelection::Year {
            year_field: "year",
            year: args.year.clone(),
        },
        DurationMode::Month => DurationSelection::Month {
            year_field: "year",
            year: args.year.clone(),
            month: args.timeframe.clone(),
        },
        DurationMode::Season => DurationSelection::Season {
            year_field: "year",
            year: args.year.clone(),
            season: args.timeframe.clone(),
        },
        DurationMode::Week => DurationSelection::Week {
            token: args.timeframe.clone(),
        },
    };

    Ok((resolve::resolve(&selection, calendar)?, calendar))
}

pub fn run_resolve(config: &AirplotConfig, args: &ResolveArgs) -> Result<()> {
    let (range, calendar) = resolve_selection(config, args)?;
    println!("{} {}", range.start, range.end);
    if !range.is_ordered() {
        eprintln!(
            "{}",
            format!("warning: range is inverted under the {calendar} calendar").yellow()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// airplot fetch
// ---------------------------------------------------------------------------

/// Client timeout for `fetch`: the script timeout plus 30 seconds of
/// headroom. `None` when that cannot be represented as a deadline.
pub fn fetch_timeout(script_timeout_secs: u64) -> Option<Duration> {
    let timeout = Duration::from_secs(script_timeout_secs.saturating_add(30));
    Instant::now().checked_add(timeout).map(|_| timeout)
}

/// Post `fields` as a JSON object to `server` + `path` and write the plot to
/// `output`. NTL responses are decoded from their base64 envelope.
pub fn run_fetch(
    server: &str,
    path: &str,
    fields: &[String],
    output: &Path,
    timeout: Option<Duration>,
) -> Result<()> {
    let body = fields_to_json(fields)?;
    let url = format!("{}{}", server.trim_end_matches('/'), path);

    let mut request = ureq::post(&url);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }
    let resp = match request.send_json(&body) {
        Ok(resp) => resp,
        Err(ureq::Error::Status(code, resp)) => {
            let text = resp.into_string().unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["error"].as_str().map(str::to_string))
                .unwrap_or(text);
            anyhow::bail!("server returned {code}: {message}");
        }
        Err(e) => return Err(e).with_context(|| format!("request to {url} failed")),
    };

    let content_type = resp.content_type().to_string();
    let mut bytes = Vec::new();
    resp.into_reader()
        .read_to_end(&mut bytes)
        .context("failed to read response body")?;

    if content_type.starts_with("application/json") {
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).context("failed to parse JSON response")?;
        let encoded = value["ntlPlot"]
            .as_str()
            .context("JSON response has no ntlPlot field")?;
        bytes = BASE64
            .decode(encoded)
            .context("ntlPlot is not valid base64")?;
    }

    fs::write(output, &bytes).with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "{} {} ({} bytes, {})",
        "✓".green().bold(),
        output.display(),
        bytes.len(),
        content_type
    );
    Ok(())
}

/// Turn `key=value` pairs into a JSON object of strings.
fn fields_to_json(fields: &[String]) -> Result<serde_json::Value> {
    let mut map = serde_json::Map::new();
    for field in fields {
        let (key, value) = field
            .split_once('=')
            .with_context(|| format!("field '{field}' is not key=value"))?;
        map.insert(key.trim().to_string(), serde_json::Value::String(value.to_string()));
    }
    Ok(serde_json::Value::Object(map))
}

/// Default output file for a plot endpoint.
pub fn default_output(path: &str) -> PathBuf {
    match path {
        "/time-series-data" => PathBuf::from("plot.html"),
        _ => PathBuf::from("plot.png"),
    }
}

// ---------------------------------------------------------------------------
// airplot stats
// ---------------------------------------------------------------------------

/// Show invocation statistics.
pub fn run_stats(config: &AirplotConfig, format: OutputFormat, days: Option<u32>) -> Result<()> {
    let Some(path) = config.logging.log_path() else {
        println!("{}", "Invocation logging is disabled.".yellow());
        return Ok(());
    };
    let stats = reporter::compute_stats(&path, days);

    if stats.total_requests == 0 {
        println!(
            "{}",
            "No data yet. Serve some plot requests to see stats.".yellow()
        );
        return Ok(());
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Csv => print_stats_csv(&stats),
        OutputFormat::Table => print_stats_table(&stats),
    }

    Ok(())
}

fn print_stats_table(stats: &Stats) {
    println!("{}", "airplot Invocation Report".bold().cyan());
    println!("{}", "=".repeat(60));
    println!();

    println!("  {} {}", "Total requests:".bold(), format_number(stats.total_requests));
    println!(
        "  {} {} ({:.1}%)",
        "Succeeded:     ".bold(),
        format_number(stats.succeeded),
        stats.success_pct()
    );
    println!("  {} {}", "Failed:        ".bold(), format_number(stats.failed));
    println!("  {} {:.0}ms", "Avg duration:  ".bold(), stats.avg_duration_ms);
    println!();

    if !stats.failures_by_kind.is_empty() {
        println!("{}", "Failures by Kind".bold().cyan());
        for (kind, count) in &stats.failures_by_kind {
            println!("  {:<28} {:>6}", colorize_kind(kind), count);
        }
        println!();
    }

    if !stats.script_stats.is_empty() {
        println!("{}", "Scripts".bold().cyan());
        println!(
            "  {:<18} {:>6} {:>8} {:>8} {:>10} Top city",
            "Script", "Count", "Failed", "Timeout", "Avg ms"
        );
        println!("  {}", "-".repeat(66));

        for (i, s) in stats.script_stats.iter().enumerate() {
            let line = format!(
                "  {:<18} {:>6} {:>8} {:>8} {:>10.0} {}",
                truncate(&s.script, 18),
                s.count,
                s.failures,
                s.timeouts,
                s.avg_duration_ms,
                s.top_city,
            );

            if i % 2 == 0 {
                println!("{}", line);
            } else {
                println!("{}", line.dimmed());
            }
        }
    }
}

fn print_stats_csv(stats: &Stats) {
    println!("script,count,failures,timeouts,avg_duration_ms,max_duration_ms,top_city");
    for s in &stats.script_stats {
        println!(
            "{},{},{},{},{:.1},{},{}",
            s.script, s.count, s.failures, s.timeouts, s.avg_duration_ms, s.max_duration_ms, s.top_city,
        );
    }
}

// ---------------------------------------------------------------------------
// airplot config show | init | set | reset
// ---------------------------------------------------------------------------

/// Show the effective (merged) configuration as TOML.
pub fn run_config_show(config: &AirplotConfig) -> Result<()> {
    let toml_str = config::show_effective_config(config)?;
    println!("{}", "Effective airplot Configuration".bold().cyan());
    println!("{}", "=".repeat(50));
    println!();
    println!("{toml_str}");

    let global_exists = config::global_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    let project_exists = config::project_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    println!("{}", "Sources (highest priority last):".dimmed());
    println!("  {} built-in defaults", "·".dimmed());
    if global_exists {
        println!("  {} {}", "✓".green(), "~/.airplot/config.toml".dimmed());
    } else {
        println!(
            "  {} {}",
            "·".dimmed(),
            "~/.airplot/config.toml (not found)".dimmed()
        );
    }
    if project_exists {
        println!("  {} {}", "✓".green(), ".airplot.toml".dimmed());
    } else {
        println!("  {} {}", "·".dimmed(), ".airplot.toml (not found)".dimmed());
    }
    println!(
        "  {} {}",
        "·".dimmed(),
        "AIRPLOT_* environment variables".dimmed()
    );

    Ok(())
}

/// Initialize a default config file at `~/.airplot/config.toml`.
pub fn run_config_init(force: bool) -> Result<()> {
    let path = config::init_config(force)?;
    println!(
        "{} Config written to {}",
        "✓".green().bold(),
        path.display()
    );
    println!("  {}", "Edit the file to point at your scripts.".dimmed());
    Ok(())
}

/// Set a single config value using a dotted key.
pub fn run_config_set(key: &str, value: &str) -> Result<()> {
    let path = config::set_config_value(key, value)?;
    println!(
        "{} {} = {} ({})",
        "✓".green().bold(),
        key,
        value,
        path.display()
    );
    Ok(())
}

/// Reset the global config to defaults.
pub fn run_config_reset() -> Result<()> {
    let path = config::reset_config()?;
    println!(
        "{} Config reset to defaults at {}",
        "✓".green().bold(),
        path.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Format a number with comma separators for readability.
fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result.chars().rev().collect()
}

/// Truncate a string to `max_len` characters, appending "…" if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

/// Colorize an error kind by HTTP class.
fn colorize_kind(kind: &str) -> colored::ColoredString {
    match kind {
        "validation" | "out-of-range" | "unresolved-timeframe" => kind.yellow(),
        "external-process-timeout" => kind.magenta(),
        _ => kind.red(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("NTL", 10), "NTL");
        assert_eq!(truncate("HCHO_Time_Series", 5), "HCHO…");
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(OutputFormat::from_str_opt(None), OutputFormat::Table);
        assert_eq!(OutputFormat::from_str_opt(Some("json")), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str_opt(Some("csv")), OutputFormat::Csv);
        assert_eq!(
            OutputFormat::from_str_opt(Some("unknown")),
            OutputFormat::Table
        );
    }

    #[test]
    fn fields_become_string_object() {
        let fields = vec!["city=Mumbai".to_string(), "startDate=2020-01-01".to_string()];
        let value = fields_to_json(&fields).unwrap();
        assert_eq!(value["city"], "Mumbai");
        assert_eq!(value["startDate"], "2020-01-01");
        assert!(fields_to_json(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn fetch_timeout_adds_headroom() {
        assert_eq!(fetch_timeout(300), Some(Duration::from_secs(330)));
        assert_eq!(fetch_timeout(u64::MAX), None);
    }

    #[test]
    fn resolve_month_under_both_calendars() {
        let config = AirplotConfig::default();
        let mut args = ResolveArgs {
            duration: "Month".to_string(),
            year: Some("2020".to_string()),
            timeframe: Some("february".to_string()),
            ..ResolveArgs::default()
        };
        let (range, calendar) = resolve_selection(&config, &args).unwrap();
        assert_eq!(calendar, Calendar::Legacy);
        assert_eq!(range.end.to_string(), "2020-02-28");

        args.calendar = Some("gregorian".to_string());
        let (range, _) = resolve_selection(&config, &args).unwrap();
        assert_eq!(range.end.to_string(), "2020-02-29");
    }

    #[test]
    fn resolve_date_checks_window() {
        let config = AirplotConfig::default();
        let args = ResolveArgs {
            duration: "Date".to_string(),
            start: Some("2017-01-01".to_string()),
            end: Some("2017-02-01".to_string()),
            ..ResolveArgs::default()
        };
        assert!(resolve_selection(&config, &args).is_err());
    }

    #[test]
    fn default_output_by_endpoint() {
        assert_eq!(default_output("/time-series-data"), PathBuf::from("plot.html"));
        assert_eq!(default_output("/ntl-data"), PathBuf::from("plot.png"));
    }
}

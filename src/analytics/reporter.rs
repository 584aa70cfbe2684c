//! Invocation log aggregation for `airplot stats`.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use crate::analytics::logger::{self, InvocationLogEntry};

// ---------------------------------------------------------------------------
// Aggregated stats
// ---------------------------------------------------------------------------

/// Summary statistics for `airplot stats`.
#[derive(Debug, Serialize)]
pub struct Stats {
    pub total_requests: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub avg_duration_ms: f64,
    /// Failure counts by error kind, most frequent first.
    pub failures_by_kind: Vec<(String, usize)>,
    pub script_stats: Vec<ScriptStat>,
}

impl Stats {
    pub fn success_pct(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.succeeded as f64 / self.total_requests as f64) * 100.0
        }
    }
}

/// Per-script aggregated statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptStat {
    pub script: String,
    pub count: usize,
    pub failures: usize,
    pub timeouts: usize,
    pub avg_duration_ms: f64,
    pub max_duration_ms: u64,
    /// Most-requested city for this script.
    pub top_city: String,
}

// ---------------------------------------------------------------------------
// Stats computation
// ---------------------------------------------------------------------------

/// Compute aggregate stats from the log at `path`, optionally filtered to
/// the last `days` days.
pub fn compute_stats(path: &Path, days: Option<u32>) -> Stats {
    let entries = logger::read_entries_since_days(path, days);
    build_stats(&entries)
}

pub fn build_stats(entries: &[InvocationLogEntry]) -> Stats {
    let total_requests = entries.len();
    let succeeded = entries.iter().filter(|e| e.succeeded()).count();
    let avg_duration_ms = average(entries.iter().map(|e| e.duration_ms));

    let mut kinds: HashMap<&str, usize> = HashMap::new();
    for entry in entries.iter().filter(|e| !e.succeeded()) {
        *kinds.entry(entry.outcome.as_str()).or_default() += 1;
    }
    let mut failures_by_kind: Vec<(String, usize)> = kinds
        .into_iter()
        .map(|(kind, count)| (kind.to_string(), count))
        .collect();
    failures_by_kind.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    Stats {
        total_requests,
        succeeded,
        failed: total_requests - succeeded,
        avg_duration_ms,
        failures_by_kind,
        script_stats: compute_script_stats(entries),
    }
}

/// Group entries that reached a script by script name.
///
/// Returns sorted by request count (descending).
fn compute_script_stats(entries: &[InvocationLogEntry]) -> Vec<ScriptStat> {
    let mut groups: HashMap<&str, Vec<&InvocationLogEntry>> = HashMap::new();
    for entry in entries {
        if let Some(script) = &entry.script {
            groups.entry(script.as_str()).or_default().push(entry);
        }
    }

    let mut stats: Vec<ScriptStat> = groups
        .into_iter()
        .map(|(script, group)| {
            let mut city_counts: HashMap<&str, usize> = HashMap::new();
            for e in &group {
                if let Some(city) = &e.city {
                    *city_counts.entry(city.as_str()).or_default() += 1;
                }
            }
            let top_city = city_counts
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(city, _)| city.to_string())
                .unwrap_or_default();

            ScriptStat {
                script: script.to_string(),
                count: group.len(),
                failures: group.iter().filter(|e| !e.succeeded()).count(),
                timeouts: group
                    .iter()
                    .filter(|e| e.outcome == "external-process-timeout")
                    .count(),
                avg_duration_ms: average(group.iter().map(|e| e.duration_ms)),
                max_duration_ms: group.iter().map(|e| e.duration_ms).max().unwrap_or(0),
                top_city,
            }
        })
        .collect();

    stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.script.cmp(&b.script)));
    stats
}

fn average(values: impl Iterator<Item = u64>) -> f64 {
    let (sum, count) = values.fold((0u64, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum as f64 / count as f64 }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(script: Option<&str>, city: &str, outcome: &str, duration_ms: u64) -> InvocationLogEntry {
        let mut e = InvocationLogEntry::new("/pollution-data");
        e.script = script.map(str::to_string);
        e.city = Some(city.to_string());
        e.outcome = outcome.to_string();
        e.duration_ms = duration_ms;
        e
    }

    fn sample_entries() -> Vec<InvocationLogEntry> {
        vec![
            entry(Some("NO2_Map"), "Mumbai", "ok", 1000),
            entry(Some("NO2_Map"), "Mumbai", "ok", 3000),
            entry(Some("NO2_Map"), "Delhi", "external-process-timeout", 5000),
            entry(Some("NTL"), "Pune", "external-process", 200),
            entry(None, "Pune", "validation", 0),
        ]
    }

    #[test]
    fn totals_and_failures() {
        let stats = build_stats(&sample_entries());
        assert_eq!(stats.total_requests, 5);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 3);
        assert!((stats.success_pct() - 40.0).abs() < f64::EPSILON);
        assert_eq!(stats.failures_by_kind.len(), 3);
    }

    #[test]
    fn script_grouping_skips_validation_failures() {
        let stats = build_stats(&sample_entries());
        assert_eq!(stats.script_stats.len(), 2);

        let no2 = &stats.script_stats[0];
        assert_eq!(no2.script, "NO2_Map");
        assert_eq!(no2.count, 3);
        assert_eq!(no2.failures, 1);
        assert_eq!(no2.timeouts, 1);
        assert_eq!(no2.max_duration_ms, 5000);
        assert!((no2.avg_duration_ms - 3000.0).abs() < f64::EPSILON);
        assert_eq!(no2.top_city, "Mumbai");
    }

    #[test]
    fn empty_entries() {
        let stats = build_stats(&[]);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.success_pct(), 0.0);
        assert_eq!(stats.avg_duration_ms, 0.0);
        assert!(stats.script_stats.is_empty());
    }
}

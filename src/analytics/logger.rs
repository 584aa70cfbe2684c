use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::AirplotConfig;

// ---------------------------------------------------------------------------
// Invocation log entry (JSONL)
// ---------------------------------------------------------------------------

/// A single entry in the invocation log (`~/.airplot/invocations.jsonl`).
///
/// One entry is written per plot request that reached the pipeline, whether
/// or not a script was started. Used by `airplot stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationLogEntry {
    pub timestamp: String,
    /// Request path, e.g. `/pollution-data`.
    pub endpoint: String,
    /// Script name (`NO2_Map`). Unset when validation failed first.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end: Option<String>,
    /// `"ok"` or the error kind (`"external-process-timeout"`, ...).
    pub outcome: String,
    /// HTTP status sent for this request.
    pub status: u16,
    /// Time from validation to materialized payload, in milliseconds.
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub artifact_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl InvocationLogEntry {
    /// A fresh entry stamped with the current time.
    pub fn new(endpoint: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            endpoint: endpoint.to_string(),
            script: None,
            city: None,
            start: None,
            end: None,
            outcome: "ok".to_string(),
            status: 200,
            duration_ms: 0,
            artifact_bytes: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == "ok"
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Append-only JSONL writer shared by all request workers.
///
/// Lines are written whole under a lock so concurrent requests never
/// interleave. Write failures are ignored.
#[derive(Debug)]
pub struct InvocationLog {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl InvocationLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn from_config(config: &AirplotConfig) -> Self {
        Self::new(config.logging.log_path())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, entry: &InvocationLogEntry) {
        let Some(path) = &self.path else {
            return;
        };
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = append_log_entry(path, entry);
    }
}

// ---------------------------------------------------------------------------
// Reading log entries
// ---------------------------------------------------------------------------

/// Read all entries from the log at `path`.
///
/// Silently skips malformed lines. Returns an empty vec if the file does not
/// exist or cannot be read.
pub fn read_all_entries(path: &Path) -> Vec<InvocationLogEntry> {
    let Ok(file) = fs::File::open(path) else {
        return Vec::new();
    };

    let reader = BufReader::new(file);
    reader
        .lines()
        .map_while(Result::ok)
        .filter_map(|line| serde_json::from_str::<InvocationLogEntry>(&line).ok())
        .collect()
}

/// Read log entries filtered to a time window (last N days).
///
/// If `days` is `None`, returns all entries.
pub fn read_entries_since_days(path: &Path, days: Option<u32>) -> Vec<InvocationLogEntry> {
    let entries = read_all_entries(path);

    let Some(days) = days else {
        return entries;
    };

    let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
    let cutoff_str = cutoff.to_rfc3339();

    entries
        .into_iter()
        .filter(|e| e.timestamp >= cutoff_str)
        .collect()
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

fn append_log_entry(path: &Path, entry: &InvocationLogEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let json = serde_json::to_string(entry)?;
    writeln!(file, "{json}")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn record_appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("invocations.jsonl");
        let log = InvocationLog::new(Some(path.clone()));

        let mut entry = InvocationLogEntry::new("/pollution-data");
        entry.script = Some("NO2_Map".to_string());
        log.record(&entry);
        entry.outcome = "external-process".to_string();
        entry.status = 500;
        log.record(&entry);

        let entries = read_all_entries(&path);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].succeeded());
        assert_eq!(entries[1].status, 500);
    }

    #[test]
    fn disabled_log_writes_nothing() {
        let log = InvocationLog::disabled();
        log.record(&InvocationLogEntry::new("/ntl-data"));
        assert!(log.path().is_none());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let good = serde_json::to_string(&InvocationLogEntry::new("/ntl-data")).unwrap();
        fs::write(&path, format!("not json\n{good}\n{{\"partial\":\n")).unwrap();
        assert_eq!(read_all_entries(&path).len(), 1);
    }

    #[test]
    fn concurrent_records_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let log = Arc::new(InvocationLog::new(Some(path.clone())));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for _ in 0..25 {
                        let mut entry = InvocationLogEntry::new("/time-series-data");
                        entry.city = Some(format!("city-{i}"));
                        log.record(&entry);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(read_all_entries(&path).len(), 200);
    }

    #[test]
    fn days_filter_drops_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let log = InvocationLog::new(Some(path.clone()));
        let mut old = InvocationLogEntry::new("/ntl-data");
        old.timestamp = "2019-01-01T00:00:00+00:00".to_string();
        log.record(&old);
        log.record(&InvocationLogEntry::new("/ntl-data"));

        assert_eq!(read_entries_since_days(&path, None).len(), 2);
        assert_eq!(read_entries_since_days(&path, Some(7)).len(), 1);
    }
}

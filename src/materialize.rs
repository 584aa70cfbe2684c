//! Artifact locations and response payloads.
//!
//! Under the `unique` policy every request gets a fresh directory under
//! `artifacts.dir`, and the script receives the output file path as its last
//! argument. The directory is removed when the [`ArtifactSlot`] drops, after
//! the artifact has been read into memory.
//!
//! Under the `legacy` policy scripts write to fixed paths. A slot holds an
//! exclusive claim on its path from before the script starts until the
//! artifact has been read, so two requests never observe each other's plot.
//! Requests for different fixed paths still run concurrently.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tempfile::TempDir;

use crate::config::{AirplotConfig, ArtifactPolicy};
use crate::dispatch::ScriptKey;
use crate::error::PlotError;

/// How an artifact is returned to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Raw PNG bytes, `image/png`.
    PngBinary,
    /// PNG wrapped as `{"ntlPlot": "<base64>"}`.
    PngBase64Json,
    /// An HTML document, `text/html`.
    HtmlText,
}

impl ArtifactKind {
    /// Kind of a fixed-path artifact, following the file the script writes.
    /// Some time-series scripts write a PNG rather than HTML.
    fn for_fixed_path(self, path: &Path) -> Self {
        let is_html = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"));
        match self {
            Self::PngBase64Json => self,
            _ if is_html => Self::HtmlText,
            _ => Self::PngBinary,
        }
    }

    fn file_name(self) -> &'static str {
        match self {
            Self::PngBinary | Self::PngBase64Json => "plot.png",
            Self::HtmlText => "plot.html",
        }
    }
}

/// A materialized response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Png(Vec<u8>),
    Json(String),
    Html(String),
}

impl Payload {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png(_) => "image/png",
            Self::Json(_) => "application/json",
            Self::Html(_) => "text/html; charset=utf-8",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Png(bytes) => bytes.len(),
            Self::Json(text) | Self::Html(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Png(bytes) => bytes,
            Self::Json(text) | Self::Html(text) => text.into_bytes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Hands out artifact slots according to the configured policy.
#[derive(Debug)]
pub struct ArtifactStore {
    policy: ArtifactPolicy,
    dir: PathBuf,
    /// Absolute fixed output path per script.
    legacy: BTreeMap<ScriptKey, PathBuf>,
    busy: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

impl ArtifactStore {
    /// Fails on a `[artifacts.legacy]` entry that names no known script.
    pub fn from_config(config: &AirplotConfig) -> Result<Self> {
        for name in config.artifacts.legacy.keys() {
            if ScriptKey::from_name(name).is_none() {
                anyhow::bail!("unknown script name '{name}' in [artifacts.legacy]");
            }
        }

        let base = absolute(Path::new(&config.scripts.working_dir));
        let legacy = ScriptKey::all()
            .into_iter()
            .filter_map(|key| {
                let path = config.artifacts.legacy_path(&key.name())?;
                Some((key, base.join(path)))
            })
            .collect();

        Ok(Self {
            policy: config.artifacts.policy,
            dir: absolute(Path::new(&config.artifacts.dir)),
            legacy,
            busy: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        })
    }

    pub fn policy(&self) -> ArtifactPolicy {
        self.policy
    }

    /// Reserve the output location for one invocation of `key`.
    ///
    /// Under `legacy` this blocks while another request holds the same fixed
    /// path, then removes any stale file left there.
    pub fn reserve(&self, key: ScriptKey, kind: ArtifactKind) -> Result<ArtifactSlot<'_>, PlotError> {
        match self.policy {
            ArtifactPolicy::Unique => {
                fs::create_dir_all(&self.dir)?;
                let dir = tempfile::Builder::new()
                    .prefix(&format!("{}-", key.name()))
                    .tempdir_in(&self.dir)?;
                let path = dir.path().join(kind.file_name());
                Ok(ArtifactSlot {
                    path,
                    kind,
                    pass_to_script: true,
                    _dir: Some(dir),
                    claim: None,
                })
            }
            ArtifactPolicy::Legacy => {
                let path = self.legacy_path(key)?.to_path_buf();
                let kind = kind.for_fixed_path(&path);
                self.claim(&path);
                // The slot owns the claim from here, so early returns release it.
                let slot = ArtifactSlot {
                    path: path.clone(),
                    kind,
                    pass_to_script: false,
                    _dir: None,
                    claim: Some(self),
                };
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                Ok(slot)
            }
        }
    }

    /// The fixed path `key` writes under the `legacy` policy.
    pub fn legacy_path(&self, key: ScriptKey) -> Result<&Path, PlotError> {
        self.legacy
            .get(&key)
            .map(PathBuf::as_path)
            .ok_or_else(|| PlotError::ArtifactNotFound {
                key: key.name(),
                path: PathBuf::new(),
            })
    }

    fn lock_busy(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn claim(&self, path: &Path) {
        let mut busy = self.lock_busy();
        while busy.contains(path) {
            busy = self
                .released
                .wait(busy)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        busy.insert(path.to_path_buf());
    }

    fn release(&self, path: &Path) {
        self.lock_busy().remove(path);
        self.released.notify_all();
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// Output location owned by one request.
#[derive(Debug)]
pub struct ArtifactSlot<'a> {
    path: PathBuf,
    kind: ArtifactKind,
    pass_to_script: bool,
    _dir: Option<TempDir>,
    claim: Option<&'a ArtifactStore>,
}

impl ArtifactSlot<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Trailing script argument naming the output file, if the policy passes
    /// one.
    pub fn script_arg(&self) -> Option<String> {
        self.pass_to_script
            .then(|| self.path.display().to_string())
    }

    /// Read the artifact and shape it for the client. A missing or empty
    /// file means the script did not produce a plot.
    pub fn materialize(&self, key: ScriptKey) -> Result<Payload, PlotError> {
        let not_found = || PlotError::ArtifactNotFound {
            key: key.name(),
            path: self.path.clone(),
        };
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Err(not_found());
        }

        Ok(match self.kind {
            ArtifactKind::PngBinary => Payload::Png(bytes),
            ArtifactKind::PngBase64Json => {
                Payload::Json(serde_json::json!({ "ntlPlot": BASE64.encode(&bytes) }).to_string())
            }
            ArtifactKind::HtmlText => Payload::Html(String::from_utf8_lossy(&bytes).into_owned()),
        })
    }
}

impl Drop for ArtifactSlot<'_> {
    fn drop(&mut self) {
        if let Some(store) = self.claim.take() {
            store.release(&self.path);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

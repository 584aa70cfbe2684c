//! Script registry and invocation.
//!
//! The registry maps every (pollutant, plot kind) pair plus the nightlight
//! plot to a script descriptor once, at startup. Unknown combinations cannot
//! be expressed ([`ScriptKey`] is closed), and scripts that are registered
//! but absent on disk are reported up front instead of surfacing only when a
//! user first asks for that plot.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::schema::ScriptsConfig;
use crate::error::PlotError;
use crate::request::{PlotKind, Pollutant};
use crate::utils::process::{self, ProcessOutput, RunOutcome};

/// Identifies one analysis script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScriptKey {
    Plot(Pollutant, PlotKind),
    /// Nightlight radiance plot.
    Ntl,
}

impl ScriptKey {
    /// Every script the server can dispatch to.
    pub fn all() -> Vec<ScriptKey> {
        let mut keys: Vec<ScriptKey> = Pollutant::ALL
            .into_iter()
            .flat_map(|p| PlotKind::ALL.into_iter().map(move |k| ScriptKey::Plot(p, k)))
            .collect();
        keys.push(ScriptKey::Ntl);
        keys
    }

    /// Conventional file stem: `NO2_Map`, `CO_Time_Series`, `NTL`.
    pub fn name(&self) -> String {
        match self {
            Self::Plot(pollutant, kind) => format!("{}_{}", pollutant.as_str(), kind.script_suffix()),
            Self::Ntl => "NTL".to_string(),
        }
    }

    /// Look a key up by its conventional name.
    pub fn from_name(name: &str) -> Option<ScriptKey> {
        Self::all().into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for ScriptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A registered script and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDescriptor {
    pub key: ScriptKey,
    pub path: PathBuf,
    /// Set when the path came from `[scripts.overrides]`.
    pub overridden: bool,
}

impl ScriptDescriptor {
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Startup-built mapping from [`ScriptKey`] to [`ScriptDescriptor`].
#[derive(Debug, Clone)]
pub struct ScriptRegistry {
    scripts: BTreeMap<ScriptKey, ScriptDescriptor>,
}

impl ScriptRegistry {
    /// Build the registry from the scripts directory and overrides.
    ///
    /// Files are matched by exact stem and case-insensitive extension, so
    /// `SO2_Time_Series.PY` registers under `SO2_Time_Series`. Fails on an
    /// override for an unknown script name, and on missing scripts when
    /// `strict` is set.
    pub fn discover(config: &ScriptsConfig) -> Result<Self> {
        let dir = absolute(Path::new(&config.dir));
        let found = scan_dir(&dir, &config.extension)?;

        for name in config.overrides.keys() {
            if ScriptKey::from_name(name).is_none() {
                anyhow::bail!(
                    "unknown script name '{name}' in [scripts.overrides] (expected one of: {})",
                    ScriptKey::all()
                        .iter()
                        .map(ScriptKey::name)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }

        let scripts = ScriptKey::all()
            .into_iter()
            .map(|key| {
                let name = key.name();
                let descriptor = match config.overrides.get(&name) {
                    Some(path) => ScriptDescriptor {
                        key,
                        path: absolute(Path::new(path)),
                        overridden: true,
                    },
                    None => ScriptDescriptor {
                        key,
                        path: found
                            .get(&name)
                            .cloned()
                            .unwrap_or_else(|| dir.join(conventional_file(&name, &config.extension))),
                        overridden: false,
                    },
                };
                (key, descriptor)
            })
            .collect();

        let registry = Self { scripts };

        let missing = registry.missing();
        if config.strict && !missing.is_empty() {
            anyhow::bail!(
                "missing scripts: {}",
                missing
                    .iter()
                    .map(|d| d.path.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Ok(registry)
    }

    /// Build a registry from explicit descriptors.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ScriptDescriptor>) -> Self {
        Self {
            scripts: descriptors.into_iter().map(|d| (d.key, d)).collect(),
        }
    }

    /// Descriptor for `key`, provided the script is on disk.
    pub fn lookup(&self, key: ScriptKey) -> Result<&ScriptDescriptor, PlotError> {
        match self.scripts.get(&key) {
            Some(descriptor) if descriptor.exists() => Ok(descriptor),
            Some(descriptor) => Err(PlotError::ScriptNotFound {
                key: key.name(),
                path: descriptor.path.clone(),
            }),
            None => Err(PlotError::ScriptNotFound {
                key: key.name(),
                path: PathBuf::new(),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScriptDescriptor> {
        self.scripts.values()
    }

    /// Registered scripts whose file does not exist.
    pub fn missing(&self) -> Vec<&ScriptDescriptor> {
        self.scripts.values().filter(|d| !d.exists()).collect()
    }
}

/// Map of file stem to path for files in `dir` with the given extension.
fn scan_dir(dir: &Path, extension: &str) -> Result<HashMap<String, PathBuf>> {
    let mut found = HashMap::new();
    if !dir.is_dir() {
        return Ok(found);
    }
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read scripts directory {}", dir.display()))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext_matches = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.eq_ignore_ascii_case(extension),
            None => extension.is_empty(),
        };
        if !ext_matches {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            found.insert(stem.to_string(), path.clone());
        }
    }
    Ok(found)
}

fn conventional_file(name: &str, extension: &str) -> String {
    if extension.is_empty() {
        name.to_string()
    } else {
        format!("{name}.{extension}")
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// One prepared script run. Owned by a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInvocation {
    pub key: ScriptKey,
    pub script: PathBuf,
    /// Positional arguments after the script path.
    pub args: Vec<String>,
}

/// Runs registered scripts with a time bound.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: ScriptRegistry,
    interpreter: Option<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: ScriptRegistry, config: &ScriptsConfig) -> Self {
        let interpreter = config.interpreter.trim();
        Self {
            registry,
            interpreter: (!interpreter.is_empty()).then(|| interpreter.to_string()),
            working_dir: absolute(Path::new(&config.working_dir)),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    pub fn interpreter(&self) -> Option<&str> {
        self.interpreter.as_deref()
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve `key` to its script and attach positional arguments.
    pub fn prepare(&self, key: ScriptKey, args: Vec<String>) -> Result<ScriptInvocation, PlotError> {
        let descriptor = self.registry.lookup(key)?;
        Ok(ScriptInvocation {
            key,
            script: descriptor.path.clone(),
            args,
        })
    }

    /// The full command line for an invocation.
    pub fn command(&self, invocation: &ScriptInvocation) -> Command {
        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut c = Command::new(interpreter);
                c.arg(&invocation.script);
                c
            }
            None => Command::new(&invocation.script),
        };
        command.args(&invocation.args).current_dir(&self.working_dir);
        command
    }

    /// Run the invocation once. Non-zero exit, spawn failure and timeout are
    /// all errors; stdout is not kept.
    pub fn invoke(&self, invocation: &ScriptInvocation) -> Result<ProcessOutput, PlotError> {
        let key = invocation.key.name();
        if !invocation.script.is_file() {
            return Err(PlotError::ScriptNotFound {
                key,
                path: invocation.script.clone(),
            });
        }

        let outcome = process::run_with_timeout(self.command(invocation), self.timeout)
            .map_err(|e| PlotError::ExternalProcess {
                key: key.clone(),
                status: "failed to start".to_string(),
                stderr: e.to_string(),
            })?;

        match outcome {
            RunOutcome::Exited(output) if output.success => Ok(output),
            RunOutcome::Exited(output) => Err(PlotError::ExternalProcess {
                key,
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            }),
            RunOutcome::TimedOut { .. } => Err(PlotError::ExternalProcessTimeout {
                key,
                after: self.timeout,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

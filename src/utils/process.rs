use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long to wait for the stderr reader after the child is gone. A
/// grandchild that inherited the pipe can keep it open indefinitely.
const STDERR_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    /// Human-readable exit status (`exit status: 1`, `signal: 9`).
    pub status: String,
    pub elapsed: Duration,
}

/// Result of a time-bounded run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Exited(ProcessOutput),
    /// The deadline passed; the child was killed.
    TimedOut { stderr: String, elapsed: Duration },
}

/// Spawn `command` with stdout discarded and stderr captured, and wait for
/// it up to `timeout`. On expiry the child is killed and reaped.
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> std::io::Result<RunOutcome> {
    let start = Instant::now();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let stderr_rx = drain_stderr(&mut child);
    let status = supervise(&mut child, timeout)?;
    let stderr = collect_stderr(stderr_rx);
    let elapsed = start.elapsed();

    Ok(match status {
        Some(status) => RunOutcome::Exited(ProcessOutput {
            stderr,
            exit_code: status.code(),
            success: status.success(),
            status: status.to_string(),
            elapsed,
        }),
        None => RunOutcome::TimedOut { stderr, elapsed },
    })
}

/// Poll the child until it exits or the deadline passes. Returns `None`
/// after killing a child that overran. A timeout too large to represent as
/// an `Instant` means no deadline.
fn supervise(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {}
            Err(e) => {
                stop(child);
                return Err(e);
            }
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            stop(child);
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kill and reap `child`. The child may already have exited.
fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain_stderr(child: &mut Child) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = child.stderr.take() {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
    }
    rx
}

fn collect_stderr(rx: mpsc::Receiver<String>) -> String {
    rx.recv_timeout(STDERR_GRACE).unwrap_or_default()
}

/// Name of the host platform.
pub fn platform_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// Whether `program` resolves to a file, either as a path or via `PATH`.
pub fn is_command_available(program: &str) -> bool {
    if program.is_empty() {
        return false;
    }
    let direct = Path::new(program);
    if direct.components().count() > 1 {
        return direct.is_file();
    }
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(program);
        candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
    })
}

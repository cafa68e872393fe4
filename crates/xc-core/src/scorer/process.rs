//! Child-process execution with timeout and output cap.
//!
//! - Optional timeout with SIGTERM → SIGKILL escalation
//! - stdout/stderr captured up to a byte cap (the rest is read and dropped
//!   so the child never blocks on a full pipe)
//! - Command validation before spawn

use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, trace, warn};

/// Default maximum captured bytes per stream (1 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL in milliseconds.
const SIGTERM_GRACE_MS: u64 = 500;

const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command failed to spawn: {0}")]
    SpawnFailed(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a finished (or killed) child left behind.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutput {
    pub command: String,
    pub args: Vec<String>,
    #[serde(skip)]
    pub stdout: Vec<u8>,
    #[serde(skip)]
    pub stderr: Vec<u8>,
    /// None when the child was killed by a signal.
    pub exit_code: Option<i32>,
    pub truncated: bool,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub timed_out: bool,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl ProcessOutput {
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Exit code 0 and no timeout.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Last `max_lines` lines of stderr, for error messages.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let text = self.stderr_str();
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

/// A single invocation.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// None waits indefinitely.
    pub timeout: Option<Duration>,
    pub max_output: usize,
}

impl ProcessSpec {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: None,
            timeout: None,
            max_output: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Shell-like rendering for logs and error messages.
    pub fn display_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Run a child process to completion or timeout.
pub fn run_process(spec: &ProcessSpec) -> Result<ProcessOutput, ProcessError> {
    validate_command(&spec.command)?;

    debug!(
        command = %spec.command,
        args = ?spec.args,
        timeout_ms = spec.timeout.map(|t| t.as_millis() as u64),
        max_output = spec.max_output,
        "spawning process"
    );

    let mut command = Command::new(&spec.command);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(spec.command.clone())
        } else {
            error!(command = %spec.command, error = %e, "failed to spawn");
            ProcessError::SpawnFailed(e.to_string())
        }
    })?;

    let captured = execute_with_timeout(&mut child, spec.timeout, spec.max_output)?;
    let duration = start.elapsed();

    debug!(
        command = %spec.command,
        duration_ms = duration.as_millis() as u64,
        exit_code = ?captured.exit_code,
        timed_out = captured.timed_out,
        "process finished"
    );

    Ok(ProcessOutput {
        command: spec.command.clone(),
        args: spec.args.clone(),
        stdout: captured.stdout,
        stderr: captured.stderr,
        exit_code: captured.exit_code,
        truncated: captured.truncated,
        duration,
        timed_out: captured.timed_out,
    })
}

fn validate_command(cmd: &str) -> Result<(), ProcessError> {
    if cmd.trim().is_empty() {
        return Err(ProcessError::InvalidCommand("empty command".to_string()));
    }
    if cmd.contains(['|', '&', ';', '$', '`', '\n', '\r']) {
        return Err(ProcessError::InvalidCommand(format!(
            "command contains shell metacharacters: {}",
            cmd
        )));
    }
    if cmd.contains('/') && !Path::new(cmd).exists() {
        return Err(ProcessError::CommandNotFound(cmd.to_string()));
    }
    Ok(())
}

struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<i32>,
    truncated: bool,
    timed_out: bool,
}

fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], max: usize, truncated: &mut bool) {
    let space = max.saturating_sub(buf.len());
    if space > 0 {
        let to_copy = chunk.len().min(space);
        buf.extend_from_slice(&chunk[..to_copy]);
        if chunk.len() > space {
            *truncated = true;
        }
    } else if !chunk.is_empty() {
        *truncated = true;
    }
}

fn execute_with_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
    max_output: usize,
) -> Result<Captured, ProcessError> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut stdout_buf = Vec::with_capacity(max_output.min(65536));
    let mut stderr_buf = Vec::with_capacity(max_output.min(65536));
    let mut truncated = false;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(pid = child.id(), "process timed out, sending SIGTERM");
            kill_with_grace(child);
            let exit_code = child.wait().ok().and_then(|s| s.code());
            return Ok(Captured {
                stdout: stdout_buf,
                stderr: stderr_buf,
                exit_code,
                truncated,
                timed_out: true,
            });
        }

        let mut did_read = false;

        if let Some(ref mut out) = stdout {
            if let Ok(n) = try_read_nonblocking(out, &mut chunk) {
                if n > 0 {
                    did_read = true;
                    append_capped(&mut stdout_buf, &chunk[..n], max_output, &mut truncated);
                }
            }
        }

        if let Some(ref mut err) = stderr {
            if let Ok(n) = try_read_nonblocking(err, &mut chunk) {
                if n > 0 {
                    did_read = true;
                    append_capped(&mut stderr_buf, &chunk[..n], max_output, &mut truncated);
                }
            }
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                if let Some(ref mut out) = stdout {
                    let _ = drain_to_limit(out, &mut stdout_buf, max_output, &mut truncated);
                }
                if let Some(ref mut err) = stderr {
                    let _ = drain_to_limit(err, &mut stderr_buf, max_output, &mut truncated);
                }
                trace!(exit_code = ?status.code(), "process exited");
                return Ok(Captured {
                    stdout: stdout_buf,
                    stderr: stderr_buf,
                    exit_code: status.code(),
                    truncated,
                    timed_out: false,
                });
            }
            Ok(None) => {
                if !did_read {
                    thread::sleep(Duration::from_millis(10));
                }
            }
            Err(e) => {
                error!(error = %e, "failed to wait for child");
                return Err(ProcessError::Io(e));
            }
        }
    }
}

/// Drain what is immediately available after exit.
///
/// Non-blocking so a grandchild still holding the pipe cannot hang us.
#[cfg(unix)]
fn drain_to_limit<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
    truncated: &mut bool,
) -> std::io::Result<()> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        match try_read_nonblocking(stream, &mut chunk) {
            Ok(0) => break,
            Ok(n) => append_capped(buf, &chunk[..n], max, truncated),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn drain_to_limit(
    stream: &mut impl Read,
    buf: &mut Vec<u8>,
    max: usize,
    truncated: &mut bool,
) -> std::io::Result<()> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        append_capped(buf, &chunk[..n], max, truncated);
    }
    Ok(())
}

/// SIGTERM, then SIGKILL after the grace period.
#[cfg(unix)]
fn kill_with_grace(child: &mut Child) {
    let pid = child.id() as i32;

    // SAFETY: pid belongs to a child we spawned and have not yet reaped.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    debug!(pid, "sent SIGTERM");

    thread::sleep(Duration::from_millis(SIGTERM_GRACE_MS));

    match child.try_wait() {
        Ok(Some(_)) => trace!(pid, "process exited after SIGTERM"),
        Ok(None) => {
            warn!(pid, "process did not exit after SIGTERM, sending SIGKILL");
            // SAFETY: as above; the child is still unreaped.
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
        }
        Err(e) => error!(pid, error = %e, "failed to check process status"),
    }
}

#[cfg(not(unix))]
fn kill_with_grace(child: &mut Child) {
    let _ = child.kill();
}

/// Read without blocking; `Ok(0)` when nothing is available.
///
/// Sets O_NONBLOCK for the duration of the read and restores the flags.
#[cfg(unix)]
fn try_read_nonblocking<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let fd = stream.as_raw_fd();

    // SAFETY: fd is owned by `stream`, which outlives these calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = stream.read(buf);

    if !was_nonblocking {
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    match result {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn try_read_nonblocking<R: Read>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    stream.read(buf)
}

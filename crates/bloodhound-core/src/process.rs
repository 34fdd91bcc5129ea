//! Process execution
//!
//! Two flavors are offered. [`run_basic`] waits for a short-lived command and
//! hands back its stdout, which is what capability probes need.
//! [`run_streaming`] is for long-running service commands: every line the
//! child writes to stdout or stderr is relayed to the console as soon as it
//! arrives, and the exit status is turned into a typed error.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, warn};
use which::which;

/// Errors raised while running external commands
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("`{0}` is not installed or not available in the current PATH")]
    NotFound(String),

    #[error("Error trying to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with status {code}")]
    Failed { program: String, code: i32 },

    #[error("`{program}` was terminated by a signal")]
    Terminated { program: String },
}

impl ProcessError {
    /// True when the command ran but reported failure
    pub fn is_exit_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Terminated { .. })
    }
}

/// An external command: program, arguments, working directory, extra env
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Render as a shell-like line for logs and messages
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Locate `name` on the search path
pub fn find_executable(name: &str) -> Result<PathBuf> {
    match which(name) {
        Ok(path) => Ok(path),
        Err(_) => bail!(ProcessError::NotFound(name.to_string())),
    }
}

/// Whether `name` can be found on the search path
pub fn is_available(name: &str) -> bool {
    which(name).is_ok()
}

/// Run a command to completion and return its stdout
///
/// Meant for version and capability probes. A non-zero exit is an error.
pub fn run_basic(program: &str, args: &[&str]) -> Result<String> {
    debug!(program, ?args, "running probe command");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        bail!(exit_error(program, output.status));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a command, relaying its output to stdout line by line
pub fn run_streaming(spec: &CommandSpec) -> Result<()> {
    run_streaming_to(spec, Arc::new(Mutex::new(std::io::stdout())))
}

/// Run a command, relaying its output line by line into `sink`
///
/// Stdout and stderr are drained by two reader threads. Lines keep their
/// order within a stream; the two streams interleave as they arrive. Both
/// readers are joined before the exit status is reported.
pub fn run_streaming_to<W>(spec: &CommandSpec, sink: Arc<Mutex<W>>) -> Result<()>
where
    W: Write + Send + 'static,
{
    let path = find_executable(&spec.program)?;

    let mut command = Command::new(&path);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.current_dir {
        command.current_dir(dir);
    }

    debug!(command = %spec.display(), dir = ?spec.current_dir, "starting process");

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let stdout = child
        .stdout
        .take()
        .context("stdout pipe was not captured")?;
    let stderr = child
        .stderr
        .take()
        .context("stderr pipe was not captured")?;

    let relays = [
        relay_lines(stdout, Arc::clone(&sink)),
        relay_lines(stderr, Arc::clone(&sink)),
    ];

    let status = child
        .wait()
        .with_context(|| format!("Failed waiting for `{}`", spec.program))?;

    for relay in relays {
        // A panicking relay only loses console output
        let _ = relay.join();
    }

    if !status.success() {
        warn!(command = %spec.display(), %status, "process exited unsuccessfully");
        bail!(exit_error(&spec.program, status));
    }

    Ok(())
}

fn relay_lines<R, W>(reader: R, sink: Arc<Mutex<W>>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    if let Ok(mut out) = sink.lock() {
                        let _ = writeln!(out, "{}", line);
                        let _ = out.flush();
                    }
                }
            }
        }
    })
}

fn exit_error(program: &str, status: ExitStatus) -> ProcessError {
    match status.code() {
        Some(code) => ProcessError::Failed {
            program: program.to_string(),
            code,
        },
        None => ProcessError::Terminated {
            program: program.to_string(),
        },
    }
}

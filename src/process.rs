//! Running external tools.
//!
//! Every collaborator (the runtime, its package installer, the package
//! manager, the shortcut host) is reached through a [`ToolRunner`]. A call
//! always produces a [`ToolOutput`] whose [`ToolOutcome`] is matched by the
//! caller; only failures to even attempt the launch are returned as errors.
use std::{
    ffi::{OsStr, OsString},
    fmt::Display,
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crate::error::{ProvisionError, ToolMessage};

/// Timeout for quick queries such as `--version`.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for installs and environment creation.
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How an external tool call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Exited with a success status.
    Success,
    /// Exited with a non-zero status.
    ///
    /// Termination by a signal is reported as `-1`.
    ExitCode(i32),
    /// Did not finish before the deadline and was killed.
    TimedOut,
    /// The program does not exist.
    NotFound,
}

/// Result of running a [`ToolCommand`].
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// How the process ended.
    pub outcome: ToolOutcome,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

impl ToolOutput {
    /// Creates an output with empty streams.
    pub fn new(outcome: ToolOutcome) -> Self {
        Self {
            outcome,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Sets the captured standard output.
    pub fn with_stdout<S: Into<String>>(mut self, value: S) -> Self {
        self.stdout = value.into();
        self
    }

    /// Sets the captured standard error.
    pub fn with_stderr<S: Into<String>>(mut self, value: S) -> Self {
        self.stderr = value.into();
        self
    }

    /// Returns whether the outcome is [`ToolOutcome::Success`].
    pub fn is_success(&self) -> bool {
        self.outcome == ToolOutcome::Success
    }

    /// Returns stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.trim().to_string();
        let stderr = self.stderr.trim();

        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr);
        }

        text
    }

    /// Returns a message describing a failed outcome, for use as an error source.
    pub fn failure_message(&self) -> ToolMessage {
        let summary = match self.outcome {
            ToolOutcome::Success => "succeeded".to_string(),
            ToolOutcome::ExitCode(code) => format!("exited with code {code}"),
            ToolOutcome::TimedOut => "timed out".to_string(),
            ToolOutcome::NotFound => "program not found".to_string(),
        };
        let detail = self.combined();

        if detail.is_empty() {
            ToolMessage(summary)
        } else {
            ToolMessage(format!("{summary}\n{detail}"))
        }
    }
}

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ToolCommand {
    /// Creates a command for the given program name or path.
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            current_dir: None,
            timeout: QUERY_TIMEOUT,
        }
    }

    /// Appends an argument.
    pub fn arg<S: AsRef<OsStr>>(mut self, value: S) -> Self {
        self.args.push(value.as_ref().to_os_string());
        self
    }

    /// Appends arguments.
    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(values.into_iter().map(|value| value.as_ref().to_os_string()));
        self
    }

    /// Sets the working directory.
    pub fn current_dir<P: AsRef<Path>>(mut self, value: P) -> Self {
        self.current_dir = Some(value.as_ref().to_path_buf());
        self
    }

    /// Sets how long to wait before killing the process.
    pub fn timeout(mut self, value: Duration) -> Self {
        self.timeout = value;
        self
    }

    /// Returns the program.
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Returns the arguments.
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Returns the working directory.
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Returns the timeout.
    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns whether the arguments contain the given value.
    pub fn has_arg<S: AsRef<OsStr>>(&self, value: S) -> bool {
        self.args.iter().any(|arg| arg == value.as_ref())
    }
}

impl Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;

        for arg in &self.args {
            let arg = arg.to_string_lossy();

            if arg.contains(' ') || arg.is_empty() {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }

        Ok(())
    }
}

/// Seam through which all external programs are run.
pub trait ToolRunner {
    /// Runs the command to completion, capturing its output.
    ///
    /// A missing program is reported as [`ToolOutcome::NotFound`]; other
    /// launch failures (such as permission denied) are returned as errors.
    fn run(&mut self, command: &ToolCommand) -> Result<ToolOutput, ProvisionError>;

    /// Starts the command without waiting for it or capturing its output.
    fn spawn_detached(&mut self, command: &ToolCommand) -> Result<(), ProvisionError>;

    /// Reloads the command search path from the value persisted by the OS.
    ///
    /// Used after a package manager has installed new programs.
    fn refresh_search_path(&mut self);
}

/// [`ToolRunner`] backed by real processes.
#[derive(Debug, Default)]
pub struct SystemRunner {
    search_path: Option<OsString>,
}

impl SystemRunner {
    /// Creates a runner that inherits this process's environment.
    pub fn new() -> Self {
        Self::default()
    }

    fn build(&self, command: &ToolCommand) -> Command {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);

        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }
        if let Some(path) = &self.search_path {
            cmd.env("PATH", path);
        }

        cmd
    }
}

impl ToolRunner for SystemRunner {
    fn run(&mut self, command: &ToolCommand) -> Result<ToolOutput, ProvisionError> {
        tracing::debug!(%command, timeout = ?command.timeout, "running tool");

        let mut cmd = self.build(command);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(%command, "program not found");
                return Ok(ToolOutput::new(ToolOutcome::NotFound));
            }
            Err(error) => return Err(error.into()),
        };

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let outcome = wait_deadline(&mut child, command.timeout)?;

        let output = ToolOutput {
            outcome,
            stdout: join_drain(stdout),
            stderr: join_drain(stderr),
        };

        if output.is_success() {
            tracing::debug!(%command, "tool finished");
        } else {
            tracing::debug!(%command, outcome = ?output.outcome, stderr = output.stderr.trim(), "tool failed");
        }

        Ok(output)
    }

    fn spawn_detached(&mut self, command: &ToolCommand) -> Result<(), ProvisionError> {
        tracing::debug!(%command, "spawning detached");

        let mut cmd = self.build(command);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            cmd.creation_flags(DETACHED_PROCESS);
        }

        cmd.spawn()?;

        Ok(())
    }

    fn refresh_search_path(&mut self) {
        match crate::os::persisted_search_path() {
            Some(value) => {
                tracing::info!(?value, "refreshed search path");
                self.search_path = Some(value);
            }
            None => tracing::debug!("no persisted search path to refresh"),
        }
    }
}

fn drain<R>(stream: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    stream.map(|mut stream| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

fn wait_deadline(child: &mut Child, timeout: Duration) -> Result<ToolOutcome, ProvisionError> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status_outcome(status));
        }

        if Instant::now() >= deadline {
            tracing::warn!(pid = child.id(), "tool timed out, killing");
            let _ = child.kill();
            let _ = child.wait();
            return Ok(ToolOutcome::TimedOut);
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

fn status_outcome(status: ExitStatus) -> ToolOutcome {
    if status.success() {
        ToolOutcome::Success
    } else {
        ToolOutcome::ExitCode(status.code().unwrap_or(-1))
    }
}

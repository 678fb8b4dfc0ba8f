//! Locating a Python runtime.
//!
//! A [`RuntimeLocator`] holds an ordered list of candidates. The order is the
//! policy: entries on the search path come before discovered installs, and
//! discovered installs are sorted newest first. The first candidate whose
//! reported version meets the minimum wins.
use std::{
    collections::HashMap,
    ffi::{OsStr, OsString},
    fmt::Display,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ProvisionError, ProvisionErrorKind},
    process::{ToolCommand, ToolOutcome, ToolRunner, INSTALL_TIMEOUT},
};

/// A `major.minor` runtime version.
///
/// Ordering is lexicographic: major first, then minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuntimeVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl RuntimeVersion {
    /// Creates a version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Display for RuntimeVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

static VERSION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)").ok());

/// Parses the first `major.minor` pair out of free-form version output.
///
/// Grammar: one or more digits, a dot, one or more digits; anything after
/// (patch level, release tags) is ignored. Pairs whose numbers do not fit
/// are skipped in favour of a later pair.
///
/// ```
/// # use swiftshot_setup::runtime::{parse_version, RuntimeVersion};
/// assert_eq!(parse_version("Python 3.12.1"), Some(RuntimeVersion::new(3, 12)));
/// assert_eq!(parse_version("command not found"), None);
/// ```
pub fn parse_version(text: &str) -> Option<RuntimeVersion> {
    let pattern = VERSION_PATTERN.as_ref()?;

    pattern.captures_iter(text).find_map(|captures| {
        let major = captures.get(1)?.as_str().parse().ok()?;
        let minor = captures.get(2)?.as_str().parse().ok()?;
        Some(RuntimeVersion::new(major, minor))
    })
}

/// A way to start a runtime, tried by the locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCandidate {
    program: OsString,
    leading_args: Vec<OsString>,
}

impl RuntimeCandidate {
    /// A bare command name resolved through the search path.
    pub fn command<S: AsRef<OsStr>>(name: S) -> Self {
        Self {
            program: name.as_ref().to_os_string(),
            leading_args: Vec::new(),
        }
    }

    /// An absolute path to an executable.
    pub fn path<P: AsRef<Path>>(path: P) -> Self {
        Self::command(path.as_ref().as_os_str())
    }

    /// A version-selecting launcher such as `py -3`.
    pub fn launcher<S: AsRef<OsStr>>(name: S, selector: S) -> Self {
        Self {
            program: name.as_ref().to_os_string(),
            leading_args: vec![selector.as_ref().to_os_string()],
        }
    }

    fn tool_command(&self) -> ToolCommand {
        ToolCommand::new(&self.program).args(&self.leading_args)
    }
}

impl Display for RuntimeCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tool_command())
    }
}

/// A runtime that met the minimum version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePath {
    candidate: RuntimeCandidate,
    version: RuntimeVersion,
}

impl RuntimePath {
    /// Returns the version the runtime reported.
    pub fn version(&self) -> RuntimeVersion {
        self.version
    }

    /// Returns the program name or path.
    pub fn program(&self) -> &OsStr {
        &self.candidate.program
    }

    /// Returns a command starting the runtime, ready for more arguments.
    pub fn command(&self) -> ToolCommand {
        self.candidate.tool_command()
    }
}

impl Display for RuntimePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.candidate, self.version)
    }
}

/// Finds a runtime from an ordered candidate list.
#[derive(Debug, Clone, Default)]
pub struct RuntimeLocator {
    candidates: Vec<RuntimeCandidate>,
}

impl RuntimeLocator {
    /// Creates a locator trying the given candidates in order.
    pub fn new(candidates: Vec<RuntimeCandidate>) -> Self {
        Self { candidates }
    }

    /// Creates a locator with the platform's well-known candidates.
    pub fn system() -> Self {
        let env_map = std::env::vars_os().collect::<HashMap<_, _>>();
        Self::new(default_candidates(&env_map))
    }

    /// Returns the candidates in the order they are tried.
    pub fn candidates(&self) -> &[RuntimeCandidate] {
        &self.candidates
    }

    /// Returns the first candidate reporting a version of at least `min`.
    ///
    /// Candidates that cannot be started, fail, or print no version are
    /// skipped.
    pub fn locate(&self, runner: &mut dyn ToolRunner, min: RuntimeVersion) -> Option<RuntimePath> {
        for candidate in &self.candidates {
            let span = tracing::debug_span!("runtime candidate", %candidate);
            let _guard = span.enter();

            let output = match runner.run(&candidate.tool_command().arg("--version")) {
                Ok(output) => output,
                Err(error) => {
                    tracing::debug!(%error, "candidate could not be started");
                    continue;
                }
            };

            if !output.is_success() {
                tracing::debug!(outcome = ?output.outcome, "candidate unavailable");
                continue;
            }

            // Python 2 prints its version on stderr.
            let version = parse_version(&output.stdout).or_else(|| parse_version(&output.stderr));

            match version {
                Some(version) if version >= min => {
                    tracing::info!(%candidate, %version, "found runtime");
                    return Some(RuntimePath {
                        candidate: candidate.clone(),
                        version,
                    });
                }
                Some(version) => {
                    tracing::debug!(%version, %min, "candidate too old");
                }
                None => {
                    tracing::debug!(output = %output.combined(), "no version in output");
                }
            }
        }

        None
    }
}

/// Installs a runtime through an OS package manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManager {
    command: ToolCommand,
}

impl PackageManager {
    /// Package manager invoking `winget` silently for the given package ID.
    pub fn winget(package_id: &str) -> Self {
        let command = ToolCommand::new("winget")
            .args(["install", "--exact", "--id", package_id])
            .args([
                "--silent",
                "--accept-package-agreements",
                "--accept-source-agreements",
            ])
            .timeout(INSTALL_TIMEOUT);

        Self { command }
    }

    /// Package manager running an arbitrary install command.
    pub fn custom(command: ToolCommand) -> Self {
        Self { command }
    }

    /// Returns the install command.
    pub fn command(&self) -> &ToolCommand {
        &self.command
    }
}

/// Locates a runtime, installing one through the package manager if needed.
///
/// After a successful package install, the search path is refreshed and the
/// locator runs exactly once more.
pub fn ensure_runtime(
    locator: &RuntimeLocator,
    package_manager: &PackageManager,
    runner: &mut dyn ToolRunner,
    min: RuntimeVersion,
) -> Result<RuntimePath, ProvisionError> {
    if let Some(runtime) = locator.locate(runner, min) {
        return Ok(runtime);
    }

    tracing::info!(%min, command = %package_manager.command, "no suitable runtime, installing one");

    let output = runner.run(&package_manager.command)?;

    match output.outcome {
        ToolOutcome::Success => {}
        ToolOutcome::NotFound => {
            let program = package_manager.command.program().to_string_lossy();
            return Err(
                ProvisionError::new(ProvisionErrorKind::PackageManagerUnavailable)
                    .with_context(format!("{program} is not installed")),
            );
        }
        ToolOutcome::ExitCode(_) | ToolOutcome::TimedOut => {
            return Err(ProvisionError::new(ProvisionErrorKind::RuntimeInstallFailed)
                .with_source(output.failure_message()));
        }
    }

    runner.refresh_search_path();

    locator.locate(runner, min).ok_or_else(|| {
        ProvisionError::new(ProvisionErrorKind::RuntimeNotFound)
            .with_context(format!("runtime {min} or newer still missing after install"))
    })
}

/// Returns `(number, path)` pairs for entries of `parent` named `prefix`
/// followed only by digits, newest (largest number) first.
///
/// `Python312` with prefix `Python3` yields 12; `python3.11` with prefix
/// `python3.` yields 11.
pub fn expand_versioned(parent: &Path, prefix: &str) -> Vec<(u32, PathBuf)> {
    let Ok(entries) = std::fs::read_dir(parent) else {
        return Vec::new();
    };

    let mut found = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            let rest = name.strip_prefix(prefix)?;

            if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }

            Some((rest.parse::<u32>().ok()?, entry.path()))
        })
        .collect::<Vec<_>>();

    found.sort_by(|a, b| b.0.cmp(&a.0));
    found
}

/// Returns the platform's candidate list, given the environment variables.
pub fn default_candidates(env_map: &HashMap<OsString, OsString>) -> Vec<RuntimeCandidate> {
    let mut candidates = Vec::new();

    #[cfg(windows)]
    {
        candidates.push(RuntimeCandidate::command("python"));
        candidates.push(RuntimeCandidate::command("python3"));

        let mut roots = Vec::new();
        if let Some(dir) = env_map.get(OsStr::new("LOCALAPPDATA")) {
            roots.push(Path::new(dir).join(r"Programs\Python"));
        }
        if let Some(dir) = env_map.get(OsStr::new("ProgramFiles")) {
            roots.push(PathBuf::from(dir));
        }
        roots.push(PathBuf::from(r"C:\"));

        for root in roots {
            for (_, dir) in expand_versioned(&root, "Python3") {
                let exe = dir.join("python.exe");
                if exe.is_file() {
                    candidates.push(RuntimeCandidate::path(exe));
                }
            }
        }

        candidates.push(RuntimeCandidate::launcher("py", "-3"));
    }

    #[cfg(not(windows))]
    {
        let _ = env_map;
        candidates.push(RuntimeCandidate::command("python3"));
        candidates.push(RuntimeCandidate::command("python"));

        for root in ["/usr/local/bin", "/usr/bin"] {
            for (_, path) in expand_versioned(Path::new(root), "python3.") {
                candidates.push(RuntimeCandidate::path(path));
            }
        }
    }

    candidates
}

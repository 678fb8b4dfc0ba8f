//! Idempotent provisioning for the SwiftShot screenshot utility.
//!
//! This crate prepares a Python runtime and an isolated environment for the
//! app, writes its launchers and icon, and wires up shell shortcuts. It can
//! be re-run safely: each stage reuses what is valid and repairs what is not.
//!
//! ## Example
//!
//! ```no_run
//! # use swiftshot_setup::{app::AppProfile, inst::InstallConfig, Mode, Toolbox};
//! let profile = AppProfile::swiftshot();
//! let mode = Mode::Install(InstallConfig::new("C:\\Apps\\SwiftShot"));
//! let mut toolbox = Toolbox::native();
//!
//! let outcome = swiftshot_setup::run(&profile, &mode, &mut toolbox);
//! std::process::exit(swiftshot_setup::exit_code(&outcome));
//! ```
//!
//! ## Provisioning principles
//!
//! ### States
//!
//! After any uninterrupted run, the machine is either without any artifact
//! of the app or fully installed. An interrupted install leaves an
//! environment without its runtime copy; the next install deletes and
//! recreates it.
//!
//! ### Ownership
//!
//! Every artifact is created by install, overwritten rather than patched,
//! and deleted only by the matching uninstall step. Uninstall removes the
//! paths derived from the current defaults plus those recorded in the
//! install receipt. The app's own files in the install directory, such as
//! the entry script, are never touched.
//!
//! ### External tools
//!
//! The runtime, package manager, environment tool and shell are only reached
//! through the [`process::ToolRunner`] and [`shortcut::ShortcutFacility`]
//! seams, so every stage can be exercised without them.
use std::{collections::HashMap, ffi::OsString, io::Write};

use app::AppProfile;
use error::ProvisionError;
use inst::{InstallConfig, InstallSummary, Installer};
use os::ShellFolders;
use process::{SystemRunner, ToolRunner};
use prompt::LaunchPrompt;
use runtime::{PackageManager, RuntimeLocator};
use shortcut::ShortcutFacility;
use uninst::{UninstallConfig, UninstallReport, Uninstaller};

pub mod app;
pub mod env;
pub mod error;
pub mod icon;
pub mod inst;
pub mod launcher;
pub mod os;
pub mod process;
pub mod prompt;
pub mod receipt;
pub mod runtime;
pub mod shortcut;
#[cfg(feature = "ui")]
pub mod tui;
pub mod uninst;

/// Exit code of a successful run, including every uninstall.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code when an install stage failed.
pub const EXIT_FATAL: i32 = 1;

/// What to do.
#[derive(Debug, Clone)]
pub enum Mode {
    /// Install or repair.
    Install(InstallConfig),
    /// Remove every artifact.
    Uninstall(UninstallConfig),
}

/// Result of a successful [`run()`].
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The install finished.
    Installed {
        /// What was done.
        summary: InstallSummary,
        /// Whether the app was started afterwards.
        launched: bool,
    },
    /// The uninstall finished.
    Uninstalled(UninstallReport),
}

/// The collaborators a run talks to.
///
/// [`Toolbox::native()`] uses real processes and shell folders; tests swap
/// in fakes.
pub struct Toolbox {
    /// Runs external programs.
    pub runner: Box<dyn ToolRunner>,
    /// Persists shortcuts.
    pub shortcuts: Box<dyn ShortcutFacility>,
    /// Asks whether to launch the app after install.
    pub prompt: Box<dyn LaunchPrompt>,
    /// Shell folders. When `None`, they are resolved from [`Self::env_vars`].
    pub folders: Option<ShellFolders>,
    /// Environment variables used to resolve shell folders. When `None`,
    /// the process environment is read.
    pub env_vars: Option<HashMap<OsString, OsString>>,
    /// Runtime candidates.
    pub locator: RuntimeLocator,
    /// Package manager used when no runtime is found.
    ///
    /// When `None`, `winget` installs the profile's runtime package.
    pub package_manager: Option<PackageManager>,
    /// Layout of environments.
    pub layout: env::EnvLayout,
    /// Where summaries are printed.
    pub console: Box<dyn Write>,
}

impl Toolbox {
    /// Returns the toolbox for this machine.
    pub fn native() -> Self {
        Self {
            runner: Box::new(SystemRunner::new()),
            shortcuts: shortcut::native_facility(),
            prompt: prompt::interactive(),
            folders: None,
            env_vars: None,
            locator: RuntimeLocator::system(),
            package_manager: None,
            layout: env::EnvLayout::native(),
            console: Box::new(std::io::stdout()),
        }
    }

    /// Returns the injected shell folders or resolves them from the environment.
    pub fn shell_folders(&self) -> Result<ShellFolders, ProvisionError> {
        match (&self.folders, &self.env_vars) {
            (Some(folders), _) => Ok(folders.clone()),
            (None, Some(env_vars)) => ShellFolders::from_env_map(env_vars),
            (None, None) => ShellFolders::from_env(),
        }
    }

    fn print<D: std::fmt::Display>(&mut self, message: D) {
        if let Err(error) = writeln!(self.console, "{message}") {
            tracing::warn!(%error, "could not print to console");
        }
    }
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbox")
            .field("folders", &self.folders)
            .field("locator", &self.locator)
            .field("package_manager", &self.package_manager)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

/// Runs an install or uninstall.
///
/// After an install the summary is printed and, unless the config is
/// quiet, the operator is asked whether to start the app. Uninstall never
/// fails.
pub fn run(
    profile: &AppProfile,
    mode: &Mode,
    toolbox: &mut Toolbox,
) -> Result<RunOutcome, ProvisionError> {
    match mode {
        Mode::Install(config) => {
            let summary = Installer::new(profile, toolbox).run(config)?;
            toolbox.print(&summary);

            let launched = if config.quiet {
                false
            } else {
                Installer::new(profile, toolbox).offer_launch(&summary)
            };

            Ok(RunOutcome::Installed { summary, launched })
        }
        Mode::Uninstall(config) => {
            let report = Uninstaller::new(profile, toolbox).run(config);
            toolbox.print(&report);

            Ok(RunOutcome::Uninstalled(report))
        }
    }
}

/// Returns the process exit code for a run result.
pub fn exit_code(result: &Result<RunOutcome, ProvisionError>) -> i32 {
    match result {
        Ok(_) => EXIT_SUCCESS,
        Err(_) => EXIT_FATAL,
    }
}

/// Installs with the native toolbox.
pub fn install(profile: &AppProfile, config: &InstallConfig) -> Result<RunOutcome, ProvisionError> {
    run(profile, &Mode::Install(config.clone()), &mut Toolbox::native())
}

/// Uninstalls with the native toolbox.
pub fn uninstall(profile: &AppProfile, config: &UninstallConfig) -> UninstallReport {
    let mut toolbox = Toolbox::native();
    Uninstaller::new(profile, &mut toolbox).run(config)
}

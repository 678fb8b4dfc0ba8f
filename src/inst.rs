//! Installer functionality.
//!
//! An install runs these stages in order, each feeding the next:
//!
//! 1. locate (or provision) a runtime
//! 2. create or repair the environment and install the packages
//! 3. generate the icon if absent
//! 4. write the launchers
//! 5. create the shortcuts and the uninstall entry
//!
//! The receipt is written last. The first fatal error stops the run; nothing
//! already done is rolled back, since the next run repairs or reuses it.
use std::{fmt::Display, path::PathBuf};

use crate::{
    app::AppProfile,
    env::{ensure_environment, EnvironmentReport},
    error::{format_error, AddProvisionContext, ProvisionError},
    icon::{ensure_icon, IconStatus},
    launcher::{write_launchers, LauncherPair, LauncherReport},
    receipt::InstallReceipt,
    runtime::{ensure_runtime, PackageManager, RuntimePath},
    shortcut::{ShortcutLocations, ShortcutManager, ShortcutTargets},
    Toolbox,
};

pub use self::config::*;

mod config;

/// What an install run did.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct InstallSummary {
    /// Display name of the app.
    pub app_name: String,
    /// Runtime used to create the environment.
    pub runtime: RuntimePath,
    /// Environment outcome.
    pub environment: EnvironmentReport,
    /// Icon location.
    pub icon: PathBuf,
    /// Icon outcome.
    pub icon_status: IconStatus,
    /// Launchers written.
    pub launchers: LauncherReport,
    /// Shortcuts created.
    pub shortcuts: Vec<PathBuf>,
    /// Number of shortcuts attempted.
    pub shortcuts_requested: usize,
    /// Whether the OS uninstall entry was registered.
    pub uninstall_entry: bool,
    /// Receipt location.
    pub receipt: PathBuf,
}

impl Display for InstallSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} installed.", self.app_name)?;
        writeln!(f, "  Runtime:     {}", self.runtime)?;
        writeln!(
            f,
            "  Environment: {} ({:?}, {} package(s) installed)",
            self.environment.root.display(),
            self.environment.disposition,
            self.environment.installed.len()
        )?;
        writeln!(
            f,
            "  Launchers:   {}, {}",
            self.launchers.launchers.visible.display(),
            self.launchers.launchers.silent.display()
        )?;
        writeln!(f, "  Icon:        {} ({:?})", self.icon.display(), self.icon_status)?;
        write!(
            f,
            "  Shortcuts:   {} of {} created",
            self.shortcuts.len(),
            self.shortcuts_requested
        )?;

        for path in &self.shortcuts {
            write!(f, "\n    {}", path.display())?;
        }

        Ok(())
    }
}

/// The installer interface.
pub struct Installer<'a> {
    profile: AppProfile,
    toolbox: &'a mut Toolbox,
}

impl<'a> Installer<'a> {
    /// Creates a new installer for the given app.
    pub fn new(profile: &AppProfile, toolbox: &'a mut Toolbox) -> Self {
        Self {
            profile: profile.clone(),
            toolbox,
        }
    }

    /// Installs automatically.
    pub fn run(&mut self, config: &InstallConfig) -> Result<InstallSummary, ProvisionError> {
        tracing::info!(app = %self.profile.display_name, install_dir = ?config.install_dir, "install started");
        tracing::debug!(profile = ?self.profile, ?config, "install parameters");

        let runtime = self.locate_runtime().prov_context("runtime stage")?;
        let env_root = config.env_root();
        let environment = ensure_environment(
            &mut *self.toolbox.runner,
            &self.toolbox.layout,
            &runtime,
            &env_root,
            &self.profile.packages,
        )
        .prov_context("environment stage")?;

        let icon = config.install_dir.join(self.profile.icon_file_name());
        let icon_status = ensure_icon(&icon);

        let launchers = LauncherPair::for_app(&config.install_dir, &self.profile);
        let launchers = write_launchers(
            &launchers,
            &self.toolbox.layout,
            &env_root,
            &config.install_dir,
            &self.profile.entry_script,
        )
        .prov_context("launcher stage")?;

        let mut receipt = InstallReceipt::new(
            self.profile.app_id.clone(),
            &self.profile.display_version,
            &config.install_dir,
            &env_root,
            launchers.launchers.clone(),
        );
        receipt.icon = icon_status.is_available().then(|| icon.clone());
        receipt.add_to_startup = config.add_to_startup;

        let mut shortcuts = Vec::new();
        let mut shortcuts_requested = 0;

        if config.create_shortcuts {
            match self.shortcut_locations().and_then(|locations| {
                config.resolve_tool_path().map(|tool| (locations, tool))
            }) {
                Ok((locations, tool)) => {
                    let targets = ShortcutTargets {
                        name: &self.profile.display_name,
                        description: &self.profile.description,
                        launchers: &launchers.launchers,
                        icon: &icon,
                        install_dir: &config.install_dir,
                        tool: &tool,
                    };

                    shortcuts_requested = if config.add_to_startup { 4 } else { 3 };
                    receipt.start_menu_dir = locations.start_menu_dir.clone();

                    let mut manager =
                        ShortcutManager::new(&mut *self.toolbox.shortcuts, locations);
                    shortcuts = manager.create_all(&targets, config.add_to_startup);

                    if shortcuts.len() < shortcuts_requested {
                        tracing::warn!(
                            created = shortcuts.len(),
                            requested = shortcuts_requested,
                            "some shortcuts could not be created"
                        );
                    }
                }
                Err(error) => {
                    tracing::warn!(error = %format_error(&error), "skipping shortcuts");
                }
            }
        } else {
            tracing::info!("skipping shortcuts");
            self.remove_stale_shortcuts();
        }

        receipt.shortcuts = shortcuts.clone();
        receipt.uninstall_entry = self.register_uninstall_entry(config, &icon, icon_status);

        receipt.save().prov_context("failed to save install receipt")?;

        tracing::info!(app = %self.profile.display_name, "install finished");

        Ok(InstallSummary {
            app_name: self.profile.display_name.clone(),
            runtime,
            environment,
            icon,
            icon_status,
            launchers,
            shortcuts,
            shortcuts_requested,
            uninstall_entry: receipt.uninstall_entry,
            receipt: receipt.receipt_path,
        })
    }

    /// Asks whether to start the app and starts it through the silent
    /// launcher, detached.
    ///
    /// Returns whether the app was started. Prompt and spawn failures are
    /// logged as warnings.
    pub fn offer_launch(&mut self, summary: &InstallSummary) -> bool {
        let answer = match self.toolbox.prompt.confirm_launch(&self.profile.display_name) {
            Ok(answer) => answer,
            Err(error) => {
                tracing::warn!(%error, "launch prompt failed");
                return false;
            }
        };

        if !answer {
            return false;
        }

        let command = summary.launchers.launchers.silent_command();
        tracing::info!(%command, "launching app");

        match self.toolbox.runner.spawn_detached(&command) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "could not launch app");
                false
            }
        }
    }

    fn locate_runtime(&mut self) -> Result<RuntimePath, ProvisionError> {
        let package_manager = self
            .toolbox
            .package_manager
            .clone()
            .unwrap_or_else(|| PackageManager::winget(&self.profile.runtime_package_id));

        ensure_runtime(
            &self.toolbox.locator,
            &package_manager,
            &mut *self.toolbox.runner,
            self.profile.min_runtime,
        )
    }

    /// Removes shortcuts an earlier install created when none are requested now.
    fn remove_stale_shortcuts(&mut self) {
        match self.shortcut_locations() {
            Ok(locations) => {
                let manager = ShortcutManager::new(&mut *self.toolbox.shortcuts, locations);
                let removed = manager.remove_all();

                if !removed.is_empty() {
                    tracing::info!(count = removed.len(), "removed shortcuts no longer requested");
                }
            }
            Err(error) => {
                tracing::debug!(error = %format_error(&error), "no shell folders to clean");
            }
        }
    }

    fn shortcut_locations(&self) -> Result<ShortcutLocations, ProvisionError> {
        let folders = self.toolbox.shell_folders()?;

        Ok(ShortcutLocations::resolve(&folders, &self.profile))
    }

    #[cfg(windows)]
    fn register_uninstall_entry(
        &self,
        config: &InstallConfig,
        icon: &std::path::Path,
        icon_status: IconStatus,
    ) -> bool {
        use crate::os::windows::{add_uninstall_entry, UninstallEntryConfig};

        if !config.register_uninstall_entry {
            return false;
        }

        let tool = match config.resolve_tool_path() {
            Ok(tool) => tool,
            Err(error) => {
                tracing::warn!(%error, "could not register uninstall entry");
                return false;
            }
        };

        let entry = UninstallEntryConfig {
            display_name: self.profile.display_name.clone(),
            display_version: self.profile.display_version.clone(),
            publisher: self.profile.publisher.clone(),
            install_location: config.install_dir.clone().into_os_string(),
            display_icon: icon_status
                .is_available()
                .then(|| icon.as_os_str().to_os_string()),
        };
        let args = format!(
            "--uninstall --install-dir {}",
            crate::shortcut::quote_argument(&config.install_dir)
        );

        match add_uninstall_entry(
            &self.profile.app_id,
            tool.as_os_str(),
            std::ffi::OsStr::new(&args),
            &entry,
        ) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "could not register uninstall entry");
                false
            }
        }
    }

    #[cfg(not(windows))]
    fn register_uninstall_entry(
        &self,
        config: &InstallConfig,
        _icon: &std::path::Path,
        _icon_status: IconStatus,
    ) -> bool {
        if config.register_uninstall_entry {
            tracing::debug!("no OS uninstall list on this platform");
        }

        false
    }
}

impl std::fmt::Debug for Installer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

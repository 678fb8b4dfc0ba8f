//! Uninstaller functionality.
//!
//! Uninstall has no fatal path. Every step removes what exists, treats
//! absence as done, and logs other errors as warnings before moving on.
use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use crate::{
    app::AppProfile,
    os::ShellFolders,
    error::format_error,
    inst::DEFAULT_ENV_DIR_NAME,
    launcher::LauncherPair,
    receipt::InstallReceipt,
    shortcut::{remove_shortcuts, ShortcutLocations},
    Toolbox,
};

/// Parameters that control an uninstall run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct UninstallConfig {
    /// Install root to clean.
    pub install_dir: PathBuf,
    /// Name of the environment directory inside the install root.
    pub env_dir_name: String,
    /// Whether to remove the OS uninstall entry.
    ///
    /// Only has an effect on Windows.
    pub remove_uninstall_entry: bool,
}

impl UninstallConfig {
    /// Creates a config for the given install root.
    pub fn new<P: AsRef<Path>>(install_dir: P) -> Self {
        Self {
            install_dir: install_dir.as_ref().to_path_buf(),
            env_dir_name: DEFAULT_ENV_DIR_NAME.to_string(),
            remove_uninstall_entry: cfg!(windows),
        }
    }

    /// Returns the environment root.
    pub fn env_root(&self) -> PathBuf {
        self.install_dir.join(&self.env_dir_name)
    }
}

/// What an uninstall run removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct UninstallReport {
    /// Files and directories removed.
    pub removed: Vec<PathBuf>,
    /// Whether the OS uninstall entry was removed.
    pub uninstall_entry_removed: bool,
    /// Number of steps that logged a warning.
    pub warnings: usize,
}

impl Display for UninstallReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Removed {} item(s)", self.removed.len())?;

        if self.warnings > 0 {
            write!(f, " with {} warning(s); see the log", self.warnings)?;
        }

        for path in &self.removed {
            write!(f, "\n  {}", path.display())?;
        }

        Ok(())
    }
}

/// The uninstaller interface.
pub struct Uninstaller<'a> {
    profile: AppProfile,
    toolbox: &'a mut Toolbox,
    report: UninstallReport,
}

impl<'a> Uninstaller<'a> {
    /// Creates a new uninstaller for the given app.
    pub fn new(profile: &AppProfile, toolbox: &'a mut Toolbox) -> Self {
        Self {
            profile: profile.clone(),
            toolbox,
            report: UninstallReport::default(),
        }
    }

    /// Removes shortcuts, the uninstall entry, launchers, icon, environment
    /// and receipt, in that order.
    ///
    /// Paths read from the receipt are only removed when they lie below the
    /// install root or, for shortcuts, below a shell folder.
    pub fn run(&mut self, config: &UninstallConfig) -> UninstallReport {
        tracing::info!(app = %self.profile.display_name, install_dir = ?config.install_dir, "uninstall started");

        self.report = UninstallReport::default();
        let receipt = self.load_receipt(config);
        let folders = self.shell_folders();

        self.remove_shortcuts(folders.as_ref(), receipt.as_ref());
        self.remove_uninstall_entry(config);
        self.remove_launchers(config, receipt.as_ref());
        self.remove_icon(config, receipt.as_ref());
        self.remove_environment(config, receipt.as_ref());
        self.remove_file(&InstallReceipt::path_in(&config.install_dir), "receipt");

        tracing::info!(
            removed = self.report.removed.len(),
            warnings = self.report.warnings,
            "uninstall finished"
        );

        std::mem::take(&mut self.report)
    }

    fn load_receipt(&mut self, config: &UninstallConfig) -> Option<InstallReceipt> {
        let path = InstallReceipt::path_in(&config.install_dir);

        if !path.is_file() {
            tracing::debug!(?path, "no receipt, using default locations");
            return None;
        }

        match InstallReceipt::load(&path) {
            Ok(receipt) => Some(receipt),
            Err(error) => {
                tracing::warn!(?path, error = %format_error(&error), "ignoring unreadable receipt");
                self.report.warnings += 1;
                None
            }
        }
    }

    fn shell_folders(&mut self) -> Option<ShellFolders> {
        match self.toolbox.shell_folders() {
            Ok(folders) => Some(folders),
            Err(error) => {
                tracing::warn!(%error, "could not resolve shell folders");
                self.report.warnings += 1;
                None
            }
        }
    }

    /// Returns whether a path taken from the receipt lies below one of `roots`.
    fn is_owned(&mut self, path: &Path, roots: &[&Path]) -> bool {
        if roots.iter().any(|root| crate::os::is_below(path, root)) {
            true
        } else {
            tracing::warn!(?path, "not removing recorded path outside the install locations");
            self.report.warnings += 1;
            false
        }
    }

    fn remove_shortcuts(&mut self, folders: Option<&ShellFolders>, receipt: Option<&InstallReceipt>) {
        let mut paths = Vec::<PathBuf>::new();
        let mut start_menu_dir = None;
        let mut roots = Vec::new();

        if let Some(folders) = folders {
            let locations = ShortcutLocations::resolve(folders, &self.profile);
            paths.extend(locations.all().iter().map(|path| path.to_path_buf()));
            start_menu_dir = locations.start_menu_dir;
            roots = vec![
                folders.desktop.clone(),
                folders.programs.clone(),
                folders.startup.clone(),
            ];
        }

        if let Some(receipt) = receipt {
            let roots = roots.iter().map(PathBuf::as_path).collect::<Vec<_>>();

            for path in &receipt.shortcuts {
                if !paths.contains(path) && self.is_owned(path, &roots) {
                    paths.push(path.clone());
                }
            }
            if start_menu_dir.is_none() {
                if let Some(dir) = &receipt.start_menu_dir {
                    if self.is_owned(dir, &roots) {
                        start_menu_dir = Some(dir.clone());
                    }
                }
            }
        }

        let removed = remove_shortcuts(paths.iter().map(PathBuf::as_path), start_menu_dir.as_deref());
        self.report.removed.extend(removed);
    }

    #[cfg(windows)]
    fn remove_uninstall_entry(&mut self, config: &UninstallConfig) {
        if !config.remove_uninstall_entry {
            return;
        }

        match crate::os::windows::remove_uninstall_entry(&self.profile.app_id) {
            Ok(removed) => self.report.uninstall_entry_removed = removed,
            Err(error) => {
                tracing::warn!(%error, "could not remove uninstall entry");
                self.report.warnings += 1;
            }
        }
    }

    #[cfg(not(windows))]
    fn remove_uninstall_entry(&mut self, _config: &UninstallConfig) {}

    fn remove_launchers(&mut self, config: &UninstallConfig, receipt: Option<&InstallReceipt>) {
        let defaults = LauncherPair::for_app(&config.install_dir, &self.profile);
        let mut paths = vec![defaults.visible, defaults.silent];

        if let Some(receipt) = receipt {
            for path in [&receipt.launchers.visible, &receipt.launchers.silent] {
                if !paths.contains(path) && self.is_owned(path, &[config.install_dir.as_path()]) {
                    paths.push(path.clone());
                }
            }
        }

        for path in paths {
            self.remove_file(&path, "launcher");
        }
    }

    fn remove_icon(&mut self, config: &UninstallConfig, receipt: Option<&InstallReceipt>) {
        let default = config.install_dir.join(self.profile.icon_file_name());
        self.remove_file(&default, "icon");

        if let Some(icon) = receipt.and_then(|receipt| receipt.icon.as_ref()) {
            if icon != &default && self.is_owned(icon, &[config.install_dir.as_path()]) {
                self.remove_file(icon, "icon");
            }
        }
    }

    fn remove_environment(&mut self, config: &UninstallConfig, receipt: Option<&InstallReceipt>) {
        let default = config.env_root();
        self.remove_tree(&default);

        if let Some(env_root) = receipt.map(|receipt| &receipt.env_root) {
            if env_root != &default && self.is_owned(env_root, &[config.install_dir.as_path()]) {
                self.remove_tree(env_root);
            }
        }
    }

    fn remove_file(&mut self, path: &Path, label: &str) {
        match crate::os::remove_file_if_exists(path) {
            Ok(true) => {
                tracing::info!(?path, label, "removed");
                self.report.removed.push(path.to_path_buf());
            }
            Ok(false) => tracing::debug!(?path, label, "already absent"),
            Err(error) => {
                tracing::warn!(?path, label, %error, "could not remove");
                self.report.warnings += 1;
            }
        }
    }

    fn remove_tree(&mut self, path: &Path) {
        match crate::os::remove_dir_all_if_exists(path) {
            Ok(true) => {
                tracing::info!(?path, "removed environment");
                self.report.removed.push(path.to_path_buf());
            }
            Ok(false) => tracing::debug!(?path, "environment already absent"),
            Err(error) => {
                tracing::warn!(?path, %error, "could not remove environment");
                self.report.warnings += 1;
            }
        }
    }
}

impl std::fmt::Debug for Uninstaller<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uninstaller")
            .field("profile", &self.profile)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

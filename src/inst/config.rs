use std::path::{Path, PathBuf};

use crate::error::ProvisionError;

/// Default name of the environment directory inside the install root.
pub const DEFAULT_ENV_DIR_NAME: &str = "venv";

/// Parameters that control an install run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct InstallConfig {
    /// Install root holding the entry script, environment, launchers and icon.
    pub install_dir: PathBuf,
    /// Name of the environment directory inside the install root.
    pub env_dir_name: String,
    /// Whether to create the desktop, start menu and uninstall shortcuts.
    pub create_shortcuts: bool,
    /// Whether to also create the startup shortcut.
    pub add_to_startup: bool,
    /// Whether to skip the launch prompt.
    pub quiet: bool,
    /// Whether to register the OS uninstall entry.
    ///
    /// Only has an effect on Windows.
    pub register_uninstall_entry: bool,
    /// Path of this tool, used by the uninstall shortcut and entry.
    ///
    /// When `None`, the current executable is used.
    pub tool_path: Option<PathBuf>,
}

impl InstallConfig {
    /// Creates a config installing into the given directory with shortcuts.
    pub fn new<P: AsRef<Path>>(install_dir: P) -> Self {
        Self {
            install_dir: install_dir.as_ref().to_path_buf(),
            env_dir_name: DEFAULT_ENV_DIR_NAME.to_string(),
            create_shortcuts: true,
            add_to_startup: false,
            quiet: false,
            register_uninstall_entry: cfg!(windows),
            tool_path: None,
        }
    }

    /// Creates a config installing into the directory of the current executable.
    pub fn beside_exe() -> Result<Self, ProvisionError> {
        Ok(Self::new(crate::os::current_exe_dir()?))
    }

    /// Returns the environment root.
    pub fn env_root(&self) -> PathBuf {
        self.install_dir.join(&self.env_dir_name)
    }

    /// Returns the tool path, falling back to the current executable.
    pub fn resolve_tool_path(&self) -> Result<PathBuf, ProvisionError> {
        match &self.tool_path {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_exe()?),
        }
    }
}

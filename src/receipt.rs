//! Record of an install.
//!
//! The receipt is written last by a successful install and read by uninstall,
//! which removes the union of the recorded paths and the paths derived from
//! the current defaults.
use std::{
    io::{Cursor, Read, Write},
    path::{Path, PathBuf},
};

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};

use crate::{
    app::AppId,
    error::{AddContext, ProvisionError, ProvisionErrorKind},
    launcher::LauncherPair,
};

/// File name of the receipt inside the install directory.
pub const RECEIPT_FILE_NAME: &str = "swiftshot-install.ron";

/// Details about an install and the artifacts it created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct InstallReceipt {
    #[serde(skip)]
    /// Path of the receipt on disk.
    pub receipt_path: PathBuf,
    /// Reserved.
    pub receipt_version: u64,
    /// Application ID.
    pub app_id: AppId,
    /// Application version at install time.
    pub app_version: String,
    /// Install root.
    pub install_dir: PathBuf,
    /// Environment root.
    pub env_root: PathBuf,
    /// Launchers written.
    pub launchers: LauncherPair,
    /// Icon file, if one was generated or already present.
    pub icon: Option<PathBuf>,
    /// Shortcut files created.
    pub shortcuts: Vec<PathBuf>,
    /// App folder in the start menu, if any.
    pub start_menu_dir: Option<PathBuf>,
    /// Whether a startup shortcut was requested.
    pub add_to_startup: bool,
    /// Whether the OS uninstall entry was registered.
    pub uninstall_entry: bool,
}

impl InstallReceipt {
    /// Creates a receipt with no artifacts besides the environment and launchers.
    pub fn new(
        app_id: AppId,
        app_version: &str,
        install_dir: &Path,
        env_root: &Path,
        launchers: LauncherPair,
    ) -> Self {
        Self {
            receipt_path: install_dir.join(RECEIPT_FILE_NAME),
            receipt_version: 1,
            app_id,
            app_version: app_version.to_string(),
            install_dir: install_dir.to_path_buf(),
            env_root: env_root.to_path_buf(),
            launchers,
            icon: None,
            shortcuts: Vec::new(),
            start_menu_dir: None,
            add_to_startup: false,
            uninstall_entry: false,
        }
    }

    /// Returns the receipt location for an install directory.
    pub fn path_in(install_dir: &Path) -> PathBuf {
        install_dir.join(RECEIPT_FILE_NAME)
    }

    /// Deserialize from the given path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProvisionError> {
        let path = path.as_ref();
        let buf =
            std::fs::read(path).with_contextc(|_error| format!("could not open file {path:?}"))?;
        let mut receipt = Self::from_reader(Cursor::new(buf))?;

        receipt.receipt_path = path.to_path_buf();

        Ok(receipt)
    }

    /// Deserialize from the given reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ProvisionError> {
        let receipt = ron::de::from_reader::<R, Self>(reader).map_err(|error| {
            ProvisionError::new(ProvisionErrorKind::MalformedReceipt).with_source(error)
        })?;

        Ok(receipt)
    }

    /// Serialize to [`Self::receipt_path`], replacing any previous receipt.
    pub fn save(&self) -> Result<(), ProvisionError> {
        let mut buf = Vec::new();
        self.to_writer(&mut buf)?;

        tracing::debug!(path = ?self.receipt_path, "saving receipt");
        crate::os::write_file_atomic(&self.receipt_path, &buf, false)
    }

    /// Serialize to the given writer.
    pub fn to_writer<W: Write>(&self, output: W) -> Result<(), ProvisionError> {
        let options = ron::Options::default();
        options
            .to_io_writer_pretty(output, &self, PrettyConfig::default())
            .map_err(|error| ProvisionError::new(ProvisionErrorKind::Other).with_source(error))?;

        Ok(())
    }

    /// Returns every recorded file path, excluding the environment tree.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.shortcuts
            .iter()
            .map(PathBuf::as_path)
            .chain([self.launchers.visible.as_path(), self.launchers.silent.as_path()])
            .chain(self.icon.as_deref())
    }
}

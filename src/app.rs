//! Describing the application being provisioned.
//!
//! An [`AppProfile`] names the application, its entry script, the packages
//! its environment needs, and the minimum runtime version. The built-in
//! profile is [`AppProfile::swiftshot()`]; a different one can be loaded from
//! a RON file:
//!
//! ```ron
//! (
//!     app_id: "io.github.swiftshot",
//!     display_name: "SwiftShot",
//!     display_version: "2.0.0",
//!     publisher: "SwiftShot",
//!     description: "Screenshot and annotation tool",
//!     entry_script: "main.py",
//!     packages: [
//!         (name: "PyQt5>=5.15", import: "PyQt5.QtWidgets"),
//!         (name: "Pillow", import: "PIL"),
//!     ],
//!     min_runtime: (major: 3, minor: 8),
//!     runtime_package_id: "Python.Python.3.12",
//! )
//! ```
use std::{
    io::{Cursor, Read, Write},
    path::{Path, PathBuf},
};

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AddContext, ProvisionError, ProvisionErrorKind},
    runtime::RuntimeVersion,
};

/// Reexport from [`uuid`] crate:
pub use uuid::Uuid;

/// Default file name of a profile placed in the install directory.
pub const PROFILE_FILE_NAME: &str = "swiftshot-setup.ron";

/// Represents a unique ID for an application.
///
/// The namespaced format is based on the Java package naming convention
/// (for example, `io.github.swiftshot`). See [`validate_namespaced_id()`]
/// for the format rules.
///
/// The plain format is the last segment and is used for Unix file names.
/// The UUID format is derived from the namespaced ID and is used for the
/// Windows uninstall entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId {
    plain_id: String,
    namespaced_id: String,
    uuid: Uuid,
}

impl AppId {
    /// Creates a new struct with the given namespaced ID.
    pub fn new(namespaced_id: &str) -> Result<Self, AppIdError> {
        validate_namespaced_id(namespaced_id)?;

        let plain_id = namespaced_id
            .rsplit('.')
            .next()
            .unwrap_or(namespaced_id)
            .to_ascii_lowercase();

        Ok(Self {
            plain_id,
            namespaced_id: namespaced_id.to_string(),
            uuid: app_id_to_uuid(namespaced_id),
        })
    }

    /// Returns the plain ID.
    pub fn plain_id(&self) -> &str {
        &self.plain_id
    }

    /// Returns the namespaced ID.
    pub fn namespaced_id(&self) -> &str {
        &self.namespaced_id
    }

    /// Returns the UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl TryFrom<String> for AppId {
    type Error = AppIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<AppId> for String {
    fn from(value: AppId) -> Self {
        value.namespaced_id
    }
}

/// Returns whether the given namespaced ID is valid.
///
/// The format uses the rules:
///
/// * No longer than 100 characters in total
/// * Be at least 2 segments long
/// * Each segment must be 2 characters long
/// * Valid segment characters are letters, numbers, hyphen, and underscore
/// * A segment starts with a letter
///
pub fn validate_namespaced_id(value: &str) -> Result<(), AppIdError> {
    if value.len() > 100 {
        return Err(AppIdError::Length);
    }

    let segments = value.split('.').collect::<Vec<&str>>();

    if segments.len() < 2 {
        return Err(AppIdError::SegmentCount);
    }

    for segment in segments {
        if segment.len() < 2 {
            return Err(AppIdError::SegmentLength);
        }

        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppIdError::Character);
        }

        if !segment.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(AppIdError::FirstCharacter);
        }
    }

    Ok(())
}

const NAMESPACE: Uuid = uuid::uuid!("5b1f3c2e-8d4a-5e6f-9a7b-2c3d4e5f6a7b");

/// Returns a UUID derived from the given value.
///
/// IDs differing only in case or in hyphen/underscore map to the same UUID.
pub fn app_id_to_uuid(value: &str) -> Uuid {
    let normalized = value.replace('-', "_").to_ascii_lowercase();
    Uuid::new_v5(&NAMESPACE, normalized.as_bytes())
}

/// Error for ID validation.
#[derive(Debug, thiserror::Error)]
pub enum AppIdError {
    /// Invalid character within a segment.
    #[error("character")]
    Character,

    /// Invalid first character of a segment.
    #[error("first character")]
    FirstCharacter,

    /// Number of segments is invalid.
    #[error("segment count")]
    SegmentCount,

    /// Length of a segment is invalid.
    #[error("segment length")]
    SegmentLength,

    /// Total length of the ID is invalid.
    #[error("length")]
    Length,
}

/// A package installed into the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Requirement passed to the package installer, such as `PyQt5>=5.15`.
    pub name: String,
    /// Module imported to verify the package works, such as `PyQt5.QtWidgets`.
    #[serde(rename = "import")]
    pub import_name: String,
}

impl PackageSpec {
    /// Creates a package entry.
    pub fn new(name: &str, import_name: &str) -> Self {
        Self {
            name: name.to_string(),
            import_name: import_name.to_string(),
        }
    }
}

/// Static description of the application to provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppProfile {
    /// Application ID.
    pub app_id: AppId,
    /// Name shown to the user and used for Windows file names.
    pub display_name: String,
    /// Version shown to the user.
    pub display_version: String,
    /// Publisher shown in the OS uninstall list.
    #[serde(default)]
    pub publisher: String,
    /// Shortcut description.
    #[serde(default)]
    pub description: String,
    /// Entry script, relative to the install directory.
    pub entry_script: PathBuf,
    /// Packages installed one at a time, in order.
    pub packages: Vec<PackageSpec>,
    /// Minimum acceptable runtime version.
    pub min_runtime: RuntimeVersion,
    /// Package manager ID used when no runtime is found.
    pub runtime_package_id: String,
}

impl AppProfile {
    /// Returns the built-in SwiftShot profile.
    pub fn swiftshot() -> Self {
        Self {
            app_id: AppId {
                plain_id: "swiftshot".to_string(),
                namespaced_id: "io.github.swiftshot".to_string(),
                uuid: app_id_to_uuid("io.github.swiftshot"),
            },
            display_name: "SwiftShot".to_string(),
            display_version: "2.0.0".to_string(),
            publisher: "SwiftShot".to_string(),
            description: "Screenshot capture, annotation and OCR".to_string(),
            entry_script: PathBuf::from("main.py"),
            packages: vec![
                PackageSpec::new("PyQt5", "PyQt5.QtWidgets"),
                PackageSpec::new("Pillow", "PIL"),
            ],
            min_runtime: RuntimeVersion::new(3, 8),
            runtime_package_id: "Python.Python.3.12".to_string(),
        }
    }

    /// Returns the file name of the icon in the install directory.
    pub fn icon_file_name(&self) -> String {
        format!("{}.ico", self.app_id.plain_id())
    }

    /// Deserialize from the given path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProvisionError> {
        let path = path.as_ref();
        let buf =
            std::fs::read(path).with_contextc(|_error| format!("could not open file {path:?}"))?;

        Self::from_reader(Cursor::new(buf))
    }

    /// Deserialize from the given reader and validate.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ProvisionError> {
        let profile = ron::de::from_reader::<R, Self>(reader).map_err(|error| {
            ProvisionError::new(ProvisionErrorKind::InvalidProfile).with_source(error)
        })?;

        profile.validate()?;

        Ok(profile)
    }

    /// Serialize to the given writer.
    pub fn to_writer<W: Write>(&self, output: W) -> Result<(), ProvisionError> {
        let options = ron::Options::default();
        options
            .to_io_writer_pretty(output, &self, PrettyConfig::default())
            .map_err(|error| ProvisionError::new(ProvisionErrorKind::Other).with_source(error))?;

        Ok(())
    }

    /// Checks values that end up in file names and scripts.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let invalid = |message: &str| {
            Err(ProvisionError::new(ProvisionErrorKind::InvalidProfile).with_context(message))
        };

        if self.display_name.trim().is_empty() {
            return invalid("display name is empty");
        }
        if self
            .display_name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\''))
        {
            return invalid("display name contains characters not allowed in file names");
        }
        if self.entry_script.as_os_str().is_empty() || self.entry_script.is_absolute() {
            return invalid("entry script must be a relative path");
        }
        if self
            .packages
            .iter()
            .any(|package| package.name.trim().is_empty() || package.import_name.trim().is_empty())
        {
            return invalid("package entries need a name and an import");
        }

        Ok(())
    }
}

impl Default for AppProfile {
    fn default() -> Self {
        Self::swiftshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_id() {
        let id = AppId::new("io.github.SwiftShot").unwrap();

        assert_eq!(id.plain_id(), "swiftshot");
        assert_eq!(id.namespaced_id(), "io.github.SwiftShot");
        assert_eq!(id.uuid(), app_id_to_uuid("io.github.swiftshot"));
        assert!(AppId::new("swiftshot").is_err());
        assert!(AppId::new("io.9lives").is_err());
        assert!(AppId::new("io.a").is_err());
    }

    #[test]
    fn test_builtin_matches_parsed_id() {
        let profile = AppProfile::swiftshot();

        assert_eq!(profile.app_id, AppId::new("io.github.swiftshot").unwrap());
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_load_profile() {
        let text = r#"(
            app_id: "org.example.snapper",
            display_name: "Snapper",
            display_version: "0.1.0",
            entry_script: "app/run.py",
            packages: [(name: "Pillow>=10", import: "PIL")],
            min_runtime: (major: 3, minor: 10),
            runtime_package_id: "Python.Python.3.11",
        )"#;

        let profile = AppProfile::from_reader(text.as_bytes()).unwrap();

        assert_eq!(profile.app_id.plain_id(), "snapper");
        assert_eq!(profile.packages[0].import_name, "PIL");
        assert_eq!(profile.min_runtime, RuntimeVersion::new(3, 10));
        assert!(profile.publisher.is_empty());
    }

    #[test]
    fn test_reject_bad_profile() {
        let text = r#"(
            app_id: "org.example.snapper",
            display_name: "Snap\"per",
            display_version: "0.1.0",
            entry_script: "run.py",
            packages: [],
            min_runtime: (major: 3, minor: 10),
            runtime_package_id: "Python.Python.3.11",
        )"#;

        let error = AppProfile::from_reader(text.as_bytes()).unwrap_err();
        assert!(matches!(error.kind(), ProvisionErrorKind::InvalidProfile));

        let error = AppProfile::from_reader("(app_id: \"x\")".as_bytes()).unwrap_err();
        assert!(matches!(error.kind(), ProvisionErrorKind::InvalidProfile));
    }
}

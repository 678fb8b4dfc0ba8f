//! OS specific functionalities.
use std::{
    collections::HashMap,
    ffi::{OsStr, OsString},
    io::Write,
    path::{Component, Path, PathBuf},
};

use crate::error::{ProvisionError, ProvisionErrorKind};

#[cfg(unix)]
pub(crate) mod unix;
#[cfg(windows)]
pub(crate) mod windows;

/// OS specific error wrapper.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum OsError {
    /// Standard IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Error type provided by the Windows crates by Microsoft.
    #[cfg(windows)]
    #[error(transparent)]
    Windows(#[from] windows_result::Error),

    /// Any other error.
    #[error("{0}")]
    Other(&'static str),
}

impl From<OsError> for ProvisionError {
    fn from(value: OsError) -> Self {
        ProvisionError::new(ProvisionErrorKind::Io).with_source(value)
    }
}

/// Returns the directory portion of the current executable's path.
///
/// See also [`std::env::current_exe()`].
pub fn current_exe_dir() -> std::io::Result<PathBuf> {
    tracing::trace!("current_exe_dir");
    let mut path = std::env::current_exe()?;
    path.pop();

    Ok(path)
}

/// Well-known shell locations where shortcuts are placed.
///
/// On Windows these are the Desktop, the Start Menu `Programs` folder and
/// its `Startup` folder. Elsewhere they are the XDG desktop directory, the
/// `applications` data directory and the `autostart` config directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellFolders {
    /// Desktop directory.
    pub desktop: PathBuf,
    /// Start menu programs (or application menu entries) directory.
    pub programs: PathBuf,
    /// Directory whose entries start at login.
    pub startup: PathBuf,
}

impl ShellFolders {
    /// Creates folders from explicit paths.
    pub fn new<P: Into<PathBuf>>(desktop: P, programs: P, startup: P) -> Self {
        Self {
            desktop: desktop.into(),
            programs: programs.into(),
            startup: startup.into(),
        }
    }

    /// Resolves folders from the current process environment.
    pub fn from_env() -> Result<Self, ProvisionError> {
        let env_map = std::env::vars_os().collect::<HashMap<_, _>>();
        Self::from_env_map(&env_map)
    }

    /// Resolves folders from the given environment variables.
    pub fn from_env_map(env_map: &HashMap<OsString, OsString>) -> Result<Self, ProvisionError> {
        let get = |key: &str| {
            env_map
                .get(OsStr::new(key))
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                ProvisionError::new(ProvisionErrorKind::InvalidInput)
                    .with_context(format!("environment variable {key} is not set"))
            })
        };

        if cfg!(windows) {
            let profile = require("USERPROFILE")?;
            let programs = require("APPDATA")?
                .join("Microsoft")
                .join("Windows")
                .join("Start Menu")
                .join("Programs");

            Ok(Self {
                desktop: profile.join("Desktop"),
                startup: programs.join("Startup"),
                programs,
            })
        } else {
            let home = require("HOME")?;
            let data = get("XDG_DATA_HOME").unwrap_or_else(|| home.join(".local").join("share"));
            let config = get("XDG_CONFIG_HOME").unwrap_or_else(|| home.join(".config"));

            Ok(Self {
                desktop: get("XDG_DESKTOP_DIR").unwrap_or_else(|| home.join("Desktop")),
                programs: data.join("applications"),
                startup: config.join("autostart"),
            })
        }
    }
}

/// Returns the command search path as currently persisted by the OS.
///
/// On Windows this is the system `Path` followed by the user `Path` from
/// the registry, with `%VAR%` references expanded. Elsewhere there is no
/// persisted value distinct from the login environment, so `None`.
pub fn persisted_search_path() -> Option<OsString> {
    #[cfg(windows)]
    {
        match windows::persisted_search_path() {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(%error, "could not read search path from registry");
                None
            }
        }
    }
    #[cfg(not(windows))]
    {
        None
    }
}

/// Writes a file by persisting a temporary file over the destination.
///
/// The destination is either the old or the new content, never a partial
/// write. When `executable` is set on Unix, the file mode honours the umask.
pub fn write_file_atomic(
    path: &Path,
    contents: &[u8],
    executable: bool,
) -> Result<(), ProvisionError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    tracing::debug!(dir = ?parent, "creating directories");
    std::fs::create_dir_all(parent)?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(contents)?;
    temp_file.flush()?;

    #[cfg(unix)]
    {
        let mode = unix::get_effective_posix_permission(executable);
        unix::set_posix_permission(temp_file.path(), mode)?;
    }
    #[cfg(not(unix))]
    let _ = executable;

    tracing::debug!(?path, len = contents.len(), "persisting file");
    temp_file.persist(path)?;

    Ok(())
}

/// Removes a file. Returns `false` when it did not exist.
pub fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

/// Removes a directory tree. Returns `false` when it did not exist.
pub fn remove_dir_all_if_exists(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

/// Removes a directory only when it exists and is empty.
pub fn remove_dir_if_empty(path: &Path) -> std::io::Result<bool> {
    if !path.is_dir() || std::fs::read_dir(path)?.next().is_some() {
        return Ok(false);
    }

    std::fs::remove_dir(path)?;
    Ok(true)
}

/// Resolves `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(component),
            },
            _ => normalized.push(component),
        }
    }

    normalized
}

/// Returns whether `path` lies below `root`, comparing normalized paths.
///
/// `root` itself is not below `root`.
pub fn is_below(path: &Path, root: &Path) -> bool {
    let path = normalize_path(path);
    let root = normalize_path(root);

    path != root && path.starts_with(&root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_below() {
        let root = Path::new("/opt/swiftshot");

        assert!(is_below(Path::new("/opt/swiftshot/venv"), root));
        assert!(is_below(Path::new("/opt/swiftshot/./a/../venv"), root));
        assert!(!is_below(Path::new("/opt/swiftshot/../elsewhere"), root));
        assert!(!is_below(Path::new("/opt/swiftshot/venv/.."), root));
        assert!(!is_below(root, root));
        assert_eq!(
            normalize_path(Path::new("/a/b/../../../c")),
            PathBuf::from("/c")
        );
    }

    fn env_map(pairs: &[(&str, &str)]) -> HashMap<OsString, OsString> {
        pairs
            .iter()
            .map(|(key, value)| (OsString::from(key), OsString::from(value)))
            .collect()
    }

    #[cfg(windows)]
    #[test]
    fn test_shell_folders() {
        let folders = ShellFolders::from_env_map(&env_map(&[
            ("USERPROFILE", r"C:\Users\ada"),
            ("APPDATA", r"C:\Users\ada\AppData\Roaming"),
        ]))
        .unwrap();

        assert_eq!(folders.desktop, Path::new(r"C:\Users\ada\Desktop"));
        assert_eq!(
            folders.startup,
            Path::new(r"C:\Users\ada\AppData\Roaming\Microsoft\Windows\Start Menu\Programs\Startup")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_folders() {
        let folders = ShellFolders::from_env_map(&env_map(&[
            ("HOME", "/home/ada"),
            ("XDG_CONFIG_HOME", "/home/ada/cfg"),
        ]))
        .unwrap();

        assert_eq!(folders.desktop, Path::new("/home/ada/Desktop"));
        assert_eq!(
            folders.programs,
            Path::new("/home/ada/.local/share/applications")
        );
        assert_eq!(folders.startup, Path::new("/home/ada/cfg/autostart"));
    }

    #[test]
    fn test_shell_folders_missing_env() {
        assert!(ShellFolders::from_env_map(&env_map(&[])).is_err());
    }

    #[test]
    fn test_write_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.txt");

        write_file_atomic(&path, b"one", false).unwrap();
        write_file_atomic(&path, b"two", false).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");

        assert!(remove_file_if_exists(&path).unwrap());
        assert!(!remove_file_if_exists(&path).unwrap());
        assert!(remove_dir_if_empty(&dir.path().join("nested")).unwrap());
        assert!(!remove_dir_all_if_exists(&dir.path().join("nested")).unwrap());
    }
}

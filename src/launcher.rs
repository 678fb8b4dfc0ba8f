//! Launch stubs.
//!
//! Two launchers are written next to the entry script: a visible one that
//! runs the console runtime, and a silent one that starts the no-console
//! runtime with its window hidden. Shortcuts point at the silent launcher.
//! Both are rewritten on every install.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    app::AppProfile,
    env::EnvLayout,
    error::{AddProvisionContext, ProvisionError},
    process::ToolCommand,
};

/// Paths of the visible and silent launchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherPair {
    /// Launcher showing a console.
    pub visible: PathBuf,
    /// Launcher without any console window.
    pub silent: PathBuf,
}

impl LauncherPair {
    /// Returns the launcher paths for the app in the given install root.
    pub fn for_app(install_dir: &Path, profile: &AppProfile) -> Self {
        if cfg!(windows) {
            let name = &profile.display_name;
            Self {
                visible: install_dir.join(format!("{name}.bat")),
                silent: install_dir.join(format!("{name}.vbs")),
            }
        } else {
            let id = profile.app_id.plain_id();
            Self {
                visible: install_dir.join(format!("{id}.sh")),
                silent: install_dir.join(format!("{id}-silent.sh")),
            }
        }
    }

    /// Returns the program and arguments a shortcut uses to run the silent
    /// launcher.
    ///
    /// On Windows this is the script host with the launcher as its only
    /// quoted argument, so the shortcut's icon and working directory stay
    /// independent of the script.
    pub fn shortcut_target(&self) -> (PathBuf, Vec<String>) {
        if cfg!(windows) {
            (
                PathBuf::from("wscript.exe"),
                vec![crate::shortcut::quote_argument(&self.silent)],
            )
        } else {
            (self.silent.clone(), Vec::new())
        }
    }

    /// Returns a command starting the app through the silent launcher.
    pub fn silent_command(&self) -> ToolCommand {
        if cfg!(windows) {
            ToolCommand::new("wscript.exe").arg(&self.silent)
        } else {
            ToolCommand::new("/bin/sh").arg(&self.silent)
        }
    }
}

/// Result of [`write_launchers()`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherReport {
    /// Files written.
    pub launchers: LauncherPair,
    /// Set when the silent launcher had to use the console runtime.
    pub silent_uses_console: bool,
}

/// Writes both launchers, overwriting existing ones.
pub fn write_launchers(
    launchers: &LauncherPair,
    layout: &EnvLayout,
    env_root: &Path,
    install_dir: &Path,
    entry_script: &Path,
) -> Result<LauncherReport, ProvisionError> {
    let console = layout.console_runtime(env_root);
    let entry = install_dir.join(entry_script);

    if !entry.is_file() {
        tracing::warn!(?entry, "entry script not found; launchers will fail until it exists");
    }

    let (windowed, silent_uses_console) = match layout.windowed_runtime(env_root) {
        Some(path) if path.is_file() => (path, false),
        Some(path) => {
            tracing::warn!(
                missing = ?path,
                "no-console runtime missing; launches will briefly show a console window"
            );
            (console.clone(), true)
        }
        None => (console.clone(), false),
    };

    let scripts = LauncherScripts {
        install_dir,
        entry: &entry,
    };

    tracing::info!(path = ?launchers.visible, "writing visible launcher");
    crate::os::write_file_atomic(
        &launchers.visible,
        scripts.visible(&console).as_bytes(),
        true,
    )
    .prov_context("failed to write visible launcher")?;

    tracing::info!(path = ?launchers.silent, "writing silent launcher");
    crate::os::write_file_atomic(
        &launchers.silent,
        scripts.silent(&windowed).as_bytes(),
        true,
    )
    .prov_context("failed to write silent launcher")?;

    Ok(LauncherReport {
        launchers: launchers.clone(),
        silent_uses_console,
    })
}

struct LauncherScripts<'a> {
    install_dir: &'a Path,
    entry: &'a Path,
}

#[cfg(windows)]
impl LauncherScripts<'_> {
    fn visible(&self, runtime: &Path) -> String {
        [
            "@echo off".to_string(),
            format!("cd /d \"{}\"", self.install_dir.display()),
            format!("\"{}\" \"{}\" %*", runtime.display(), self.entry.display()),
            String::new(),
        ]
        .join("\r\n")
    }

    fn silent(&self, runtime: &Path) -> String {
        // VBScript doubles quotes inside string literals.
        [
            "Set shell = CreateObject(\"WScript.Shell\")".to_string(),
            format!("shell.CurrentDirectory = \"{}\"", self.install_dir.display()),
            format!(
                "shell.Run \"\"\"{}\"\" \"\"{}\"\"\", 0, False",
                runtime.display(),
                self.entry.display()
            ),
            String::new(),
        ]
        .join("\r\n")
    }
}

#[cfg(not(windows))]
impl LauncherScripts<'_> {
    fn visible(&self, runtime: &Path) -> String {
        use crate::os::unix::sh_quote;

        format!(
            "#!/bin/sh\ncd {} || exit 1\nexec {} {} \"$@\"\n",
            sh_quote(&self.install_dir.to_string_lossy()),
            sh_quote(&runtime.to_string_lossy()),
            sh_quote(&self.entry.to_string_lossy()),
        )
    }

    fn silent(&self, runtime: &Path) -> String {
        use crate::os::unix::sh_quote;

        format!(
            "#!/bin/sh\ncd {} || exit 1\nnohup {} {} \"$@\" >/dev/null 2>&1 &\n",
            sh_quote(&self.install_dir.to_string_lossy()),
            sh_quote(&runtime.to_string_lossy()),
            sh_quote(&self.entry.to_string_lossy()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_env(root: &Path, layout: &EnvLayout, windowed: bool) {
        let console = layout.console_runtime(root);
        std::fs::create_dir_all(console.parent().unwrap()).unwrap();
        std::fs::write(&console, b"").unwrap();

        if windowed {
            if let Some(path) = layout.windowed_runtime(root) {
                std::fs::write(path, b"").unwrap();
            }
        }
    }

    #[test]
    fn test_write_launchers_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let env_root = dir.path().join("venv");
        let layout = EnvLayout::native();
        make_env(&env_root, &layout, true);
        std::fs::write(dir.path().join("main.py"), b"print('hi')").unwrap();

        let launchers = LauncherPair::for_app(dir.path(), &AppProfile::swiftshot());
        std::fs::write(&launchers.visible, b"stale").unwrap();

        let report = write_launchers(
            &launchers,
            &layout,
            &env_root,
            dir.path(),
            Path::new("main.py"),
        )
        .unwrap();

        assert!(!report.silent_uses_console);

        let visible = std::fs::read_to_string(&launchers.visible).unwrap();
        let silent = std::fs::read_to_string(&launchers.silent).unwrap();

        assert!(!visible.contains("stale"));
        assert!(visible.contains(&layout.console_runtime(&env_root).display().to_string()));
        assert!(visible.contains("main.py"));
        assert!(silent.contains("main.py"));

        if cfg!(windows) {
            assert!(silent.contains("pythonw.exe"));
            assert!(silent.contains(", 0, False"));
        } else {
            assert!(silent.contains("nohup"));
        }
    }

    #[cfg(windows)]
    #[test]
    fn test_missing_windowed_runtime_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let env_root = dir.path().join("venv");
        let layout = EnvLayout::native();
        make_env(&env_root, &layout, false);

        let launchers = LauncherPair::for_app(dir.path(), &AppProfile::swiftshot());
        let report = write_launchers(
            &launchers,
            &layout,
            &env_root,
            dir.path(),
            Path::new("main.py"),
        )
        .unwrap();

        assert!(report.silent_uses_console);
        let silent = std::fs::read_to_string(&launchers.silent).unwrap();
        assert!(silent.contains("python.exe"));
        assert!(!silent.contains("pythonw.exe"));
    }

    #[test]
    fn test_shortcut_target() {
        let launchers = LauncherPair::for_app(Path::new("/opt/app"), &AppProfile::swiftshot());
        let (target, args) = launchers.shortcut_target();

        if cfg!(windows) {
            assert_eq!(target, Path::new("wscript.exe"));
            assert_eq!(args.len(), 1);
            assert!(args[0].starts_with('"'));
        } else {
            assert_eq!(target, launchers.silent);
            assert!(args.is_empty());
        }
    }
}

//! Shell shortcuts.
//!
//! Shortcuts are created through a [`ShortcutFacility`]. Creating one never
//! fails the install: [`create_shortcut()`] logs the error and reports
//! `false`. Removing one that is already gone counts as success.
use std::path::{Path, PathBuf};

use crate::{
    app::AppProfile,
    error::{format_error, ProvisionError},
    launcher::LauncherPair,
    os::ShellFolders,
};

/// Everything needed to write one shortcut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutSpec {
    /// Name shown to the user.
    pub name: String,
    /// Location of the shortcut file.
    pub path: PathBuf,
    /// Program the shortcut starts.
    pub target: PathBuf,
    /// Arguments passed to the target.
    pub arguments: Vec<String>,
    /// Working directory of the started program.
    pub working_dir: PathBuf,
    /// Icon file, if any.
    pub icon: Option<PathBuf>,
    /// Tooltip or comment.
    pub description: String,
    /// Whether the window starts minimized.
    pub minimized: bool,
}

/// OS facility that persists shortcuts.
pub trait ShortcutFacility {
    /// Writes the shortcut described by `spec`, replacing any existing one.
    fn create(&mut self, spec: &ShortcutSpec) -> Result<(), ProvisionError>;
}

/// Shell links (`.lnk`) written through PowerShell and the Windows Script Host.
#[cfg(windows)]
#[derive(Debug, Default)]
pub struct ShellLinks {
    runner: crate::process::SystemRunner,
}

#[cfg(windows)]
impl ShortcutFacility for ShellLinks {
    fn create(&mut self, spec: &ShortcutSpec) -> Result<(), ProvisionError> {
        crate::os::windows::create_shell_link(&mut self.runner, spec)
    }
}

/// Freedesktop desktop entries (`.desktop`).
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct DesktopEntries;

#[cfg(unix)]
impl ShortcutFacility for DesktopEntries {
    fn create(&mut self, spec: &ShortcutSpec) -> Result<(), ProvisionError> {
        let entry = crate::os::unix::desktop_entry(spec);

        // Desktops only launch trusted entries marked executable.
        crate::os::write_file_atomic(&spec.path, entry.as_bytes(), true)
    }
}

/// Returns the facility for the current platform.
pub fn native_facility() -> Box<dyn ShortcutFacility> {
    #[cfg(windows)]
    {
        Box::new(ShellLinks::default())
    }
    #[cfg(unix)]
    {
        Box::new(DesktopEntries)
    }
}

/// Creates a shortcut, converting any failure into a warning.
///
/// The icon is dropped from the spec when the file does not exist.
pub fn create_shortcut(facility: &mut dyn ShortcutFacility, spec: &ShortcutSpec) -> bool {
    let mut spec = spec.clone();

    if let Some(icon) = &spec.icon {
        if !icon.is_file() {
            tracing::debug!(?icon, "icon missing, using default");
            spec.icon = None;
        }
    }

    tracing::info!(path = ?spec.path, target = ?spec.target, "creating shortcut");

    match facility.create(&spec) {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(path = ?spec.path, error = %format_error(&error), "could not create shortcut");
            false
        }
    }
}

/// The shortcuts this tool manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutKind {
    /// On the desktop.
    Desktop,
    /// In the start menu (application menu).
    StartMenu,
    /// Start menu entry running the uninstaller.
    StartMenuUninstall,
    /// Started at login.
    Startup,
}

/// Where each shortcut lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutLocations {
    /// Desktop shortcut.
    pub desktop: PathBuf,
    /// Start menu shortcut.
    pub start_menu: PathBuf,
    /// Start menu uninstall shortcut.
    pub start_menu_uninstall: PathBuf,
    /// Startup shortcut.
    pub startup: PathBuf,
    /// Folder created for the app inside the start menu, if any.
    pub start_menu_dir: Option<PathBuf>,
}

impl ShortcutLocations {
    /// Derives shortcut paths from the shell folders and app names.
    pub fn resolve(folders: &ShellFolders, profile: &AppProfile) -> Self {
        if cfg!(windows) {
            let name = &profile.display_name;
            let dir = folders.programs.join(name);

            Self {
                desktop: folders.desktop.join(format!("{name}.lnk")),
                start_menu: dir.join(format!("{name}.lnk")),
                start_menu_uninstall: dir.join(format!("Uninstall {name}.lnk")),
                startup: folders.startup.join(format!("{name}.lnk")),
                start_menu_dir: Some(dir),
            }
        } else {
            let id = profile.app_id.plain_id();

            Self {
                desktop: folders.desktop.join(format!("{id}.desktop")),
                start_menu: folders.programs.join(format!("{id}.desktop")),
                start_menu_uninstall: folders.programs.join(format!("{id}-uninstall.desktop")),
                startup: folders.startup.join(format!("{id}.desktop")),
                start_menu_dir: None,
            }
        }
    }

    /// Returns the path for the given kind.
    pub fn path(&self, kind: ShortcutKind) -> &Path {
        match kind {
            ShortcutKind::Desktop => &self.desktop,
            ShortcutKind::StartMenu => &self.start_menu,
            ShortcutKind::StartMenuUninstall => &self.start_menu_uninstall,
            ShortcutKind::Startup => &self.startup,
        }
    }

    /// Returns every shortcut path, including the optional startup one.
    pub fn all(&self) -> [&Path; 4] {
        [
            &self.desktop,
            &self.start_menu,
            &self.start_menu_uninstall,
            &self.startup,
        ]
    }
}

/// Inputs shared by all shortcuts of one install.
#[derive(Debug, Clone)]
pub struct ShortcutTargets<'a> {
    /// Display name of the app.
    pub name: &'a str,
    /// Shortcut description.
    pub description: &'a str,
    /// Launchers written for this install.
    pub launchers: &'a LauncherPair,
    /// Icon file.
    pub icon: &'a Path,
    /// Install root, used as working directory.
    pub install_dir: &'a Path,
    /// This provisioning tool, started by the uninstall shortcut.
    pub tool: &'a Path,
}

/// Creates and removes the app's shortcut set.
pub struct ShortcutManager<'a> {
    facility: &'a mut dyn ShortcutFacility,
    locations: ShortcutLocations,
}

impl<'a> ShortcutManager<'a> {
    /// Creates a manager for the given locations.
    pub fn new(facility: &'a mut dyn ShortcutFacility, locations: ShortcutLocations) -> Self {
        Self {
            facility,
            locations,
        }
    }

    /// Returns the locations.
    pub fn locations(&self) -> &ShortcutLocations {
        &self.locations
    }

    /// Creates the desktop, start menu and uninstall shortcuts, plus the
    /// startup shortcut when requested.
    ///
    /// A startup shortcut left by an earlier install is removed when it is no
    /// longer requested. Returns the paths that were created successfully.
    pub fn create_all(&mut self, targets: &ShortcutTargets, add_to_startup: bool) -> Vec<PathBuf> {
        let mut kinds = vec![
            ShortcutKind::Desktop,
            ShortcutKind::StartMenu,
            ShortcutKind::StartMenuUninstall,
        ];
        if add_to_startup {
            kinds.push(ShortcutKind::Startup);
        } else {
            remove_shortcuts([self.locations.startup.as_path()], None);
        }

        let mut created = Vec::new();

        for kind in kinds {
            let spec = self.spec(kind, targets);

            if create_shortcut(&mut *self.facility, &spec) {
                created.push(spec.path);
            }
        }

        created
    }

    /// Removes every shortcut of the set and the start menu folder.
    pub fn remove_all(&self) -> Vec<PathBuf> {
        remove_shortcuts(self.locations.all(), self.locations.start_menu_dir.as_deref())
    }

    fn spec(&self, kind: ShortcutKind, targets: &ShortcutTargets) -> ShortcutSpec {
        let path = self.locations.path(kind).to_path_buf();

        if kind == ShortcutKind::StartMenuUninstall {
            return ShortcutSpec {
                name: format!("Uninstall {}", targets.name),
                path,
                target: targets.tool.to_path_buf(),
                arguments: vec![
                    "--uninstall".to_string(),
                    "--install-dir".to_string(),
                    quote_argument(targets.install_dir),
                ],
                working_dir: targets.install_dir.to_path_buf(),
                icon: Some(targets.icon.to_path_buf()),
                description: format!("Remove {}", targets.name),
                minimized: false,
            };
        }

        let (target, arguments) = targets.launchers.shortcut_target();

        ShortcutSpec {
            name: targets.name.to_string(),
            path,
            target,
            arguments,
            working_dir: targets.install_dir.to_path_buf(),
            icon: Some(targets.icon.to_path_buf()),
            description: targets.description.to_string(),
            minimized: true,
        }
    }
}

/// Quotes a path argument for a Windows command line; unchanged elsewhere.
pub(crate) fn quote_argument(path: &Path) -> String {
    let text = path.to_string_lossy();

    if cfg!(windows) {
        format!("\"{text}\"")
    } else {
        text.into_owned()
    }
}

/// Removes the given shortcut files and the app's start menu folder.
///
/// Returns the paths actually removed. Missing files are skipped; other
/// errors are logged and skipped.
pub fn remove_shortcuts<'p, I>(paths: I, start_menu_dir: Option<&Path>) -> Vec<PathBuf>
where
    I: IntoIterator<Item = &'p Path>,
{
    let mut removed = Vec::new();

    for path in paths {
        match crate::os::remove_file_if_exists(path) {
            Ok(true) => {
                tracing::info!(?path, "removed shortcut");
                removed.push(path.to_path_buf());
            }
            Ok(false) => tracing::debug!(?path, "shortcut already absent"),
            Err(error) => tracing::warn!(?path, %error, "could not remove shortcut"),
        }
    }

    if let Some(dir) = start_menu_dir {
        match crate::os::remove_dir_if_empty(dir) {
            Ok(true) => tracing::info!(?dir, "removed start menu folder"),
            Ok(false) => {}
            Err(error) => tracing::warn!(?dir, %error, "could not remove start menu folder"),
        }
    }

    removed
}

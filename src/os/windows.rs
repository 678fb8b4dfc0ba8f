use std::{
    ffi::{OsStr, OsString},
    path::Path,
};

use windows_registry::Key;

use crate::{
    app::AppId,
    error::ProvisionError,
    process::{ToolCommand, ToolRunner},
    shortcut::ShortcutSpec,
};

use super::OsError;

// Notes on environment variables:
// https://learn.microsoft.com/en-us/windows/win32/procthread/environment-variables
//
// Notes on installed app entries:
// https://learn.microsoft.com/en-us/windows/win32/msi/uninstall-registry-key
//
// Notes on shell links through the scripting host:
// https://learn.microsoft.com/en-us/troubleshoot/windows-client/admin-development/create-desktop-shortcut-with-windows-script-host
//
// Note on registry API:
// * open() is open read-only
// * create() is open read/write

pub const REGISTRY_ENV_USER_KEY: &str = "Environment";
pub const REGISTRY_ENV_SYSTEM_KEY: &str =
    r"SYSTEM\CurrentControlSet\Control\Session Manager\Environment";
pub const REGISTRY_UNINSTALL_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Uninstall";

/// `WshShortcut.WindowStyle` value for a minimized window.
const WINDOW_STYLE_MINIMIZED: u32 = 7;
const WINDOW_STYLE_NORMAL: u32 = 1;

fn read_path_value(predef_key: &Key, key_path: &str) -> Result<OsString, OsError> {
    tracing::debug!(key_path, "opening path key read-only");
    let hkey = predef_key.open(key_path)?;

    Ok(hkey.get_hstring("Path")?.to_os_string())
}

pub fn persisted_search_path() -> Result<OsString, OsError> {
    let system = read_path_value(windows_registry::LOCAL_MACHINE, REGISTRY_ENV_SYSTEM_KEY)?;
    // A user without a personal Path is normal.
    let user = read_path_value(windows_registry::CURRENT_USER, REGISTRY_ENV_USER_KEY)
        .unwrap_or_default();

    let mut value = system;
    if !user.is_empty() {
        value.push(";");
        value.push(&user);
    }

    let expanded = expand_env_vars(&value.to_string_lossy(), |name| std::env::var(name).ok());

    Ok(OsString::from(expanded))
}

/// Expands `%NAME%` references, leaving unknown ones untouched.
pub fn expand_env_vars<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find('%') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('%') {
            Some(end) => {
                let name = &after[..end];
                match lookup(name).filter(|_| !name.is_empty()) {
                    Some(replacement) => output.push_str(&replacement),
                    None => {
                        output.push('%');
                        output.push_str(name);
                        output.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                output.push('%');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}

#[derive(Debug, Clone, Default)]
pub struct UninstallEntryConfig {
    pub display_name: String,
    pub display_version: String,
    pub publisher: String,
    pub install_location: OsString,
    pub display_icon: Option<OsString>,
}

pub fn add_uninstall_entry(
    app_id: &AppId,
    exe_path: &OsStr,
    exe_args: &OsStr,
    config: &UninstallEntryConfig,
) -> Result<(), OsError> {
    let predef_key = windows_registry::CURRENT_USER;
    let key_path = format!(r"{}\{}", REGISTRY_UNINSTALL_KEY, app_id.uuid());

    tracing::debug!(key_path, "creating key");
    let hkey = predef_key.create(key_path)?;

    let mut uninstall_string = OsString::new();
    uninstall_string.push("\"");
    uninstall_string.push(exe_path);
    uninstall_string.push("\" ");
    uninstall_string.push(exe_args);

    tracing::debug!(?uninstall_string, "writing keys");
    hkey.set_hstring("UninstallString", &uninstall_string.clone().into())?;
    hkey.set_hstring("QuietUninstallString", &uninstall_string.into())?;
    hkey.set_string("DisplayName", &config.display_name)?;
    hkey.set_hstring("InstallLocation", &config.install_location.as_os_str().into())?;
    hkey.set_u32("NoModify", 1)?;
    hkey.set_u32("NoRepair", 1)?;

    if !config.display_version.is_empty() {
        hkey.set_string("DisplayVersion", &config.display_version)?;
    }

    if !config.publisher.is_empty() {
        hkey.set_string("Publisher", &config.publisher)?;
    }

    if let Some(icon) = &config.display_icon {
        hkey.set_hstring("DisplayIcon", &icon.as_os_str().into())?;
    }

    Ok(())
}

pub fn remove_uninstall_entry(app_id: &AppId) -> Result<bool, OsError> {
    let predef_key = windows_registry::CURRENT_USER;
    let key_path = format!(r"{}\{}", REGISTRY_UNINSTALL_KEY, app_id.uuid());

    if predef_key.open(&key_path).is_err() {
        return Ok(false);
    }

    tracing::debug!(key_path, "removing key tree");
    predef_key.remove_tree(key_path)?;

    Ok(true)
}

/// Quotes a value as a PowerShell single-quoted string.
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn ps_path(path: &Path) -> String {
    ps_quote(&path.to_string_lossy())
}

/// Renders the PowerShell script that saves a `.lnk` file.
pub fn shell_link_script(spec: &ShortcutSpec) -> String {
    let style = if spec.minimized {
        WINDOW_STYLE_MINIMIZED
    } else {
        WINDOW_STYLE_NORMAL
    };

    let mut script = String::from("$ErrorActionPreference = 'Stop'\n");
    script.push_str(&format!(
        "$s = (New-Object -ComObject WScript.Shell).CreateShortcut({})\n",
        ps_path(&spec.path)
    ));
    script.push_str(&format!("$s.TargetPath = {}\n", ps_path(&spec.target)));
    script.push_str(&format!(
        "$s.Arguments = {}\n",
        ps_quote(&spec.arguments.join(" "))
    ));
    script.push_str(&format!(
        "$s.WorkingDirectory = {}\n",
        ps_path(&spec.working_dir)
    ));
    script.push_str(&format!("$s.WindowStyle = {style}\n"));
    if let Some(icon) = &spec.icon {
        script.push_str(&format!(
            "$s.IconLocation = {}\n",
            ps_quote(&format!("{},0", icon.to_string_lossy()))
        ));
    }
    script.push_str(&format!("$s.Description = {}\n", ps_quote(&spec.description)));
    script.push_str("$s.Save()\n");

    script
}

pub fn create_shell_link(
    runner: &mut dyn ToolRunner,
    spec: &ShortcutSpec,
) -> Result<(), ProvisionError> {
    if let Some(parent) = spec.path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let command = ToolCommand::new("powershell.exe")
        .args(["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass"])
        .arg("-Command")
        .arg(shell_link_script(spec));

    let output = runner.run(&command)?;

    if output.is_success() && spec.path.is_file() {
        Ok(())
    } else {
        Err(ProvisionError::new(crate::error::ProvisionErrorKind::Other)
            .with_context("shell link was not saved")
            .with_source(output.failure_message()))
    }
}

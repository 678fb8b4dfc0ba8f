// Notes for app menus and autostart:
// https://specifications.freedesktop.org/desktop-entry-spec/latest/index.html
// https://specifications.freedesktop.org/autostart-spec/latest/
//
// Notes on filesystem directories:
// https://specifications.freedesktop.org/basedir-spec/latest/index.html

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::LazyLock;

use crate::shortcut::ShortcutSpec;

pub fn get_umask() -> u32 {
    static UMASK: LazyLock<u32> = LazyLock::new(|| {
        let value = unsafe {
            // SAFETY: we're only getting and setting integers.
            let current = libc::umask(0o022);
            libc::umask(current);
            current
        };
        // Cast used because it might be u16 on macOS.
        value as u32
    });

    *UMASK
}

pub fn get_effective_posix_permission(executable: bool) -> u32 {
    let full = if executable { 0o777 } else { 0o666 };
    full & !get_umask()
}

pub fn set_posix_permission(target: &Path, mode: u32) -> std::io::Result<()> {
    let mut perm = target.metadata()?.permissions();
    perm.set_mode(mode);
    std::fs::set_permissions(target, perm)?;
    Ok(())
}

/// Quotes a value for a POSIX shell script.
pub fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Quotes an argument for the `Exec` key of a desktop entry.
fn exec_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');

    for c in value.chars() {
        match c {
            '"' | '`' | '$' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            // A single `%` starts a field code.
            '%' => quoted.push_str("%%"),
            _ => quoted.push(c),
        }
    }

    quoted.push('"');
    // The desktop entry string type escapes backslashes once more.
    quoted.replace('\\', r"\\")
}

/// Escapes a value of the desktop entry string type.
fn entry_escape(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('\n', r"\n")
        .replace('\t', r"\t")
}

/// Renders a freedesktop desktop entry launching the shortcut target.
pub fn desktop_entry(spec: &ShortcutSpec) -> String {
    let mut exec = exec_quote(&spec.target.to_string_lossy());
    for arg in &spec.arguments {
        exec.push(' ');
        exec.push_str(&exec_quote(arg));
    }

    let mut entry = String::from("[Desktop Entry]\n");
    entry.push_str("Type=Application\n");
    entry.push_str(&format!("Name={}\n", entry_escape(&spec.name)));
    if !spec.description.is_empty() {
        entry.push_str(&format!("Comment={}\n", entry_escape(&spec.description)));
    }
    entry.push_str(&format!("Exec={exec}\n"));
    entry.push_str(&format!(
        "Path={}\n",
        entry_escape(&spec.working_dir.to_string_lossy())
    ));
    if let Some(icon) = &spec.icon {
        entry.push_str(&format!("Icon={}\n", entry_escape(&icon.to_string_lossy())));
    }
    entry.push_str("Terminal=false\n");
    entry.push_str("Categories=Graphics;Utility;\n");

    entry
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_sh_quote() {
        assert_eq!(sh_quote("/opt/swift shot"), "'/opt/swift shot'");
        assert_eq!(sh_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_desktop_entry() {
        let spec = ShortcutSpec {
            name: "SwiftShot".to_string(),
            path: PathBuf::from("/home/ada/Desktop/swiftshot.desktop"),
            target: PathBuf::from("/opt/swift shot/swiftshot-silent.sh"),
            arguments: vec!["--uninstall".to_string()],
            working_dir: PathBuf::from("/opt/swift shot"),
            icon: None,
            description: "Screenshot tool".to_string(),
            minimized: true,
        };

        let entry = desktop_entry(&spec);

        assert!(entry.starts_with("[Desktop Entry]\n"));
        assert!(entry.contains("Exec=\"/opt/swift shot/swiftshot-silent.sh\" \"--uninstall\"\n"));
        assert!(entry.contains("Path=/opt/swift shot\n"));
        assert!(!entry.contains("Icon="));
    }

    #[test]
    fn test_exec_quote_percent() {
        assert_eq!(exec_quote("/opt/100%/run.sh"), "\"/opt/100%%/run.sh\"");
        assert_eq!(exec_quote("a$b"), r#""a\\$b""#);
    }
}

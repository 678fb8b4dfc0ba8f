//! Isolated dependency environment.
//!
//! The environment root is owned entirely by the installer. Its console
//! runtime copy is the validity witness: a root without it is treated as the
//! leftover of an interrupted run and is deleted and created again. There is
//! no partial repair.
use std::path::{Path, PathBuf};

use crate::{
    app::PackageSpec,
    error::{AddProvisionContext, ProvisionError, ProvisionErrorKind},
    process::{ToolCommand, ToolRunner, INSTALL_TIMEOUT, QUERY_TIMEOUT},
    runtime::RuntimePath,
};

/// Printed by the verification probe once every import succeeded.
pub const IMPORT_SENTINEL: &str = "SWIFTSHOT_IMPORT_OK";

/// Where the runtime copies live inside an environment root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvLayout {
    scripts_dir: &'static str,
    console: &'static str,
    windowed: Option<&'static str>,
}

impl EnvLayout {
    /// Layout of environments created on this platform.
    pub const fn native() -> Self {
        if cfg!(windows) {
            Self::windows()
        } else {
            Self::posix()
        }
    }

    /// `Scripts\python.exe` plus the no-console `Scripts\pythonw.exe`.
    pub const fn windows() -> Self {
        Self {
            scripts_dir: "Scripts",
            console: "python.exe",
            windowed: Some("pythonw.exe"),
        }
    }

    /// `bin/python`; there is no separate no-console runtime.
    pub const fn posix() -> Self {
        Self {
            scripts_dir: "bin",
            console: "python",
            windowed: None,
        }
    }

    /// Returns the console runtime path, the validity marker.
    pub fn console_runtime(&self, root: &Path) -> PathBuf {
        root.join(self.scripts_dir).join(self.console)
    }

    /// Returns the no-console runtime path if the platform has one.
    pub fn windowed_runtime(&self, root: &Path) -> Option<PathBuf> {
        self.windowed
            .map(|name| root.join(self.scripts_dir).join(name))
    }

    /// Returns whether the root holds a console runtime.
    pub fn is_valid(&self, root: &Path) -> bool {
        self.console_runtime(root).is_file()
    }
}

impl Default for EnvLayout {
    fn default() -> Self {
        Self::native()
    }
}

/// What [`ensure_environment()`] did with the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvDisposition {
    /// A valid environment already existed.
    Reused,
    /// No environment existed.
    Created,
    /// An invalid leftover was deleted and a new one created.
    Recreated,
}

/// Result of [`ensure_environment()`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentReport {
    /// Environment root.
    pub root: PathBuf,
    /// Console runtime inside the environment.
    pub console_runtime: PathBuf,
    /// How the root was obtained.
    pub disposition: EnvDisposition,
    /// Packages installed during this run, in order.
    pub installed: Vec<String>,
}

/// Creates or repairs the environment and makes sure the packages import.
///
/// A reused environment is probed first; packages are only installed when
/// the probe fails. Installs run one package at a time and stop at the first
/// failure.
pub fn ensure_environment(
    runner: &mut dyn ToolRunner,
    layout: &EnvLayout,
    runtime: &RuntimePath,
    env_root: &Path,
    packages: &[PackageSpec],
) -> Result<EnvironmentReport, ProvisionError> {
    let mut disposition = EnvDisposition::Created;

    if env_root.exists() {
        if layout.is_valid(env_root) {
            disposition = EnvDisposition::Reused;
        } else {
            tracing::info!(?env_root, "environment incomplete, recreating it");
            std::fs::remove_dir_all(env_root)
                .map_err(ProvisionError::from)
                .prov_context("failed to delete incomplete environment")?;
            disposition = EnvDisposition::Recreated;
        }
    }

    if disposition != EnvDisposition::Reused {
        create_environment(runner, layout, runtime, env_root)?;
    }

    let console_runtime = layout.console_runtime(env_root);
    let mut installed = Vec::new();

    if disposition == EnvDisposition::Reused {
        match verify_imports(runner, &console_runtime, packages) {
            Ok(()) => {
                tracing::info!(?env_root, "environment is up to date");
                return Ok(EnvironmentReport {
                    root: env_root.to_path_buf(),
                    console_runtime,
                    disposition,
                    installed,
                });
            }
            Err(error) => {
                tracing::info!(%error, "reused environment is missing packages");
            }
        }
    }

    upgrade_installer(runner, &console_runtime);

    for package in packages {
        install_package(runner, &console_runtime, package)?;
        installed.push(package.name.clone());
    }

    verify_imports(runner, &console_runtime, packages)?;

    Ok(EnvironmentReport {
        root: env_root.to_path_buf(),
        console_runtime,
        disposition,
        installed,
    })
}

fn create_environment(
    runner: &mut dyn ToolRunner,
    layout: &EnvLayout,
    runtime: &RuntimePath,
    env_root: &Path,
) -> Result<(), ProvisionError> {
    tracing::info!(?env_root, %runtime, "creating environment");

    let command = runtime
        .command()
        .args(["-m", "venv"])
        .arg(env_root)
        .timeout(INSTALL_TIMEOUT);
    let output = runner.run(&command)?;

    if output.is_success() && layout.is_valid(env_root) {
        return Ok(());
    }

    tracing::warn!(
        outcome = ?output.outcome,
        output = %output.combined(),
        "environment creation failed, retrying without pip"
    );
    crate::os::remove_dir_all_if_exists(env_root)?;

    let command = runtime
        .command()
        .args(["-m", "venv", "--without-pip"])
        .arg(env_root)
        .timeout(INSTALL_TIMEOUT);
    let output = runner.run(&command)?;

    if !output.is_success() || !layout.is_valid(env_root) {
        return Err(ProvisionError::new(ProvisionErrorKind::EnvironmentCreation)
            .with_context(format!("{}", env_root.display()))
            .with_source(output.failure_message()));
    }

    let console_runtime = layout.console_runtime(env_root);
    let command = ToolCommand::new(&console_runtime)
        .args(["-m", "ensurepip", "--upgrade", "--default-pip"])
        .timeout(INSTALL_TIMEOUT);
    let output = runner.run(&command)?;

    if !output.is_success() {
        return Err(ProvisionError::new(ProvisionErrorKind::EnvironmentCreation)
            .with_context("could not bootstrap pip")
            .with_source(output.failure_message()));
    }

    Ok(())
}

fn upgrade_installer(runner: &mut dyn ToolRunner, console_runtime: &Path) {
    let command = ToolCommand::new(console_runtime)
        .args([
            "-m",
            "pip",
            "install",
            "--disable-pip-version-check",
            "--upgrade",
            "pip",
        ])
        .timeout(INSTALL_TIMEOUT);

    match runner.run(&command) {
        Ok(output) if output.is_success() => {}
        Ok(output) => {
            tracing::warn!(outcome = ?output.outcome, "could not upgrade pip, continuing");
        }
        Err(error) => tracing::warn!(%error, "could not upgrade pip, continuing"),
    }
}

fn install_package(
    runner: &mut dyn ToolRunner,
    console_runtime: &Path,
    package: &PackageSpec,
) -> Result<(), ProvisionError> {
    tracing::info!(package = %package.name, "installing package");

    let command = ToolCommand::new(console_runtime)
        .args(["-m", "pip", "install", "--disable-pip-version-check"])
        .arg(&package.name)
        .timeout(INSTALL_TIMEOUT);
    let output = runner
        .run(&command)
        .prov_contextc(|| format!("package {}", package.name))?;

    if output.is_success() {
        Ok(())
    } else {
        Err(ProvisionError::new(ProvisionErrorKind::DependencyInstall)
            .with_context(format!("package {}", package.name))
            .with_source(output.failure_message()))
    }
}

/// Returns the probe script importing every package.
pub fn import_probe(packages: &[PackageSpec]) -> String {
    let mut code = String::new();

    for package in packages {
        code.push_str("import ");
        code.push_str(&package.import_name);
        code.push_str("; ");
    }

    code.push_str(&format!("print('{IMPORT_SENTINEL}')"));
    code
}

fn verify_imports(
    runner: &mut dyn ToolRunner,
    console_runtime: &Path,
    packages: &[PackageSpec],
) -> Result<(), ProvisionError> {
    tracing::debug!("verifying imports");

    let command = ToolCommand::new(console_runtime)
        .arg("-c")
        .arg(import_probe(packages))
        .timeout(QUERY_TIMEOUT * 4);
    let output = runner.run(&command)?;

    if output.is_success() && output.stdout.contains(IMPORT_SENTINEL) {
        Ok(())
    } else {
        Err(ProvisionError::new(ProvisionErrorKind::DependencyVerification)
            .with_source(output.failure_message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_probe() {
        let packages = [
            PackageSpec::new("PyQt5", "PyQt5.QtWidgets"),
            PackageSpec::new("Pillow", "PIL"),
        ];

        assert_eq!(
            import_probe(&packages),
            "import PyQt5.QtWidgets; import PIL; print('SWIFTSHOT_IMPORT_OK')"
        );
    }

    #[test]
    fn test_layouts() {
        let root = Path::new("venv");

        assert_eq!(
            EnvLayout::windows().console_runtime(root),
            root.join("Scripts").join("python.exe")
        );
        assert_eq!(
            EnvLayout::windows().windowed_runtime(root),
            Some(root.join("Scripts").join("pythonw.exe"))
        );
        assert_eq!(EnvLayout::posix().windowed_runtime(root), None);
    }

    #[test]
    fn test_validity_marker() {
        let dir = tempfile::tempdir().unwrap();
        let layout = EnvLayout::native();

        assert!(!layout.is_valid(dir.path()));

        let marker = layout.console_runtime(dir.path());
        std::fs::create_dir_all(marker.parent().unwrap()).unwrap();
        std::fs::write(&marker, b"").unwrap();

        assert!(layout.is_valid(dir.path()));
    }
}

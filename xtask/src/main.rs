use core::str;
use std::{
    io::Write,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use serde_json::Value;
use swiftshot_setup::{
    app::{AppProfile, PackageSpec},
    env::{ensure_environment, EnvLayout},
    icon::{ensure_icon, IconStatus},
    process::{SystemRunner, ToolCommand, ToolRunner, INSTALL_TIMEOUT},
    runtime::RuntimeLocator,
};

#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the single-file executable, the setup wizard, and the
    /// scriptable source package.
    Dist {
        /// Directory holding the app's entry script.
        #[arg(long)]
        source_dir: Option<PathBuf>,
        /// Extra arguments for building the setup tool.
        #[arg(long, short, default_value = "")]
        cargo_args: String,
        /// Skip the setup compiler.
        #[arg(long)]
        skip_wizard: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let args = Args::parse();

    match args.command {
        Command::Dist {
            source_dir,
            cargo_args,
            skip_wizard,
        } => dist(source_dir, cargo_args, skip_wizard),
    }
}

fn dist(source_dir: Option<PathBuf>, cargo_args: String, skip_wizard: bool) -> anyhow::Result<()> {
    let project_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR")?).join("..");
    let source_dir = source_dir.unwrap_or_else(|| project_dir.join("app"));
    let build_dir = project_dir.join("build");
    let dist_dir = build_dir.join("dist");
    let profile = AppProfile::swiftshot();

    anyhow::ensure!(
        source_dir.join(&profile.entry_script).is_file(),
        "entry script not found in {source_dir:?}"
    );

    let setup_tool = build_setup_tool(&cargo_args)?;

    let mut runner = SystemRunner::new();
    let python = provision_build_env(&mut runner, &profile, &build_dir)?;

    let icon = source_dir.join(profile.icon_file_name());
    if ensure_icon(&icon) == IconStatus::Missing {
        anyhow::bail!("could not generate {icon:?}");
    }

    for mode in ["--onefile", "--onedir"] {
        bundle(&mut runner, &python, &profile, &source_dir, &build_dir, &icon, mode)?;
    }

    package_sources(&profile, &source_dir, &setup_tool, &dist_dir.join("source"))?;

    if skip_wizard {
        tracing::info!("skipping setup compiler");
    } else {
        let script = build_dir.join("swiftshot.iss");
        std::fs::write(&script, inno_setup_script(&profile, &build_dir, &icon))?;
        compile_wizard(&mut runner, &script)?;
    }

    tracing::info!(?dist_dir, "done");

    Ok(())
}

/// Builds the setup tool and returns the path of its executable.
fn build_setup_tool(cargo_args: &str) -> anyhow::Result<PathBuf> {
    let cargo = std::env::var("CARGO")?;

    let mut args = vec![
        "build",
        "--release",
        "--message-format=json",
        "--package",
        "swiftshot-setup",
        "--bin",
        "swiftshot-setup",
    ];
    args.extend(cargo_args.split_whitespace());
    let output = std::process::Command::new(&cargo).args(args).output()?;
    let stdout = str::from_utf8(&output.stdout)?;

    if !output.status.success() {
        std::io::stdout().write_all(&output.stdout)?;
        std::io::stderr().write_all(&output.stderr)?;
        anyhow::bail!("setup tool build failed");
    }

    let mut executable_path = PathBuf::new();

    for line in stdout.lines() {
        let value = serde_json::from_str::<Value>(line)?;
        let reason = value
            .as_object()
            .and_then(|obj| obj.get("reason").and_then(|val| val.as_str()));
        let executable = value
            .as_object()
            .and_then(|obj| obj.get("executable").and_then(|val| val.as_str()));

        if reason == Some("compiler-artifact") {
            if let Some(executable) = executable {
                executable_path = PathBuf::from(executable);
            }
        }
    }

    anyhow::ensure!(executable_path.is_file(), "setup tool executable not found");

    Ok(executable_path)
}

/// Creates `build/venv` with the app packages plus the bundler.
fn provision_build_env(
    runner: &mut SystemRunner,
    profile: &AppProfile,
    build_dir: &Path,
) -> anyhow::Result<PathBuf> {
    let runtime = RuntimeLocator::system()
        .locate(runner, profile.min_runtime)
        .ok_or_else(|| anyhow::anyhow!("Python {} or newer is required", profile.min_runtime))?;

    let mut packages = profile.packages.clone();
    packages.push(PackageSpec::new("pyinstaller", "PyInstaller"));

    let layout = EnvLayout::native();
    let report = ensure_environment(runner, &layout, &runtime, &build_dir.join("venv"), &packages)?;

    Ok(report.console_runtime)
}

fn bundle(
    runner: &mut SystemRunner,
    python: &Path,
    profile: &AppProfile,
    source_dir: &Path,
    build_dir: &Path,
    icon: &Path,
    mode: &str,
) -> anyhow::Result<()> {
    let name = mode.trim_start_matches("--");
    let command = ToolCommand::new(python)
        .args(["-m", "PyInstaller", "--noconfirm", "--clean", "--noconsole", mode])
        .arg("--icon")
        .arg(icon)
        .arg("--name")
        .arg(&profile.display_name)
        .arg("--distpath")
        .arg(build_dir.join("dist").join(name))
        .arg("--workpath")
        .arg(build_dir.join("work").join(name))
        .arg("--specpath")
        .arg(build_dir)
        .arg(&profile.entry_script)
        .current_dir(source_dir)
        .timeout(INSTALL_TIMEOUT);

    tracing::info!(%command, "bundling");
    let output = runner.run(&command)?;

    if !output.is_success() {
        std::io::stderr().write_all(output.combined().as_bytes())?;
        anyhow::bail!("bundler failed in {mode} mode");
    }

    Ok(())
}

/// Copies the app sources and the setup tool for scripted installs.
fn package_sources(
    profile: &AppProfile,
    source_dir: &Path,
    setup_tool: &Path,
    target: &Path,
) -> anyhow::Result<()> {
    tracing::info!(?target, "packaging sources");
    copy_tree(source_dir, target)?;

    let file_name = setup_tool
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("setup tool has no file name"))?;
    std::fs::copy(setup_tool, target.join(file_name))?;

    let mut buf = b"// Read by swiftshot-setup from its own directory.\n".to_vec();
    profile.to_writer(&mut buf)?;
    std::fs::write(target.join(swiftshot_setup::app::PROFILE_FILE_NAME), buf)?;

    Ok(())
}

fn copy_tree(source: &Path, target: &Path) -> anyhow::Result<()> {
    let walker = walkdir::WalkDir::new(source)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != "__pycache__" && entry.file_name() != "venv");

    for entry in walker {
        let entry = entry?;
        let destination = target.join(entry.path().strip_prefix(source)?);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else {
            std::fs::copy(entry.path(), &destination)?;
        }
    }

    Ok(())
}

fn inno_setup_script(profile: &AppProfile, build_dir: &Path, icon: &Path) -> String {
    let name = &profile.display_name;
    let version = &profile.display_version;
    let bundle_dir = build_dir.join("dist").join("onedir").join(name);
    let exe = format!("{{app}}\\{name}.exe");

    let lines = [
        "[Setup]".to_string(),
        // A leading "{{" escapes the brace in Inno Setup.
        format!("AppId={{{{{}}}", profile.app_id.uuid().hyphenated()),
        format!("AppName={name}"),
        format!("AppVersion={version}"),
        format!("AppPublisher={}", profile.publisher),
        format!("DefaultDirName={{localappdata}}\\Programs\\{name}"),
        format!("DefaultGroupName={name}"),
        "PrivilegesRequired=lowest".to_string(),
        format!("OutputDir={}", build_dir.join("dist").display()),
        format!("OutputBaseFilename={name}-{version}-setup"),
        format!("SetupIconFile={}", icon.display()),
        format!("UninstallDisplayIcon={exe}"),
        "Compression=lzma2".to_string(),
        "SolidCompression=yes".to_string(),
        "WizardStyle=modern".to_string(),
        String::new(),
        "[Tasks]".to_string(),
        "Name: \"desktopicon\"; Description: \"Create a desktop shortcut\"".to_string(),
        "Name: \"startup\"; Description: \"Start at login\"; Flags: unchecked".to_string(),
        String::new(),
        "[Files]".to_string(),
        format!(
            "Source: \"{}\\*\"; DestDir: \"{{app}}\"; Flags: ignoreversion recursesubdirs createallsubdirs",
            bundle_dir.display()
        ),
        String::new(),
        "[Icons]".to_string(),
        format!("Name: \"{{group}}\\{name}\"; Filename: \"{exe}\""),
        format!("Name: \"{{group}}\\Uninstall {name}\"; Filename: \"{{uninstallexe}}\""),
        format!("Name: \"{{autodesktop}}\\{name}\"; Filename: \"{exe}\"; Tasks: desktopicon"),
        format!("Name: \"{{userstartup}}\\{name}\"; Filename: \"{exe}\"; Tasks: startup"),
        String::new(),
        "[Run]".to_string(),
        format!(
            "Filename: \"{exe}\"; Description: \"Launch {name}\"; Flags: nowait postinstall skipifsilent"
        ),
        String::new(),
    ];

    lines.join("\r\n")
}

fn compile_wizard(runner: &mut SystemRunner, script: &Path) -> anyhow::Result<()> {
    let command = ToolCommand::new("ISCC")
        .arg("/Q")
        .arg(script)
        .timeout(INSTALL_TIMEOUT);

    tracing::info!(%command, "compiling setup wizard");
    let output = runner.run(&command)?;

    if !output.is_success() {
        std::io::stderr().write_all(output.combined().as_bytes())?;
        anyhow::bail!("setup compiler failed: {:?}", output.outcome);
    }

    Ok(())
}

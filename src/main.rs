//! Command line entry point.
use std::{fs::File, path::PathBuf, process::ExitCode, sync::Mutex};

use clap::Parser;
use swiftshot_setup::{
    app::{AppProfile, PROFILE_FILE_NAME},
    error::format_error,
    inst::InstallConfig,
    uninst::UninstallConfig,
    Mode, Toolbox,
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Installs or removes SwiftShot and its Python environment.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Install root (default: the directory of this program).
    #[arg(long, value_name = "PATH")]
    install_dir: Option<PathBuf>,

    /// Do not create desktop and start menu shortcuts.
    #[arg(long)]
    no_shortcuts: bool,

    /// Also start SwiftShot at login.
    #[arg(long)]
    add_to_startup: bool,

    /// Remove SwiftShot instead of installing it.
    #[arg(long)]
    uninstall: bool,

    /// Never prompt, and do not launch SwiftShot afterwards.
    #[arg(long)]
    quiet: bool,

    /// Application profile in RON format.
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Show debug messages on the console.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(error) = init_logging(args.verbose) {
        eprintln!("could not set up logging: {error}");
    }

    match main2(&args) {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            tracing::error!(?error, "main error");
            eprintln!("error: {error:#}");
            ExitCode::from(swiftshot_setup::EXIT_FATAL as u8)
        }
    }
}

fn main2(args: &Args) -> anyhow::Result<u8> {
    let install_dir = match &args.install_dir {
        Some(path) => std::path::absolute(path)?,
        None => swiftshot_setup::os::current_exe_dir()?,
    };

    let profile = load_profile(args, &install_dir)?;

    let mode = if args.uninstall {
        Mode::Uninstall(UninstallConfig::new(&install_dir))
    } else {
        let mut config = InstallConfig::new(&install_dir);
        config.create_shortcuts = !args.no_shortcuts;
        config.add_to_startup = args.add_to_startup;
        config.quiet = args.quiet;
        Mode::Install(config)
    };

    let mut toolbox = Toolbox::native();
    let result = swiftshot_setup::run(&profile, &mode, &mut toolbox);

    if let Err(error) = &result {
        tracing::error!(error = %format_error(error), "setup failed");
        eprintln!("Setup failed: {}", format_error(error));

        if let Some(hint) = error.remediation() {
            eprintln!("Hint: {hint}");
        }
    }

    Ok(swiftshot_setup::exit_code(&result) as u8)
}

/// Picks the profile from `--profile`, the install root, or the built-in one.
///
/// A broken profile stops an install. Uninstall falls back to the built-in
/// profile so it can always run.
fn load_profile(args: &Args, install_dir: &std::path::Path) -> anyhow::Result<AppProfile> {
    let path = match &args.profile {
        Some(path) => Some(path.clone()),
        None => Some(install_dir.join(PROFILE_FILE_NAME)).filter(|path| path.is_file()),
    };

    let Some(path) = path else {
        return Ok(AppProfile::swiftshot());
    };

    tracing::info!(?path, "loading profile");

    match AppProfile::load(&path) {
        Ok(profile) => Ok(profile),
        Err(error) if args.uninstall => {
            tracing::warn!(error = %format_error(&error), "using built-in profile");
            Ok(AppProfile::swiftshot())
        }
        Err(error) => Err(error.into()),
    }
}

/// Logs to the console and to a trace file in the temp directory.
fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_level);

    let log_filename = format!("swiftshot-setup_{}.log", whoami::username());
    let log_file = File::options()
        .create(true)
        .append(true)
        .open(tempfile::env::temp_dir().join(log_filename));

    let file_layer = log_file.ok().map(|log_file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(log_file))
            .with_filter(LevelFilter::TRACE)
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

//! Fakes standing in for the runtime, package manager and shell.
#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::{BTreeSet, HashMap, HashSet},
    path::{Path, PathBuf},
    rc::Rc,
};

use swiftshot_setup::{
    app::{AppProfile, PackageSpec},
    env::EnvLayout,
    error::ProvisionError,
    inst::InstallConfig,
    os::ShellFolders,
    process::{ToolCommand, ToolOutcome, ToolOutput, ToolRunner},
    prompt::FixedAnswer,
    runtime::{RuntimeCandidate, RuntimeLocator},
    shortcut::{ShortcutFacility, ShortcutSpec},
    uninst::UninstallConfig,
    Toolbox,
};
use tempfile::TempDir;

/// Directory inside a fake environment where installed packages are marked.
const FAKE_SITE: &str = "fake-site";

#[derive(Debug, Default)]
pub struct FakeState {
    /// Runtimes reachable by name, with their `--version` output.
    pub runtimes: HashMap<String, String>,
    /// Whether `winget` exists.
    pub package_manager_available: bool,
    /// Set once `winget` installed a runtime that is not yet on the search path.
    pub pending_runtime: bool,
    pub refresh_count: usize,
    /// Number of `-m venv` calls that fail before one succeeds.
    pub venv_failures: usize,
    pub failing_packages: HashSet<String>,
    pub verification_fails: bool,
    pub packages: Vec<PackageSpec>,
    pub layout: Option<EnvLayout>,
    pub calls: Vec<String>,
    pub spawned: Vec<String>,
}

impl FakeState {
    pub fn with_runtime(mut self, name: &str, version_output: &str) -> Self {
        self.runtimes
            .insert(name.to_string(), version_output.to_string());
        self
    }

    pub fn calls_matching(&self, needle: &str) -> Vec<&String> {
        self.calls
            .iter()
            .filter(|call| call.contains(needle))
            .collect()
    }
}

#[derive(Clone)]
pub struct FakeRunner {
    pub state: Rc<RefCell<FakeState>>,
}

fn reply(outcome: ToolOutcome) -> ToolOutput {
    ToolOutput::new(outcome)
}

fn env_root_of(program: &Path) -> PathBuf {
    program
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"").unwrap();
}

impl FakeRunner {
    fn create_env(&self, command: &ToolCommand) -> ToolOutput {
        let mut state = self.state.borrow_mut();

        if state.venv_failures > 0 {
            state.venv_failures -= 1;
            return reply(ToolOutcome::ExitCode(1)).with_stderr("Error: venv module is broken");
        }

        let root = PathBuf::from(command.get_args().last().unwrap());
        let layout = state.layout.unwrap_or(EnvLayout::native());

        touch(&layout.console_runtime(&root));
        if let Some(windowed) = layout.windowed_runtime(&root) {
            touch(&windowed);
        }

        reply(ToolOutcome::Success)
    }

    fn pip_install(&self, command: &ToolCommand) -> ToolOutput {
        if command.has_arg("--upgrade") {
            return reply(ToolOutcome::Success);
        }

        let package = command
            .get_args()
            .last()
            .unwrap()
            .to_string_lossy()
            .to_string();

        if self.state.borrow().failing_packages.contains(&package) {
            return reply(ToolOutcome::ExitCode(1)).with_stderr(format!(
                "ERROR: No matching distribution found for {package}"
            ));
        }

        let root = env_root_of(Path::new(command.program()));
        touch(&root.join(FAKE_SITE).join(&package));

        reply(ToolOutcome::Success).with_stdout(format!("Successfully installed {package}"))
    }

    fn probe(&self, command: &ToolCommand) -> ToolOutput {
        let state = self.state.borrow();

        if state.verification_fails {
            return reply(ToolOutcome::ExitCode(1))
                .with_stderr("ModuleNotFoundError: No module named 'PIL'");
        }

        let args = command.get_args();
        let position = args.iter().position(|arg| arg == "-c").unwrap();
        let code = args[position + 1].to_string_lossy().to_string();
        let root = env_root_of(Path::new(command.program()));

        for statement in code.split(';') {
            let Some(import) = statement.trim().strip_prefix("import ") else {
                continue;
            };
            let package = state
                .packages
                .iter()
                .find(|package| package.import_name == import)
                .map(|package| package.name.clone())
                .unwrap_or_else(|| import.to_string());

            if !root.join(FAKE_SITE).join(&package).is_file() {
                return reply(ToolOutcome::ExitCode(1))
                    .with_stderr(format!("ModuleNotFoundError: No module named '{import}'"));
            }
        }

        let sentinel = code
            .rsplit("print('")
            .next()
            .unwrap()
            .trim_end_matches("')");

        reply(ToolOutcome::Success).with_stdout(format!("{sentinel}\n"))
    }
}

impl ToolRunner for FakeRunner {
    fn run(&mut self, command: &ToolCommand) -> Result<ToolOutput, ProvisionError> {
        self.state.borrow_mut().calls.push(command.to_string());
        let program = command.program().to_string_lossy().to_string();

        if command.has_arg("--version") {
            let state = self.state.borrow();
            return Ok(match state.runtimes.get(&program) {
                Some(text) => reply(ToolOutcome::Success).with_stdout(text.clone()),
                None => reply(ToolOutcome::NotFound),
            });
        }

        if program == "winget" {
            let mut state = self.state.borrow_mut();
            if !state.package_manager_available {
                return Ok(reply(ToolOutcome::NotFound));
            }
            state.pending_runtime = true;
            return Ok(reply(ToolOutcome::Success));
        }

        if command.has_arg("venv") {
            return Ok(self.create_env(command));
        }
        if command.has_arg("ensurepip") {
            return Ok(reply(ToolOutcome::Success));
        }
        if command.has_arg("pip") {
            return Ok(self.pip_install(command));
        }
        if command.has_arg("-c") {
            return Ok(self.probe(command));
        }

        Ok(reply(ToolOutcome::NotFound))
    }

    fn spawn_detached(&mut self, command: &ToolCommand) -> Result<(), ProvisionError> {
        self.state.borrow_mut().spawned.push(command.to_string());
        Ok(())
    }

    fn refresh_search_path(&mut self) {
        let mut state = self.state.borrow_mut();
        state.refresh_count += 1;

        if state.pending_runtime {
            state
                .runtimes
                .insert("python".to_string(), "Python 3.12.1".to_string());
        }
    }
}

/// Writes a small file at each shortcut path and records the spec.
#[derive(Clone, Default)]
pub struct FakeShortcuts {
    pub created: Rc<RefCell<Vec<ShortcutSpec>>>,
}

impl ShortcutFacility for FakeShortcuts {
    fn create(&mut self, spec: &ShortcutSpec) -> Result<(), ProvisionError> {
        std::fs::create_dir_all(spec.path.parent().unwrap())?;
        std::fs::write(&spec.path, spec.target.to_string_lossy().as_bytes())?;
        self.created.borrow_mut().push(spec.clone());
        Ok(())
    }
}

/// A temporary machine: an install directory holding the app's entry
/// script and a home directory holding the shell folders.
pub struct Machine {
    pub root: TempDir,
    pub install_dir: PathBuf,
    pub folders: ShellFolders,
    pub profile: AppProfile,
    pub state: Rc<RefCell<FakeState>>,
    pub shortcuts: FakeShortcuts,
}

impl Machine {
    pub fn new(state: FakeState) -> Self {
        let root = tempfile::tempdir().unwrap();
        let install_dir = root.path().join("SwiftShot");
        let home = root.path().join("home");
        let profile = AppProfile::swiftshot();

        std::fs::create_dir_all(&install_dir).unwrap();
        std::fs::write(install_dir.join("main.py"), b"print('SwiftShot')\n").unwrap();

        let folders = ShellFolders::new(
            home.join("Desktop"),
            home.join("Programs"),
            home.join("Programs").join("Startup"),
        );

        let mut state = state;
        state.packages = profile.packages.clone();

        Self {
            root,
            install_dir,
            folders,
            profile,
            state: Rc::new(RefCell::new(state)),
            shortcuts: FakeShortcuts::default(),
        }
    }

    /// A machine with `python` 3.11 on the search path.
    pub fn with_python() -> Self {
        Self::new(FakeState::default().with_runtime("python", "Python 3.11.9"))
    }

    pub fn toolbox(&self, launch_answer: bool) -> Toolbox {
        Toolbox {
            runner: Box::new(FakeRunner {
                state: self.state.clone(),
            }),
            shortcuts: Box::new(self.shortcuts.clone()),
            prompt: Box::new(FixedAnswer(launch_answer)),
            folders: Some(self.folders.clone()),
            env_vars: None,
            locator: RuntimeLocator::new(vec![
                RuntimeCandidate::command("python"),
                RuntimeCandidate::command("python3"),
            ]),
            package_manager: None,
            layout: EnvLayout::native(),
            console: Box::new(std::io::sink()),
        }
    }

    pub fn install_config(&self) -> InstallConfig {
        let mut config = InstallConfig::new(&self.install_dir);
        config.quiet = true;
        config.register_uninstall_entry = false;
        config.tool_path = Some(self.install_dir.join("swiftshot-setup"));
        config
    }

    pub fn uninstall_config(&self) -> UninstallConfig {
        let mut config = UninstallConfig::new(&self.install_dir);
        config.remove_uninstall_entry = false;
        config
    }

    pub fn env_root(&self) -> PathBuf {
        self.install_dir.join("venv")
    }

    pub fn icon(&self) -> PathBuf {
        self.install_dir.join("swiftshot.ico")
    }

    /// Every file below the machine root, relative to it.
    pub fn files(&self) -> BTreeSet<PathBuf> {
        let base = self.root.path();

        walkdir::WalkDir::new(base)
            .into_iter()
            .map(|entry| entry.unwrap())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path().strip_prefix(base).unwrap().to_path_buf())
            .collect()
    }
}

mod common;

use std::collections::HashMap;

use common::{FakeState, Machine};
use swiftshot_setup::{
    env::{EnvDisposition, EnvLayout},
    error::ProvisionErrorKind,
    icon::IconStatus,
    receipt::InstallReceipt,
    Mode, RunOutcome, EXIT_FATAL, EXIT_SUCCESS,
};

fn installed(outcome: RunOutcome) -> (swiftshot_setup::inst::InstallSummary, bool) {
    match outcome {
        RunOutcome::Installed { summary, launched } => (summary, launched),
        RunOutcome::Uninstalled(_) => panic!("expected an install"),
    }
}

#[test_log::test]
fn test_fresh_machine() {
    let machine = Machine::new(FakeState {
        package_manager_available: true,
        ..Default::default()
    });
    let mut toolbox = machine.toolbox(false);
    let mode = Mode::Install(machine.install_config());

    let result = swiftshot_setup::run(&machine.profile, &mode, &mut toolbox);
    assert_eq!(swiftshot_setup::exit_code(&result), EXIT_SUCCESS);
    let (summary, launched) = installed(result.unwrap());

    let state = machine.state.borrow();
    assert_eq!(state.calls_matching("winget").len(), 1);
    assert_eq!(state.refresh_count, 1);
    assert_eq!(summary.runtime.version().to_string(), "3.12");

    assert_eq!(summary.environment.disposition, EnvDisposition::Created);
    assert_eq!(summary.environment.installed, vec!["PyQt5", "Pillow"]);
    assert!(EnvLayout::native().is_valid(&machine.env_root()));

    assert_eq!(summary.icon_status, IconStatus::Generated);
    assert!(machine.icon().is_file());
    assert!(summary.launchers.launchers.visible.is_file());
    assert!(summary.launchers.launchers.silent.is_file());

    assert_eq!(summary.shortcuts.len(), 3);
    assert_eq!(summary.shortcuts_requested, 3);
    for path in &summary.shortcuts {
        assert!(path.is_file(), "{path:?}");
    }
    assert!(!summary.shortcuts.iter().any(|path| path.starts_with(&machine.folders.startup)));

    assert!(summary.receipt.is_file());
    assert!(!launched);
    assert!(state.spawned.is_empty());
}

#[test_log::test]
fn test_install_is_idempotent() {
    let machine = Machine::with_python();
    let mode = Mode::Install(machine.install_config());

    let first = swiftshot_setup::run(&machine.profile, &mode, &mut machine.toolbox(false));
    let (first, _) = installed(first.unwrap());
    let files_after_first = machine.files();
    let calls_after_first = machine.state.borrow().calls.len();

    let second = swiftshot_setup::run(&machine.profile, &mode, &mut machine.toolbox(false));
    let (second, _) = installed(second.unwrap());

    assert_eq!(first.environment.disposition, EnvDisposition::Created);
    assert_eq!(second.environment.disposition, EnvDisposition::Reused);
    assert!(second.environment.installed.is_empty());
    assert_eq!(second.icon_status, IconStatus::Existing);
    assert_eq!(first.shortcuts, second.shortcuts);
    assert_eq!(machine.files(), files_after_first);

    let state = machine.state.borrow();
    let second_calls = &state.calls[calls_after_first..];
    assert!(!second_calls.iter().any(|call| call.contains(" venv")));
    assert!(!second_calls.iter().any(|call| call.contains("pip install")));
}

#[test_log::test]
fn test_incomplete_environment_is_recreated() {
    let machine = Machine::with_python();
    let leftover = machine.env_root().join("leftover.txt");
    std::fs::create_dir_all(machine.env_root()).unwrap();
    std::fs::write(&leftover, b"half-written").unwrap();

    let mode = Mode::Install(machine.install_config());
    let result = swiftshot_setup::run(&machine.profile, &mode, &mut machine.toolbox(false));
    let (summary, _) = installed(result.unwrap());

    assert_eq!(summary.environment.disposition, EnvDisposition::Recreated);
    assert_eq!(summary.environment.installed.len(), 2);
    assert!(!leftover.exists());
    assert!(EnvLayout::native().is_valid(&machine.env_root()));
}

#[test_log::test]
fn test_reused_environment_missing_package_is_repaired() {
    let machine = Machine::with_python();
    let mode = Mode::Install(machine.install_config());

    swiftshot_setup::run(&machine.profile, &mode, &mut machine.toolbox(false)).unwrap();
    std::fs::remove_file(machine.env_root().join("fake-site").join("Pillow")).unwrap();

    let result = swiftshot_setup::run(&machine.profile, &mode, &mut machine.toolbox(false));
    let (summary, _) = installed(result.unwrap());

    assert_eq!(summary.environment.disposition, EnvDisposition::Reused);
    assert_eq!(summary.environment.installed, vec!["PyQt5", "Pillow"]);
}

#[test_log::test]
fn test_runtime_version_gating() {
    let machine = Machine::new(
        FakeState::default()
            .with_runtime("python", "Python 3.7.9")
            .with_runtime("python3", "Python 3.11.2"),
    );
    let mode = Mode::Install(machine.install_config());

    let result = swiftshot_setup::run(&machine.profile, &mode, &mut machine.toolbox(false));
    let (summary, _) = installed(result.unwrap());

    assert_eq!(summary.runtime.program().to_string_lossy(), "python3");

    let state = machine.state.borrow();
    assert!(state.calls_matching("winget").is_empty());
    assert_eq!(state.calls_matching("python3 -m venv").len(), 1);
    assert!(state
        .calls
        .iter()
        .all(|call| !call.starts_with("python -m venv")));
}

#[test_log::test]
fn test_package_failure_is_fatal() {
    let mut state = FakeState::default().with_runtime("python", "Python 3.11.9");
    state.failing_packages.insert("Pillow".to_string());
    let machine = Machine::new(state);
    let mode = Mode::Install(machine.install_config());

    let result = swiftshot_setup::run(&machine.profile, &mode, &mut machine.toolbox(false));
    assert_eq!(swiftshot_setup::exit_code(&result), EXIT_FATAL);

    let error = result.unwrap_err();
    assert!(matches!(error.kind(), ProvisionErrorKind::DependencyInstall));
    assert!(error.to_string().contains("Pillow"), "{error}");

    let state = machine.state.borrow();
    assert_eq!(state.calls_matching("install --disable-pip-version-check PyQt5").len(), 1);
    assert_eq!(state.calls_matching("install --disable-pip-version-check Pillow").len(), 1);
    assert!(state.calls_matching(" -c ").is_empty());

    assert!(!machine.icon().exists());
    assert!(!InstallReceipt::path_in(&machine.install_dir).exists());
    assert!(machine.shortcuts.created.borrow().is_empty());
    assert!(!machine.folders.desktop.exists());
}

#[test_log::test]
fn test_verification_failure_is_fatal() {
    let machine = Machine::new(FakeState {
        verification_fails: true,
        ..FakeState::default().with_runtime("python", "Python 3.11.9")
    });
    let mode = Mode::Install(machine.install_config());

    let result = swiftshot_setup::run(&machine.profile, &mode, &mut machine.toolbox(false));

    assert_eq!(swiftshot_setup::exit_code(&result), EXIT_FATAL);
    assert!(matches!(
        result.unwrap_err().kind(),
        ProvisionErrorKind::DependencyVerification
    ));
    assert!(!machine.icon().exists());
}

#[test_log::test]
fn test_no_runtime_and_no_package_manager() {
    let machine = Machine::new(FakeState::default());
    let mode = Mode::Install(machine.install_config());

    let result = swiftshot_setup::run(&machine.profile, &mode, &mut machine.toolbox(false));
    assert_eq!(swiftshot_setup::exit_code(&result), EXIT_FATAL);

    let error = result.unwrap_err();
    assert!(matches!(
        error.kind(),
        ProvisionErrorKind::PackageManagerUnavailable
    ));
    assert!(error.remediation().unwrap().contains("python.org"));
    assert!(!machine.env_root().exists());
}

#[test_log::test]
fn test_no_shortcuts() {
    let machine = Machine::with_python();
    let mut config = machine.install_config();
    config.create_shortcuts = false;

    let result = swiftshot_setup::run(
        &machine.profile,
        &Mode::Install(config),
        &mut machine.toolbox(false),
    );
    let (summary, _) = installed(result.unwrap());

    assert!(summary.shortcuts.is_empty());
    assert_eq!(summary.shortcuts_requested, 0);
    assert!(machine.shortcuts.created.borrow().is_empty());
    assert!(summary.launchers.launchers.silent.is_file());
}

#[test_log::test]
fn test_launch_offered_unless_quiet() {
    let machine = Machine::with_python();
    let mut config = machine.install_config();

    let result = swiftshot_setup::run(
        &machine.profile,
        &Mode::Install(config.clone()),
        &mut machine.toolbox(true),
    );
    let (_, launched) = installed(result.unwrap());
    assert!(!launched);
    assert!(machine.state.borrow().spawned.is_empty());

    config.quiet = false;
    let result = swiftshot_setup::run(
        &machine.profile,
        &Mode::Install(config),
        &mut machine.toolbox(true),
    );
    let (summary, launched) = installed(result.unwrap());
    assert!(launched);

    let state = machine.state.borrow();
    assert_eq!(state.spawned.len(), 1);
    assert_eq!(
        state.spawned[0],
        summary.launchers.launchers.silent_command().to_string()
    );
}

#[test_log::test]
fn test_receipt_records_install() {
    let machine = Machine::with_python();
    let mut config = machine.install_config();
    config.add_to_startup = true;

    swiftshot_setup::run(
        &machine.profile,
        &Mode::Install(config),
        &mut machine.toolbox(false),
    )
    .unwrap();

    let receipt = InstallReceipt::load(InstallReceipt::path_in(&machine.install_dir)).unwrap();

    assert_eq!(receipt.app_id, machine.profile.app_id);
    assert_eq!(receipt.env_root, machine.env_root());
    assert_eq!(receipt.icon.as_deref(), Some(machine.icon().as_path()));
    assert_eq!(receipt.shortcuts.len(), 4);
    assert!(receipt.add_to_startup);
    assert!(!receipt.uninstall_entry);
}

#[test_log::test]
fn test_environment_creation_fallback() {
    let machine = Machine::new(FakeState {
        venv_failures: 1,
        ..FakeState::default().with_runtime("python", "Python 3.11.9")
    });
    let mode = Mode::Install(machine.install_config());

    let result = swiftshot_setup::run(&machine.profile, &mode, &mut machine.toolbox(false));
    assert_eq!(swiftshot_setup::exit_code(&result), EXIT_SUCCESS);
    let (summary, _) = installed(result.unwrap());

    assert_eq!(summary.environment.disposition, EnvDisposition::Created);
    assert_eq!(summary.environment.installed, vec!["PyQt5", "Pillow"]);

    let state = machine.state.borrow();
    assert_eq!(state.calls_matching("-m venv").len(), 2);
    assert_eq!(state.calls_matching("-m venv --without-pip").len(), 1);
    assert_eq!(state.calls_matching("-m ensurepip").len(), 1);
}

#[test_log::test]
fn test_environment_creation_fails_twice() {
    let machine = Machine::new(FakeState {
        venv_failures: 2,
        ..FakeState::default().with_runtime("python", "Python 3.11.9")
    });
    let mode = Mode::Install(machine.install_config());

    let result = swiftshot_setup::run(&machine.profile, &mode, &mut machine.toolbox(false));
    assert_eq!(swiftshot_setup::exit_code(&result), EXIT_FATAL);
    assert!(matches!(
        result.unwrap_err().kind(),
        ProvisionErrorKind::EnvironmentCreation
    ));

    let state = machine.state.borrow();
    assert_eq!(state.calls_matching("-m venv").len(), 2);
    assert!(state.calls_matching("ensurepip").is_empty());
    assert!(state.calls_matching("pip install").is_empty());
    assert!(!machine.icon().exists());
}

#[test_log::test]
fn test_shell_folders_unavailable_skips_shortcuts() {
    let machine = Machine::with_python();
    let mut toolbox = machine.toolbox(false);
    toolbox.folders = None;
    toolbox.env_vars = Some(HashMap::new());

    let result = swiftshot_setup::run(
        &machine.profile,
        &Mode::Install(machine.install_config()),
        &mut toolbox,
    );
    assert_eq!(swiftshot_setup::exit_code(&result), EXIT_SUCCESS);
    let (summary, _) = installed(result.unwrap());

    assert!(summary.shortcuts.is_empty());
    assert!(machine.shortcuts.created.borrow().is_empty());
    assert!(summary.launchers.launchers.silent.is_file());
    assert!(machine.icon().is_file());
    assert!(summary.receipt.is_file());
}

#[test_log::test]
fn test_reinstall_drops_unrequested_shortcuts() {
    let machine = Machine::with_python();
    let mut config = machine.install_config();
    config.add_to_startup = true;

    let result = swiftshot_setup::run(
        &machine.profile,
        &Mode::Install(config.clone()),
        &mut machine.toolbox(false),
    );
    let (with_startup, _) = installed(result.unwrap());
    let startup = with_startup
        .shortcuts
        .iter()
        .find(|path| path.starts_with(&machine.folders.startup))
        .unwrap()
        .clone();
    assert!(startup.is_file());

    config.add_to_startup = false;
    let result = swiftshot_setup::run(
        &machine.profile,
        &Mode::Install(config.clone()),
        &mut machine.toolbox(false),
    );
    let (without_startup, _) = installed(result.unwrap());

    assert!(!startup.exists());
    assert_eq!(without_startup.shortcuts.len(), 3);
    for path in &without_startup.shortcuts {
        assert!(path.is_file(), "{path:?}");
    }

    config.create_shortcuts = false;
    swiftshot_setup::run(
        &machine.profile,
        &Mode::Install(config),
        &mut machine.toolbox(false),
    )
    .unwrap();

    for path in &with_startup.shortcuts {
        assert!(!path.exists(), "{path:?}");
    }
}

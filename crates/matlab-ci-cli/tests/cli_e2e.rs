//! End-to-end CLI tests using `assert_cmd`
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to get cargo binary or fail test
fn cargo_bin() -> Command {
    Command::cargo_bin("matlab-ci").unwrap_or_else(|err| panic!("Binary not found: {err}"))
}

/// Helper to create temp dir or fail test
fn temp_dir() -> TempDir {
    TempDir::new().unwrap_or_else(|err| panic!("Failed to create temp dir: {err}"))
}

/// Writes a MATLAB root reporting `version` and returns its path.
fn fake_matlab_root(temp: &TempDir, version: &str) -> PathBuf {
    let root = temp.path().join("MATLAB").join(version);
    fs::create_dir_all(&root).unwrap_or_else(|err| panic!("Failed to create root: {err}"));
    fs::write(
        root.join("VersionInfo.xml"),
        format!("<MathWorks_version_info>\n  <version>{version}</version>\n</MathWorks_version_info>\n"),
    )
    .unwrap_or_else(|err| panic!("Failed to write VersionInfo.xml: {err}"));
    root
}

/// Writes a config file and returns its path.
fn write_config(temp: &TempDir, body: &str) -> PathBuf {
    let path = temp.path().join("config.toml");
    fs::write(&path, body).unwrap_or_else(|err| panic!("Failed to write config: {err}"));
    path
}

fn root_arg(root: &Path) -> String {
    root.to_string_lossy().into_owned()
}

#[test]
fn test_cli_help() {
    cargo_bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("run-tests"));
}

#[test]
fn test_cli_invalid_command() {
    cargo_bin().arg("invalid-command-xyz").assert().failure();
}

#[test]
fn test_version_lists_capabilities() {
    let temp = temp_dir();
    let root = fake_matlab_root(&temp, "9.14.0.2206163");
    let config = write_config(&temp, "");

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .args(["--matlab-root", &root_arg(&root), "version"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MATLAB 9.14.0.2206163"))
        .stdout(predicate::str::contains("the -batch switch: supported"));
}

#[test]
fn test_version_of_legacy_release() {
    let temp = temp_dir();
    let root = fake_matlab_root(&temp, "9.4.0.813654");
    let config = write_config(&temp, "");

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .args(["--matlab-root", &root_arg(&root), "version"])
        .assert()
        .success()
        .stdout(predicate::str::contains("the -batch switch: not supported"))
        .stdout(predicate::str::contains("the -noAppIcon switch: supported"));
}

#[test]
fn test_version_json() {
    let temp = temp_dir();
    let root = fake_matlab_root(&temp, "9.5.0.944444");
    let config = write_config(&temp, "");

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .args(["--matlab-root", &root_arg(&root), "version", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"major\": 9"))
        .stdout(predicate::str::contains("\"BatchMode\""))
        .stdout(predicate::str::contains("SimulinkTestResults").not());
}

#[test]
fn test_version_with_missing_root() {
    let temp = temp_dir();
    let config = write_config(&temp, "");
    let missing = temp.path().join("no-matlab-here");

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .args(["--matlab-root", &root_arg(&missing), "version"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unable to find MATLAB version information"));
}

#[test]
fn test_unknown_installation_name() {
    let temp = temp_dir();
    let config = write_config(&temp, "");

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .args(["--installation", "R2099z", "version"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No installation named 'R2099z'"));
}

#[test]
fn test_no_matlab_selected() {
    let temp = temp_dir();
    let config = write_config(&temp, "");

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .env_remove("MATLAB_VERSION")
        .env_remove("matlabroot")
        .arg("version")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No MATLAB selected"));
}

#[test]
fn test_matrix_axis_selects_installation() {
    let temp = temp_dir();
    let root = fake_matlab_root(&temp, "23.2.0.2365128");
    let config = write_config(
        &temp,
        &format!(
            "[[installations]]\nname = 'R2023b'\nroot = '{}'\n",
            root.display()
        ),
    );

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .env("MATLAB_VERSION", "R2023b")
        .env_remove("matlabroot")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("MATLAB 23.2.0.2365128"));
}

#[test]
fn test_invalid_config_file() {
    let temp = temp_dir();
    let config = write_config(&temp, "launch_mode = 42\n");

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .args(["--matlab-root", "/opt/matlab", "version"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_run_command_with_missing_root() {
    let temp = temp_dir();
    let resources = temp.path().join("resources");
    fs::create_dir_all(&resources).unwrap_or_else(|err| panic!("Failed to create dir: {err}"));
    let config = write_config(&temp, &format!("resources_dir = '{}'\n", resources.display()));
    let missing = temp.path().join("gone");

    cargo_bin()
        .arg("--config")
        .arg(&config)
        .args(["--matlab-root", &root_arg(&missing)])
        .args(["--workspace", &root_arg(temp.path())])
        .args(["run-command", "disp(1)"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Unable to find MATLAB version information"));

    assert!(
        !temp.path().join(".matlab").exists(),
        "No scratch directory should be created"
    );
}

#[cfg(unix)]
mod launcher {
    use super::*;
    use std::os::unix::fs::PermissionsExt as _;
    use std::sync::{Mutex, PoisonError};

    /// Freshly written executables cannot be exec'd while another test thread forks.
    static SERIAL: Mutex<()> = Mutex::new(());

    const FAKE_LAUNCHER: &str = r#"#!/bin/sh
echo "entry:$1"
if [ -n "$MW_MATLAB_TEMP_FOLDER" ]; then
  echo '{"taskDetails":[{"name":"check","failed":false,"skipped":false},{"name":"test","failed":false,"skipped":true,"skipReason":"UpToDate"}]}' > "$MW_MATLAB_TEMP_FOLDER/buildArtifact.json"
fi
exit "${FAKE_EXIT:-0}"
"#;

    struct Setup {
        temp: TempDir,
        config: PathBuf,
        root: PathBuf,
        workspace: PathBuf,
    }

    fn setup() -> Setup {
        let temp = temp_dir();
        let resources = temp.path().join("resources");
        for platform in ["glnxa64", "maci64", "maca64"] {
            let launcher = resources.join(platform).join("run-matlab-command");
            fs::create_dir_all(resources.join(platform))
                .unwrap_or_else(|err| panic!("Failed to create dir: {err}"));
            fs::write(&launcher, FAKE_LAUNCHER)
                .unwrap_or_else(|err| panic!("Failed to write launcher: {err}"));
            fs::set_permissions(&launcher, fs::Permissions::from_mode(0o755))
                .unwrap_or_else(|err| panic!("Failed to chmod launcher: {err}"));
        }
        fs::create_dir_all(resources.join("plugins/+ciplugins/+jenkins"))
            .unwrap_or_else(|err| panic!("Failed to create plugins: {err}"));
        fs::create_dir_all(resources.join("genscript"))
            .unwrap_or_else(|err| panic!("Failed to create genscript: {err}"));

        let workspace = temp.path().join("workspace");
        fs::create_dir_all(&workspace)
            .unwrap_or_else(|err| panic!("Failed to create workspace: {err}"));
        let config = write_config(
            &temp,
            &format!(
                "resources_dir = '{}'\nartifact_dir = '{}'\n",
                resources.display(),
                temp.path().join("artifacts").display()
            ),
        );
        let root = fake_matlab_root(&temp, "24.1.0.2537033");
        Setup {
            temp,
            config,
            root,
            workspace,
        }
    }

    fn run(setup: &Setup, args: &[&str]) -> Command {
        let mut command = cargo_bin();
        command
            .arg("--config")
            .arg(&setup.config)
            .args(["--matlab-root", &root_arg(&setup.root)])
            .args(["--workspace", &root_arg(&setup.workspace)])
            .args(args);
        command
    }

    #[test]
    fn test_run_build_reports_results() {
        let _guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        let setup = setup();

        run(&setup, &["run-build", "check", "test"])
            .assert()
            .success()
            .stdout(predicate::str::contains("entry:setenv('MW_ORIG_WORKING_FOLDER'"))
            .stdout(predicate::str::contains(
                "MATLAB build results: 2 task(s) run, 0 failed, 1 skipped",
            ));

        let artifacts: Vec<_> = fs::read_dir(setup.temp.path().join("artifacts"))
            .unwrap_or_else(|err| panic!("Artifacts dir missing: {err}"))
            .collect();
        assert_eq!(artifacts.len(), 1);
        let scratch = fs::read_dir(setup.workspace.join(".matlab"))
            .unwrap_or_else(|err| panic!("Scratch root missing: {err}"));
        assert_eq!(scratch.count(), 0, "Scratch directory should be removed");
    }

    #[test]
    fn test_exit_code_is_forwarded() {
        let _guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        let setup = setup();

        run(&setup, &["run-command", "exit(3)"])
            .env("FAKE_EXIT", "3")
            .assert()
            .code(3)
            .stdout(predicate::str::contains(
                "Received a nonzero exit code 3 while trying to run MATLAB.",
            ));
    }

    #[test]
    fn test_exit_code_survives_blocked_artifact_dir() {
        let _guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        let setup = setup();
        fs::write(setup.temp.path().join("artifacts"), "")
            .unwrap_or_else(|err| panic!("Failed to block artifact dir: {err}"));

        run(&setup, &["run-build", "test"])
            .env("FAKE_EXIT", "5")
            .assert()
            .code(5)
            .stdout(predicate::str::contains("Unable to save build results"))
            .stdout(predicate::str::contains(
                "Received a nonzero exit code 5 while trying to run MATLAB.",
            ));
    }

    #[test]
    fn test_run_tests_stages_genscript() {
        let _guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        let setup = setup();

        run(&setup, &["run-tests", "--junit", "results.xml"])
            .assert()
            .success()
            .stdout(predicate::str::contains("MATLAB build results").not());
    }
}

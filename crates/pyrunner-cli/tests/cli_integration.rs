//! CLI integration tests
//!
//! Tests the pyrunner CLI using assert_cmd.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn pyrunner() -> Command {
    Command::cargo_bin("pyrunner")
        .expect("Failed to locate pyrunner binary - ensure it's built before running tests")
}

/// A config file rooted in a temp dir, running scripts through `sh -c`
struct TestConfig {
    dir: TempDir,
    path: PathBuf,
}

impl TestConfig {
    fn new(shell: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("config.toml");
        let root = dir.path();

        let config = format!(
            r#"
bind_address = "127.0.0.1:0"
scripts_dir = "{}"
log_dir = "{}"
autoboot_file = "{}"
interpreter = "/bin/sh"
interpreter_args = ["-c", "{}"]
stop_grace_period = 200
"#,
            root.join("code").display(),
            root.join("logs").display(),
            root.join("autoboot.txt").display(),
            shell
        );
        std::fs::write(&path, config).expect("Failed to write config");
        std::fs::create_dir_all(root.join("code")).expect("Failed to create scripts dir");

        Self { dir, path }
    }

    fn script(&self, name: &str, source: &str) -> PathBuf {
        let path = self.dir.path().join("code").join(name);
        std::fs::write(&path, source).expect("Failed to write script");
        path
    }

    fn cmd(&self) -> Command {
        let mut cmd = pyrunner();
        cmd.arg("--config").arg(&self.path);
        cmd
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }
}

#[test]
fn test_cli_help() {
    pyrunner()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("pyrunner"))
        .stdout(predicate::str::contains("Python script manager"));
}

#[test]
fn test_cli_version() {
    pyrunner()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pyrunner"));
}

#[test]
fn test_cli_serve_help() {
    pyrunner()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("websocket"));
}

#[test]
fn test_cli_boot_help() {
    pyrunner()
        .args(["boot", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("autoboot"));
}

#[test]
fn test_cli_unknown_command() {
    pyrunner()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_validate_clean_script() {
    let config = TestConfig::new("true");
    let file = config.root().join("blink.py");
    std::fs::write(&file, "import time\nprint('on')\ntime.sleep(1)\n").unwrap();

    config
        .cmd()
        .arg("validate")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("blink.py is valid"));
}

#[test]
fn test_validate_blocked_script_fails() {
    let config = TestConfig::new("true");
    let file = config.root().join("net.py");
    std::fs::write(&file, "import socket\n").unwrap();

    config
        .cmd()
        .arg("validate")
        .arg(&file)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Line 1: Blocked import 'socket'"))
        .stderr(predicate::str::contains("1 security violation(s)"));
}

#[test]
fn test_validate_resolves_siblings_in_scripts_dir() {
    let config = TestConfig::new("true");
    let file = config.root().join("main.py");
    std::fs::write(&file, "import helper\nhelper.go()\n").unwrap();

    config
        .cmd()
        .arg("validate")
        .arg(&file)
        .assert()
        .success()
        .stderr(predicate::str::contains("Missing dependencies: helper"));

    config.script("helper.py", "def go():\n    pass\n");
    config
        .cmd()
        .arg("validate")
        .arg(&file)
        .assert()
        .success()
        .stderr(predicate::str::contains("Missing dependencies").not());
}

#[test]
fn test_validate_missing_file() {
    let config = TestConfig::new("true");
    config
        .cmd()
        .args(["validate", "does-not-exist.py"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_config_path_and_init() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pyrunner").join("config.toml");

    pyrunner()
        .arg("--config")
        .arg(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));

    pyrunner()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("bind_address = \"0.0.0.0:5000\""));

    pyrunner()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success()
        .stderr(predicate::str::contains("already exists"));

    pyrunner()
        .arg("--config")
        .arg(&path)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_config_show() {
    let config = TestConfig::new("true");
    config
        .cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("127.0.0.1:0"))
        .stdout(predicate::str::contains("/bin/sh"));
}

#[test]
fn test_autoboot_set_show_clear() {
    let config = TestConfig::new("true");
    config.script("boot.py", "print('hi')\n");

    config
        .cmd()
        .args(["autoboot", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No autoboot script configured"));

    config
        .cmd()
        .args(["autoboot", "set", "boot.py"])
        .assert()
        .success()
        .stdout(predicate::str::contains("boot.py will run at boot"));

    config
        .cmd()
        .args(["autoboot", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("boot.py"));

    config
        .cmd()
        .args(["autoboot", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Autoboot cleared"));

    config
        .cmd()
        .args(["autoboot", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No autoboot script configured"));
}

#[test]
fn test_autoboot_set_missing_script_fails() {
    let config = TestConfig::new("true");
    config
        .cmd()
        .args(["autoboot", "set", "ghost.py"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Script not found"));
}

#[test]
fn test_boot_without_designation_succeeds() {
    let config = TestConfig::new("true");
    config
        .cmd()
        .arg("boot")
        .assert()
        .success()
        .stdout(predicate::str::contains("No autoboot script configured"));
}

#[cfg(unix)]
#[test]
fn test_boot_exits_with_script_code() {
    let config = TestConfig::new("echo booted; exit 3");
    config.script("boot.py", "print('booted')\n");
    config.cmd().args(["autoboot", "set", "boot.py"]).assert().success();

    config
        .cmd()
        .arg("boot")
        .assert()
        .code(3)
        .stdout(predicate::str::contains("booted"));

    assert!(config.root().join("logs").join("boot.py.log").exists());
}

#[test]
fn test_boot_refuses_invalid_script() {
    let config = TestConfig::new("true");
    config.script("boot.py", "print('hi')\n");
    config.cmd().args(["autoboot", "set", "boot.py"]).assert().success();
    config.script("boot.py", "import socket\n");

    config
        .cmd()
        .arg("boot")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not executable"));
}

#[test]
fn test_list_shows_scripts() {
    let config = TestConfig::new("true");
    config.script("blink.py", "print('blink')\n");
    config.script("net.py", "import socket\n");

    config
        .cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Scripts in"))
        .stdout(predicate::str::contains("blink.py"))
        .stdout(predicate::str::contains("net.py"))
        .stdout(predicate::str::contains("invalid"));

    config
        .cmd()
        .args(["list", "--long"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Blocked import 'socket'"));
}

#[test]
fn test_list_empty_dir() {
    let config = TestConfig::new("true");
    config
        .cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No scripts"));
}

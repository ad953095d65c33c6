//! CLI integration tests
//!
//! Tests the shoal CLI using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;

fn shoal() -> Command {
    Command::cargo_bin("shoal")
        .expect("Failed to locate shoal binary - ensure it's built before running tests")
}

#[test]
fn test_cli_help() {
    shoal()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("shoal"))
        .stdout(predicate::str::contains("multi-host SSH client"));
}

#[test]
fn test_cli_version() {
    shoal()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("shoal"));
}

#[test]
fn test_cli_shell_help() {
    shoal()
        .args(["shell", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("interactive shell"));
}

#[test]
fn test_cli_exec_help() {
    shoal()
        .args(["exec", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("parallel"));
}

#[test]
fn test_cli_list_help() {
    shoal()
        .args(["list", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hosts"));
}

#[test]
fn test_cli_config_help() {
    shoal()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_cli_unknown_command() {
    shoal()
        .arg("nonexistent-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_cli_shell_missing_host() {
    shoal().arg("shell").assert().failure();
}

#[test]
fn test_cli_exec_missing_hosts() {
    shoal().args(["exec", "uptime"]).assert().failure();
}

#[test]
fn test_cli_config_init_and_show() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    shoal()
        .args(["--config", path.to_str().unwrap(), "config", "init"])
        .assert()
        .success();

    shoal()
        .args(["--config", path.to_str().unwrap(), "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("label_template"));
}

#[test]
fn test_cli_list_with_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[hosts.web-01]\naddr = \"10.0.0.1\"\nuser = \"deploy\"\n",
    )
    .unwrap();

    shoal()
        .args(["--config", path.to_str().unwrap(), "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy@10.0.0.1:22"));
}

#[test]
fn test_cli_shell_unknown_host_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "").unwrap();

    shoal()
        .args(["--config", path.to_str().unwrap(), "shell", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown host"));
}

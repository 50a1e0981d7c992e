//! 命令行参数与配置子命令测试（无需硬件）

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn kia_steer() -> Command {
    Command::cargo_bin("kia-steer").unwrap()
}

#[test]
fn test_help_lists_subcommands() {
    kia_steer()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("shell"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("--can"));
}

#[test]
fn test_version() {
    kia_steer()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_config_show_applies_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "actuator_tty = \"/dev/ttyUSB3\"\n[controller]\nkp = 2.5\n").unwrap();

    kia_steer()
        .args(["config", "show", "--can", "vcan7", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("can_interface = \"vcan7\""))
        .stdout(predicate::str::contains("actuator_tty = \"/dev/ttyUSB3\""))
        .stdout(predicate::str::contains("kp = 2.5"));
}

#[test]
fn test_config_init_then_check() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    kia_steer().args(["config", "init", "--config"]).arg(&path).assert().success();
    assert!(path.exists());

    // 已存在时需要 --force
    kia_steer().args(["config", "init", "--config"]).arg(&path).assert().failure();
    kia_steer()
        .args(["config", "init", "--force", "--config"])
        .arg(&path)
        .assert()
        .success();

    kia_steer()
        .args(["config", "check", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("配置有效"));
}

#[test]
fn test_config_check_reports_invalid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "poll_period_ms = 0\n").unwrap();

    kia_steer()
        .args(["config", "check", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("poll_period_ms"));
}

#[test]
fn test_config_check_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    kia_steer()
        .args(["config", "check", "--config"])
        .arg(dir.path().join("absent.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("配置文件不存在"));
}

#[test]
fn test_shell_fails_fast_without_can_interface() {
    let dir = tempfile::tempdir().unwrap();
    kia_steer()
        .args(["--can", "kiamissing0", "--tty", "/dev/kia-missing-tty", "--log-dir"])
        .arg(dir.path().join("logs"))
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .write_stdin("quit\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("启动失败"));
}

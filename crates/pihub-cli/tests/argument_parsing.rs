//! Focused CLI argument parsing tests.
//!
//! These exercise parsing and the offline commands; nothing here
//! binds a socket or touches hardware.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn version_command_succeeds() {
    Command::cargo_bin("pihub")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pihub"));
}

#[test]
fn version_flag_shows_version() {
    Command::cargo_bin("pihub")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pihub"));
}

#[test]
fn help_flag_shows_usage() {
    Command::cargo_bin("pihub")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("home-automation"));
}

#[test]
fn unknown_subcommand_fails() {
    Command::cargo_bin("pihub")
        .unwrap()
        .arg("frobnicate")
        .assert()
        .failure();
}

#[test]
fn start_help_shows_options() {
    Command::cargo_bin("pihub")
        .unwrap()
        .args(["start", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--port"));
}

#[test]
fn start_rejects_non_numeric_port() {
    Command::cargo_bin("pihub")
        .unwrap()
        .args(["start", "--port", "not-a-port"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn config_show_prints_defaults() {
    Command::cargo_bin("pihub")
        .unwrap()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[server]"))
        .stdout(predicate::str::contains("port = 65002"));
}

#[test]
fn config_show_reads_explicit_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("pihub.toml");
    fs::write(&path, "[server]\nport = 7123\n").unwrap();

    Command::cargo_bin("pihub")
        .unwrap()
        .args(["config", "show", "--config", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("port = 7123"));
}

#[test]
fn config_validate_accepts_good_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("pihub.toml");
    fs::write(&path, "[server]\nmax_clients = 2\n").unwrap();

    Command::cargo_bin("pihub")
        .unwrap()
        .args(["config", "validate", "--config", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"));
}

#[test]
fn config_validate_rejects_bad_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("pihub.toml");
    fs::write(&path, "[server]\nmax_clients = 0\n").unwrap();

    Command::cargo_bin("pihub")
        .unwrap()
        .args(["config", "validate", "--config", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_clients"));
}

#[test]
fn config_validate_rejects_missing_file() {
    Command::cargo_bin("pihub")
        .unwrap()
        .args(["config", "validate", "--config", "/nonexistent/pihub.toml"])
        .assert()
        .failure();
}

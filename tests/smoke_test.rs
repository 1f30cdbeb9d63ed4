//! Smoke tests for the Strata CLI.
//!
//! These tests verify basic CLI functionality:
//! - `strata --version` outputs version info
//! - `strata --help` outputs help text
//! - `strata list` in an empty directory outputs valid JSON

mod common;

use assert_cmd::Command;
use common::TestEnv;
use predicates::prelude::*;

/// Get a Command for the strata binary.
fn strata() -> Command {
    Command::new(env!("CARGO_BIN_EXE_strata"))
}

#[test]
fn test_version_flag() {
    strata()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("strata"))
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_help_flag() {
    strata()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("Options:"));
}

#[test]
fn test_no_args_is_usage_error() {
    strata()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_empty_list_outputs_json() {
    let env = TestEnv::new();
    let output = env.strata().arg("list").output().unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["properties"]["profiles"], serde_json::json!({}));
    assert_eq!(json["properties"]["plugins"], serde_json::json!([]));
}

#[test]
fn test_default_help() {
    strata()
        .args(["default", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("get"))
        .stdout(predicate::str::contains("set"));
}

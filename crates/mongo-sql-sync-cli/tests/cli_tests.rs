//! CLI integration tests for mongo-sql-sync.
//!
//! These tests cover argument parsing, help output and exit codes for
//! configuration errors. None of them needs a running database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the mongo-sql-sync binary.
fn cmd() -> Command {
    Command::cargo_bin("mongo-sql-sync").unwrap()
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_sync_subcommand_help() {
    cmd()
        .args(["sync", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"))
        .stdout(predicate::str::contains("--collection"));
}

#[test]
fn test_validate_subcommand_help() {
    cmd()
        .args(["validate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--sample-size"))
        .stdout(predicate::str::contains("Validate record counts"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mongo-sql-sync"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_and_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_io_code() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_invalid_yaml_exits_with_config_code() {
    let file = config_file("invalid: yaml: content: [\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "analyze"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_required_fields_exits_with_config_code() {
    let file = config_file("source:\n  uri: mongodb://localhost\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "migrate"])
        .assert()
        .code(2);
}

#[test]
fn test_unknown_target_type_exits_with_config_code() {
    let file = config_file(
        r#"
source:
  uri: mongodb://localhost:27017
  database: shop
target:
  type: oracle
  host: localhost
  database: shop
  user: app
"#,
    );

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "sync"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("target.type"));
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

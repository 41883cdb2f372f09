use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn snowgeo() -> Command {
    Command::cargo_bin("snowgeo").unwrap()
}

fn config_file(contents: &serde_json::Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn test_help_lists_commands() {
    snowgeo()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tables"))
        .stdout(predicate::str::contains("fields"))
        .stdout(predicate::str::contains("fetch"));
}

#[test]
fn test_tables() {
    snowgeo()
        .arg("tables")
        .assert()
        .success()
        .stdout(predicate::str::contains("Supported Tables (2 total)"))
        .stdout(predicate::str::contains("incidents"))
        .stdout(predicate::str::contains("sc_request"))
        .stdout(predicate::str::contains("ServiceNow Requests"));
}

#[test]
fn test_unsupported_table() {
    snowgeo()
        .args(["fetch", "--table", "widgets"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Table 'widgets' is not supported."))
        .stderr(predicate::str::contains("  - requests"))
        .stderr(predicate::str::contains("snowgeo tables"));
}

#[test]
fn test_config_required() {
    snowgeo()
        .args(["fields", "--table", "incidents"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--config"));
}

#[test]
fn test_invalid_config() {
    let file = config_file(&serde_json::json!({
        "servicenow": {"url": "https://dev.service-now.com", "maxFeaturesToCache": 0}
    }));
    snowgeo()
        .args(["fetch", "--table", "incidents", "--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"))
        .stderr(predicate::str::contains("maxFeaturesToCache"));
}

#[test]
fn test_missing_url() {
    let file = config_file(&serde_json::json!({"username": "admin"}));
    snowgeo()
        .args(["fetch", "--table", "requests", "-c"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing required option: url"));
}

#[test]
fn test_unreachable_instance() {
    let file = config_file(&serde_json::json!({
        "url": "http://127.0.0.1:9",
        "username": "admin",
        "password": "admin",
        "timeoutSeconds": 2
    }));
    let output = NamedTempFile::new().unwrap();
    snowgeo()
        .args(["fetch", "--table", "incidents", "-c"])
        .arg(file.path())
        .arg("--output")
        .arg(output.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Schema error"))
        .stderr(predicate::str::contains("Check the instance URL"));
    assert_eq!(std::fs::read_to_string(output.path()).unwrap(), "");
}

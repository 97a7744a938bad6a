#![allow(deprecated)] // cargo_bin is deprecated but still functional

use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write a config pointing at a SQLite file inside `temp`.
fn write_config(temp: &TempDir, deleted_records: &str) -> PathBuf {
    let db_path = temp.path().join("metadata.db");
    let config_path = temp.path().join("server.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[repository]
deleted_records = "{deleted_records}"

[metadata]
type = "sqlite"
path = "{}"
"#,
            db_path.display()
        ),
    )
    .unwrap();
    config_path
}

fn harvestctl(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("harvestctl").unwrap();
    cmd.env_remove("HARVEST_CONFIG")
        .arg("--config")
        .arg(config);
    cmd
}

#[test]
fn format_set_and_record_commands() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, "transient");

    harvestctl(&config)
        .args([
            "format",
            "add",
            "oai_dc",
            "--namespace",
            "http://www.openarchives.org/OAI/2.0/oai_dc/",
            "--schema",
            "http://www.openarchives.org/OAI/2.0/oai_dc.xsd",
        ])
        .assert()
        .success()
        .stdout(contains("Format stored: oai_dc"));

    harvestctl(&config)
        .args(["format", "list"])
        .assert()
        .success()
        .stdout(contains("oai_dc"));

    let content = temp.path().join("record.xml");
    fs::write(&content, "<oai_dc:dc>title</oai_dc:dc>").unwrap();
    harvestctl(&config)
        .args(["record", "add", "oai:test:1", "oai_dc"])
        .arg(&content)
        .args(["--set", "math:algebra", "--datestamp", "2024-01-01"])
        .assert()
        .success()
        .stdout(contains("Record oai:test:1: Stored"));

    harvestctl(&config)
        .args(["set", "list"])
        .assert()
        .success()
        .stdout(contains("math:algebra"));

    harvestctl(&config)
        .args(["record", "delete", "oai:test:1", "oai_dc"])
        .assert()
        .success()
        .stdout(contains("tombstone kept"));

    harvestctl(&config)
        .args(["prune", "records"])
        .assert()
        .success()
        .stdout(contains("Removed 1 row(s)."));
}

#[test]
fn record_for_unknown_format_fails() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, "transient");
    let content = temp.path().join("record.xml");
    fs::write(&content, "<dc/>").unwrap();

    harvestctl(&config)
        .args(["record", "add", "oai:test:1", "oai_dc"])
        .arg(&content)
        .assert()
        .failure();
}

#[test]
fn persistent_policy_refuses_record_prune() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, "persistent");

    harvestctl(&config)
        .args(["prune", "records"])
        .assert()
        .failure()
        .stderr(contains("persistent"));
}

#[test]
fn delete_unknown_format_fails() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, "no");

    harvestctl(&config)
        .args(["format", "delete", "oai_dc"])
        .assert()
        .failure()
        .stderr(contains("does not exist"));
}

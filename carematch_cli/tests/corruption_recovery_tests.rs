//! Corruption recovery tests for the carematch binary.
//!
//! These tests verify the system can handle:
//! - Corrupted ledger and audit logs
//! - A corrupted record snapshot
//! - Missing and empty files
//! - Partial writes

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn setup_test_dir() -> TempDir {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("config.toml"), "").expect("Failed to write config");
    temp_dir
}

fn cli(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("carematch"));
    cmd.arg("--config")
        .arg(dir.join("config.toml"))
        .arg("--data-dir")
        .arg(dir.join("data"));
    cmd
}

fn ledger_path(dir: &Path) -> PathBuf {
    dir.join("data/ledger/enrollments.wal")
}

fn register_patient(dir: &Path) -> String {
    let output = cli(dir)
        .args([
            "patient",
            "register",
            "--national-id",
            "1234567890",
            "--name",
            "Jane Wanjiru",
            "--dob",
            "1985-05-15",
            "--risk-tag",
            "obesity",
            "--json",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let patient: serde_json::Value = serde_json::from_slice(&output).unwrap();
    patient["patient_id"].as_str().unwrap().to_string()
}

#[test]
fn test_corrupted_snapshot_fails_loudly() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let snapshot = data_dir.join("records.json");
    fs::write(&snapshot, "{ invalid json }}}}").expect("Failed to write corrupted snapshot");

    cli(temp_dir.path()).arg("status").assert().failure();

    // Nothing overwrote the damaged snapshot
    assert_eq!(fs::read_to_string(&snapshot).unwrap(), "{ invalid json }}}}");
}

#[test]
fn test_corrupted_ledger_lines_skipped() {
    let temp_dir = setup_test_dir();
    let patient_id = register_patient(temp_dir.path());

    let ledger = ledger_path(temp_dir.path());
    fs::create_dir_all(ledger.parent().unwrap()).unwrap();
    fs::write(&ledger, "{ invalid json }\n{ more invalid }\n")
        .expect("Failed to write corrupted ledger");

    cli(temp_dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Enrollments: 0"));

    cli(temp_dir.path())
        .args(["recommend", patient_id.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Diabetes Management"));
}

#[test]
fn test_partial_ledger_line() {
    let temp_dir = setup_test_dir();
    let patient_id = register_patient(temp_dir.path());

    let ledger = ledger_path(temp_dir.path());
    fs::create_dir_all(ledger.parent().unwrap()).unwrap();

    let mut file = fs::File::create(&ledger).unwrap();
    writeln!(
        file,
        r#"{{"patient_id":"{}","program_id":"PROG-elsewhere","enrolled_at":"2025-01-01T00:00:00Z"}}"#,
        patient_id
    )
    .unwrap();
    // Write partial line (no newline)
    write!(file, r#"{{"patient_id":"{}","program_"#, patient_id).unwrap();
    drop(file);

    cli(temp_dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Enrollments: 1"));
}

#[test]
fn test_enrollment_after_torn_ledger_line_persists() {
    let temp_dir = setup_test_dir();
    let patient_id = register_patient(temp_dir.path());

    let output = cli(temp_dir.path())
        .args(["program", "list"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let diabetes = String::from_utf8(output)
        .unwrap()
        .lines()
        .find(|line| line.contains("Diabetes Management"))
        .and_then(|line| line.split_whitespace().next())
        .expect("program listed")
        .to_string();

    // Crash mid-write: last line has no newline
    let ledger = ledger_path(temp_dir.path());
    fs::create_dir_all(ledger.parent().unwrap()).unwrap();
    fs::write(&ledger, r#"{"patient_id":"x","program_"#).unwrap();

    cli(temp_dir.path())
        .args(["enroll", patient_id.as_str(), diabetes.as_str()])
        .assert()
        .success();

    cli(temp_dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Enrollments: 1"));

    cli(temp_dir.path())
        .args(["enroll", patient_id.as_str(), diabetes.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("AlreadyEnrolled"));
}

#[test]
fn test_empty_files() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");

    fs::create_dir_all(data_dir.join("ledger")).unwrap();
    fs::create_dir_all(data_dir.join("audit")).unwrap();
    fs::write(ledger_path(temp_dir.path()), "").unwrap();
    fs::write(data_dir.join("audit/audit.wal"), "").unwrap();

    cli(temp_dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Enrollments: 0"));

    cli(temp_dir.path())
        .args(["audit", "rollup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rolled up 0 audit events"));
}

#[test]
fn test_corrupted_audit_lines_skipped_in_rollup() {
    let temp_dir = setup_test_dir();
    let patient_id = register_patient(temp_dir.path());

    cli(temp_dir.path())
        .args(["recommend", patient_id.as_str()])
        .assert()
        .success();

    let audit_log = temp_dir.path().join("data/audit/audit.wal");
    let mut file = fs::OpenOptions::new().append(true).open(&audit_log).unwrap();
    writeln!(file, "not an event").unwrap();
    drop(file);

    cli(temp_dir.path())
        .args(["audit", "rollup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rolled up 1 audit events"));

    assert!(temp_dir.path().join("data/audit.csv").exists());
}

#[test]
fn test_missing_config_file_fails() {
    let temp_dir = setup_test_dir();

    Command::new(assert_cmd::cargo::cargo_bin!("carematch"))
        .arg("--config")
        .arg(temp_dir.path().join("missing.toml"))
        .arg("--data-dir")
        .arg(temp_dir.path().join("data"))
        .arg("status")
        .assert()
        .failure();
}

#[test]
fn test_invalid_config_rejected() {
    let temp_dir = setup_test_dir();
    fs::write(
        temp_dir.path().join("config.toml"),
        "[logging]\nlevel = \"loud\"\n",
    )
    .unwrap();

    cli(temp_dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown log level"));
}

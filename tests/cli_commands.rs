use assert_cmd::prelude::*;
use std::path::Path;
use std::process::Command;

const SESSION: &str = "tests/fixtures/login_session.json";

fn healreplay(config_dir: &Path) -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("healreplay");
    let mut cmd = Command::new(bin);
    cmd.arg("--config")
        .arg(config_dir.join("absent.yaml"))
        .env_remove("HEALREPLAY_SECRET_KEY")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn validate_reports_step_breakdown() {
    let dir = tempfile::tempdir().unwrap();
    let assert = healreplay(dir.path())
        .args(["validate", SESSION])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 output");
    assert!(stdout.contains("5f0c8a2e-login"));
    assert!(stdout.contains("Schema version: 1.0"));
    assert!(stdout.contains("Steps:          3"));
    assert!(stdout.contains("text-input"));
}

#[test]
fn validate_rejects_other_schema_versions() {
    let dir = tempfile::tempdir().unwrap();
    let raw = std::fs::read_to_string(SESSION).unwrap();
    let patched = raw.replace("\"schemaVersion\": \"1.0\"", "\"schemaVersion\": \"0.9\"");
    let path = dir.path().join("old.json");
    std::fs::write(&path, patched).unwrap();

    healreplay(dir.path())
        .arg("validate")
        .arg(&path)
        .assert()
        .failure();
}

#[test]
fn encrypt_needs_a_key() {
    let dir = tempfile::tempdir().unwrap();
    healreplay(dir.path())
        .args(["encrypt", "hunter2"])
        .assert()
        .failure();
}

#[test]
fn generated_key_seals_values() {
    let dir = tempfile::tempdir().unwrap();
    let assert = healreplay(dir.path())
        .args(["encrypt", "--generate-key"])
        .assert()
        .success();
    let key = String::from_utf8(assert.get_output().stdout.clone())
        .unwrap()
        .trim()
        .to_string();
    assert!(!key.is_empty());

    let assert = healreplay(dir.path())
        .env("HEALREPLAY_SECRET_KEY", &key)
        .args(["encrypt", "hunter2"])
        .assert()
        .success();
    let sealed = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let secrets = replay_core_types::SecretBox::from_base64_key(&key).unwrap();
    assert_eq!(secrets.open(sealed.trim()).unwrap(), "hunter2");
}

#[test]
fn replay_without_a_browser_fails() {
    let dir = tempfile::tempdir().unwrap();
    healreplay(dir.path())
        .env("HEALREPLAY_CDP_WS", "ws://127.0.0.1:1/devtools/browser/none")
        .args(["replay", SESSION])
        .assert()
        .failure();
}

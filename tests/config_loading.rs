use healreplay::config::{load_config, ENV_CDP_PORT, ENV_SECRET_KEY};
use serial_test::serial;
use std::env;

#[tokio::test]
#[serial]
async fn missing_file_yields_defaults() {
    env::remove_var(ENV_CDP_PORT);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");

    let loaded = load_config(Some(&path)).await.unwrap();
    assert!(!loaded.found);
    assert_eq!(loaded.path, path);
    assert_eq!(loaded.config.cdp.port, 9222);
    assert_eq!(loaded.config.replay.step_timeout_ms, 60_000);
}

#[tokio::test]
#[serial]
async fn environment_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "cdp:\n  port: 9333\ncapture:\n  network_domain: true\n",
    )
    .unwrap();

    env::set_var(ENV_CDP_PORT, "9444");
    env::set_var(ENV_SECRET_KEY, "a2V5");
    let loaded = load_config(Some(&path)).await;
    env::remove_var(ENV_CDP_PORT);
    env::remove_var(ENV_SECRET_KEY);

    let loaded = loaded.unwrap();
    assert!(loaded.found);
    assert_eq!(loaded.config.cdp.port, 9444);
    assert!(loaded.config.capture.network_domain);
    assert_eq!(loaded.config.secret_key.as_deref(), Some("a2V5"));
}

#[tokio::test]
#[serial]
async fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "replay: [not, a, map]\n").unwrap();

    let err = load_config(Some(&path)).await.err().expect("parse failure");
    assert!(err.to_string().contains("Failed to parse config file"));
}

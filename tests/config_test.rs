//! Tests for settings defaults and TOML overrides

use oprosnik_helper::config::{Settings, StatusLabels};
use std::time::Duration;

#[test]
fn test_defaults() {
    let settings = Settings::default();
    assert_eq!(settings.relay.port, 9669);
    assert_eq!(settings.history.capacity, 10);
    assert_eq!(settings.host.url_pattern, "/desktop/container/");
    assert_eq!(settings.form.comment_selector, "#comment_");
    assert_eq!(settings.capture.status_interval(), Duration::from_millis(1000));
    assert_eq!(settings.capture.burst_max_attempts, 10);
    assert_eq!(settings.capture.min_interface_secs, 10);
    assert!(settings.selectors.duration_clock_scan);
    assert_eq!(
        settings.selectors.status.first().map(String::as_str),
        Some("#voice-state-select-headerOptionText")
    );
}

#[test]
fn test_partial_toml_keeps_other_defaults() {
    let settings = Settings::from_toml(
        r#"
        [relay]
        port = 18080

        [capture]
        burst_window_ms = 5000

        [labels]
        talking = ["On Call"]

        [history]
        capacity = 25
        storage_path = "/tmp/oprosnik/history.json"
        "#,
    )
    .expect("valid settings");

    assert_eq!(settings.relay.port, 18080);
    assert_eq!(settings.capture.burst_window(), chrono::Duration::milliseconds(5000));
    assert_eq!(settings.capture.burst_max_attempts, 10);
    assert_eq!(settings.labels.talking, vec!["On Call".to_string()]);
    assert!(settings.labels.is_ending("Wrap Up"));
    assert_eq!(settings.history.capacity, 25);
    assert_eq!(
        settings.history.resolved_storage_path(),
        std::path::PathBuf::from("/tmp/oprosnik/history.json")
    );
    println!("✅ Partial TOML overrides only what it names");
}

#[test]
fn test_invalid_toml_is_an_error() {
    assert!(Settings::from_toml("[relay]\nport = \"not a number\"").is_err());
}

#[test]
fn test_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oprosnik.toml");
    std::fs::write(&path, "[host]\nurl_pattern = \"finesse.local\"\n").unwrap();

    let settings = Settings::from_file(&path).expect("load");
    assert_eq!(settings.host.url_pattern, "finesse.local");

    let missing = Settings::from_file(&dir.path().join("absent.toml"));
    assert!(missing.is_err());
}

#[test]
fn test_status_label_matching() {
    let labels = StatusLabels::default();
    assert!(labels.is_talking("Разговор"));
    assert!(labels.is_talking("  talking "));
    assert!(!labels.is_talking("Готов"));
    assert!(labels.is_ending("Поствызов"));
    assert!(labels.is_ending("Not Ready - Lunch"));
    assert!(!labels.is_ending(""));
    assert!(!labels.is_talking("Удержание"));
}

#[test]
fn test_default_storage_path_is_under_data_dir() {
    let path = Settings::default().history.resolved_storage_path();
    assert!(path.ends_with("oprosnik-helper/storage.json"));
}

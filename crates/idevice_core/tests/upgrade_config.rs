use idevice_core::{ConfigError, UpgradeConfig};
use std::fs;

#[test]
fn loads_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upgrade.json");
    fs::write(
        &path,
        r#"{ "feedback_labels": ["Feedback", "Rétroaction"], "legacy_reading_titles": ["Activité de lecture 0.11"] }"#,
    )
    .unwrap();

    let config = UpgradeConfig::from_json_file(&path).unwrap();

    assert!(config.is_feedback_label("Rétroaction"));
    assert!(config.is_legacy_reading_title("Activité de lecture 0.11"));
    assert!(config.is_legacy_reading_title("Reading Activity 0.11"));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = UpgradeConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn empty_object_falls_back_to_defaults() {
    let config = UpgradeConfig::from_json_str("{}").unwrap();
    assert_eq!(config, UpgradeConfig::default());
}

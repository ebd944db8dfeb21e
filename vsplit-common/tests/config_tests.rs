//! Configuration loading and graceful degradation tests
//!
//! Tests that manipulate XDG_CONFIG_HOME are marked #[serial] so they do not
//! race each other.

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use vsplit_common::config::{load_or_default, load_toml_config, SeparatorBackend, TomlConfig};

#[test]
fn test_defaults_without_file() {
    let config = TomlConfig::default();

    assert_eq!(config.port_or_default(), 8000);
    assert_eq!(config.host_or_default(), "0.0.0.0");
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.reclaim.threshold.0, Duration::from_secs(1800));
    assert_eq!(config.reclaim.interval.0, Duration::from_secs(1800));
    assert_eq!(config.extractor.timeout.0, Duration::from_secs(60));
    assert!(config
        .root_folder_or_default()
        .to_string_lossy()
        .contains("vsplit-sessions"));
}

#[test]
fn test_partial_file_overrides_only_named_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vsplit.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/vsplit"
port = 9100

[reclaim]
threshold = "45m"

[separator]
backend = "demucs"
timeout = 120
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();

    assert_eq!(config.root_folder_or_default(), PathBuf::from("/srv/vsplit"));
    assert_eq!(config.port_or_default(), 9100);
    assert_eq!(config.reclaim.threshold.0, Duration::from_secs(45 * 60));
    // Untouched field keeps its default
    assert_eq!(config.reclaim.interval.0, Duration::from_secs(30 * 60));
    assert_eq!(config.separator.backend, SeparatorBackend::Demucs);
    assert_eq!(config.separator.timeout.0, Duration::from_secs(120));
    assert_eq!(config.separator.background_filename_or_default(), "no_vocals.wav");
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vsplit.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    assert!(load_toml_config(&path).is_err());
}

#[test]
fn test_explicit_missing_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    assert!(load_or_default(Some(&missing)).is_err());
}

#[test]
#[serial]
fn test_missing_default_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    env::set_var("XDG_CONFIG_HOME", dir.path());

    let config = load_or_default(None).unwrap();
    assert_eq!(config.port_or_default(), 8000);

    env::remove_var("XDG_CONFIG_HOME");
}

#[test]
#[serial]
fn test_default_file_location_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("vsplit");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("vsplit.toml"), "port = 9200\n").unwrap();
    env::set_var("XDG_CONFIG_HOME", dir.path());

    let config = load_or_default(None).unwrap();

    env::remove_var("XDG_CONFIG_HOME");
    // dirs only honours XDG_CONFIG_HOME on Linux
    #[cfg(target_os = "linux")]
    assert_eq!(config.port_or_default(), 9200);
    #[cfg(not(target_os = "linux"))]
    let _ = config;
}

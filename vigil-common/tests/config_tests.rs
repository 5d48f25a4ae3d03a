//! Root folder resolution and configuration loading tests
//!
//! Tests touching VIGIL_ROOT_FOLDER run under #[serial] so environment
//! changes never race.

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use vigil_common::config::{resolve_root_folder, TomlConfig, ROOT_FOLDER_ENV};

#[test]
#[serial]
fn test_env_overrides_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/vigil-from-env");

    let resolved = resolve_root_folder(None, Some(Path::new("/tmp/vigil-from-toml")));
    assert_eq!(resolved, PathBuf::from("/tmp/vigil-from-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_used_when_no_cli_or_env() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolved = resolve_root_folder(None, Some(Path::new("/tmp/vigil-from-toml")));
    assert_eq!(resolved, PathBuf::from("/tmp/vigil-from-toml"));
}

#[test]
#[serial]
fn test_blank_env_is_ignored() {
    env::set_var(ROOT_FOLDER_ENV, "   ");

    let resolved = resolve_root_folder(None, None);
    assert_ne!(resolved, PathBuf::from("   "));
    assert!(!resolved.as_os_str().is_empty());

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
fn test_load_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        frame_rate = 15
        queue_capacity = 2

        [classifier]
        url = "http://models:8501"
        channel_order = "rgb"

        [sms]
        to_number = "+15550100"
        "#,
    )
    .unwrap();

    let config = TomlConfig::load_or_default(Some(&path)).unwrap();
    assert_eq!(config.frame_rate, 15);
    assert_eq!(config.queue_capacity, 2);
    assert_eq!(config.classifier.url, "http://models:8501");
    assert_eq!(config.classifier.model, "lrcn");
    assert_eq!(config.classifier.channel_order, "rgb");
    assert_eq!(config.sms.to_number.as_deref(), Some("+15550100"));
    assert!(config.sms.account_sid.is_none());
}

#[test]
fn test_missing_explicit_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = TomlConfig::load_or_default(Some(&dir.path().join("absent.toml")));
    assert!(result.is_err());
}

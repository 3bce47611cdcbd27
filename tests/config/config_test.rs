// Config Tests
// Tests for loading and resolving the TOML configuration

use ledgerwatch::config::{ConfigError, MonitorConfig, DEFAULT_ALTNET_SERVER, DEFAULT_SERVER};
use ledgerwatch::ledger::Address;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const BUNDLED: &str = include_str!("../../conf/ledgerwatch.toml");

// ============================================================================
// LOADING
// ============================================================================

#[test]
fn test_bundled_config_parses() {
    let config = MonitorConfig::from_toml_str(BUNDLED, false).unwrap();

    assert_eq!(config.server, DEFAULT_SERVER);
    assert_eq!(config.addresses.len(), 1);
    assert!(config.record_format.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_bundled_config_altnet() {
    let config = MonitorConfig::from_toml_str(BUNDLED, true).unwrap();

    assert_eq!(config.server, DEFAULT_ALTNET_SERVER);
    assert_eq!(config.store_path, PathBuf::from("ledgerwatch-altnet.db"));
    assert_eq!(config.addresses.len(), 1);
}

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("watch.toml");
    std::fs::write(
        &path,
        "[monitor]\naddresses = [\"rAlice\"]\nrecord_format = \"out/{id}.json\"\n",
    )
    .unwrap();

    let config = MonitorConfig::load(&path, false).unwrap();

    assert_eq!(config.addresses, vec![Address::from("rAlice")]);
    assert_eq!(config.record_format.as_deref(), Some("out/{id}.json"));
    assert_eq!(config.server, DEFAULT_SERVER);
}

#[test]
fn test_missing_file_names_path() {
    let err = MonitorConfig::load(Path::new("/nonexistent/ledgerwatch.toml"), false).unwrap_err();

    match err {
        ConfigError::Read { path, .. } => assert_eq!(path, PathBuf::from("/nonexistent/ledgerwatch.toml")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_empty_file_uses_defaults() {
    let config = MonitorConfig::from_toml_str("", false).unwrap();

    assert_eq!(config.server, DEFAULT_SERVER);
    assert!(config.addresses.is_empty());
    assert!(matches!(config.validate(), Err(ConfigError::NoAddresses)));
}

// ============================================================================
// VALIDATION AND CLIENT SETTINGS
// ============================================================================

#[test]
fn test_zero_poll_interval_rejected() {
    let config = MonitorConfig::new()
        .with_addresses(vec!["rAlice"])
        .with_poll_interval_ms(0);

    assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
}

#[test]
fn test_rpc_config_follows_monitor_settings() {
    let config = MonitorConfig::from_toml_str(
        "[monitor]\nserver = \"http://localhost:5005\"\npoll_interval_ms = 250\nrequest_timeout_secs = 5\n",
        false,
    )
    .unwrap();

    let rpc = config.rpc_config();
    assert_eq!(rpc.url, "http://localhost:5005");
    assert_eq!(rpc.poll_interval_ms, 250);
    assert_eq!(rpc.request_timeout_secs, 5);
}

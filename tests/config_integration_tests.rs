//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Default configuration generation
//! - Loading partial and complete YAML files
//! - Environment overrides layered over the file
//! - Save/load round trips

use camino::Utf8PathBuf;
use globaldorm::{ClientConfig, ConfigManager};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const ENV_VARS: [&str; 3] = [
    "GLOBALDORM_NOTIFICATIONS__PORT",
    "GLOBALDORM_NOTIFICATIONS__ENABLED",
    "GLOBALDORM_CLIENT__DEFAULT_SERVER",
];

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
}

#[test]
fn test_missing_file_loads_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let config = temp_env::with_vars_unset(ENV_VARS, || manager.load_client_config().unwrap());

    assert_eq!(config.client.default_server, "netbeans");
    assert_eq!(config.client.servers.len(), 3);
    assert_eq!(config.notifications.port, 5672);
    assert_eq!(config.notifications.exchange, "hello");
    assert_eq!(config.notifications.poll_interval(), Duration::from_millis(100));
    assert!(config.notifications.enabled);
}

#[test]
fn test_partial_file_overrides_only_named_keys() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(
        manager.client_config_path(),
        "notifications:\n  host: broker.internal\n  exchange: rooms\nclient:\n  request_timeout_secs: 3\n",
    )
    .unwrap();

    let config = temp_env::with_vars_unset(ENV_VARS, || manager.load_client_config().unwrap());

    assert_eq!(config.notifications.host, "broker.internal");
    assert_eq!(config.notifications.exchange, "rooms");
    assert_eq!(config.notifications.port, 5672);
    assert_eq!(config.client.request_timeout(), Duration::from_secs(3));
    assert_eq!(config.client.default_server, "netbeans");
}

#[test]
fn test_file_servers_merge_with_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(
        manager.client_config_path(),
        "client:\n  servers:\n    staging: \"10.0.0.7:8080\"\n",
    )
    .unwrap();

    let config = temp_env::with_vars_unset(ENV_VARS, || manager.load_client_config().unwrap());

    assert_eq!(
        config.client.servers.get("staging").map(String::as_str),
        Some("10.0.0.7:8080")
    );
    assert!(config.client.servers.contains_key("netbeans"));
}

#[test]
fn test_environment_overrides_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(
        manager.client_config_path(),
        "notifications:\n  port: 5680\n",
    )
    .unwrap();

    let config = temp_env::with_vars(
        [
            ("GLOBALDORM_NOTIFICATIONS__PORT", Some("5699")),
            ("GLOBALDORM_NOTIFICATIONS__ENABLED", Some("false")),
            ("GLOBALDORM_CLIENT__DEFAULT_SERVER", Some("azure")),
        ],
        || manager.load_client_config().unwrap(),
    );

    assert_eq!(config.notifications.port, 5699);
    assert!(!config.notifications.enabled);
    assert_eq!(config.client.default_server, "azure");
}

#[test]
fn test_invalid_yaml_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.client_config_path(), "notifications:\n  port: [not, a, port]\n").unwrap();

    let result = temp_env::with_vars_unset(ENV_VARS, || manager.load_client_config());

    assert!(result.is_err());
}

#[test]
fn test_save_and_reload_round_trip() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut config = ClientConfig::default();
    config.client.default_server = "docker".to_string();
    config.client.debug_mode = true;
    config.notifications.reconnect_attempts = 4;
    config.notifications.password = "s3cret".to_string();

    manager.save_client_config(&config).unwrap();
    let loaded = temp_env::with_vars_unset(ENV_VARS, || manager.load_client_config().unwrap());

    assert_eq!(loaded.client.default_server, "docker");
    assert!(loaded.client.debug_mode);
    assert_eq!(loaded.notifications.reconnect_attempts, 4);
    assert_eq!(loaded.notifications.password, "s3cret");
    assert_eq!(
        loaded.client.servers.keys().collect::<Vec<_>>(),
        vec!["netbeans", "docker", "azure"]
    );
}

#[test]
fn test_ensure_does_not_overwrite_user_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.client_config_path(), "client:\n  debug_mode: true\n").unwrap();

    assert!(!manager.ensure_client_config().unwrap());
    let contents = fs::read_to_string(manager.client_config_path()).unwrap();
    assert_eq!(contents, "client:\n  debug_mode: true\n");
}

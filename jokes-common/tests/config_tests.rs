//! Configuration loading and priority resolution
//!
//! Tests that touch `XDG_CONFIG_HOME` run serially.

use jokes_common::config::{
    resolve_cache_path, resolve_port, resolve_type_update_queue, BrokerSettings, ConfigSource,
    StoreBackend, StoreOverrides, StoreSettings, TomlConfig, DEFAULT_BROKER_URL,
    DEFAULT_MONGO_DATABASE, DEFAULT_SQL_URL,
};
use jokes_common::Error;
use serial_test::serial;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

const SAMPLE: &str = r#"
port = 4100

[broker]
url = "amqp://rabbit:5672/%2f"
reconnect_interval_secs = 9
type_update_queue = "custom_updates"

[store]
backend = "sql"
sql_url = "sqlite:///var/lib/jokes/jokes.db"

[cache]
path = "/tmp/types.json"

[logging]
level = "debug"
"#;

#[test]
fn test_missing_explicit_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let (config, source) = TomlConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();

    assert_eq!(source, ConfigSource::Defaults);
    assert_eq!(config.port, None);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_load_reads_every_section() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, SAMPLE).unwrap();

    let (config, source) = TomlConfig::load(Some(&path)).unwrap();

    assert_eq!(source, ConfigSource::File(path));
    assert_eq!(config.port, Some(4100));
    assert_eq!(config.broker.reconnect_interval_secs, Some(9));
    assert_eq!(config.store.backend, Some(StoreBackend::Sql));
    assert_eq!(config.cache.path, Some(PathBuf::from("/tmp/types.json")));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    let err = TomlConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_command_line_beats_file_beats_default() {
    let toml = TomlConfig::parse(SAMPLE).unwrap();

    let broker = BrokerSettings::resolve(Some("amqp://cli".into()), None, &toml);
    assert_eq!(broker.url, "amqp://cli");
    assert_eq!(broker.reconnect.interval, Duration::from_secs(9));

    let defaults = BrokerSettings::resolve(None, None, &TomlConfig::default());
    assert_eq!(defaults.url, DEFAULT_BROKER_URL);
    assert_eq!(defaults.reconnect.interval, Duration::from_secs(5));

    assert_eq!(resolve_port(Some(1), &toml, 3000), 1);
    assert_eq!(resolve_port(None, &toml, 3000), 4100);
    assert_eq!(resolve_port(None, &TomlConfig::default(), 3000), 3000);

    assert_eq!(resolve_type_update_queue(None, &toml, "submit"), "custom_updates");
    assert_eq!(
        resolve_type_update_queue(None, &TomlConfig::default(), "moderate"),
        "moderate_type_updates"
    );

    assert_eq!(
        resolve_cache_path(Some(PathBuf::from("/x.json")), &toml, "submit"),
        PathBuf::from("/x.json")
    );
    assert!(resolve_cache_path(None, &TomlConfig::default(), "submit")
        .ends_with("submit-types.json"));
}

#[test]
fn test_store_settings_resolution() {
    let toml = TomlConfig::parse(SAMPLE).unwrap();

    let from_file = StoreSettings::resolve(StoreOverrides::default(), &toml);
    assert_eq!(from_file.backend, StoreBackend::Sql);
    assert_eq!(from_file.sql_url, "sqlite:///var/lib/jokes/jokes.db");
    assert_eq!(from_file.mongo_database, DEFAULT_MONGO_DATABASE);

    let overridden = StoreSettings::resolve(
        StoreOverrides {
            backend: Some(StoreBackend::Mongo),
            ..Default::default()
        },
        &toml,
    );
    assert_eq!(overridden.backend, StoreBackend::Mongo);

    let defaults = StoreSettings::resolve(StoreOverrides::default(), &TomlConfig::default());
    assert_eq!(defaults.backend, StoreBackend::Mongo);
    assert_eq!(defaults.sql_url, DEFAULT_SQL_URL);
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_default_location_uses_platform_config_dir() {
    let dir = TempDir::new().unwrap();
    let config_dir = dir.path().join("jokes");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "port = 4321").unwrap();

    let previous = std::env::var_os("XDG_CONFIG_HOME");
    std::env::set_var("XDG_CONFIG_HOME", dir.path());
    let loaded = TomlConfig::load(None);
    match previous {
        Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }

    let (config, source) = loaded.unwrap();
    assert_eq!(config.port, Some(4321));
    assert!(matches!(source, ConfigSource::File(_)));
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_default_location_missing_is_not_an_error() {
    let dir = TempDir::new().unwrap();

    let previous = std::env::var_os("XDG_CONFIG_HOME");
    std::env::set_var("XDG_CONFIG_HOME", dir.path());
    let loaded = TomlConfig::load(None);
    match previous {
        Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }

    let (_, source) = loaded.unwrap();
    assert_eq!(source, ConfigSource::Defaults);
}

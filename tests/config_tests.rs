//! Integration tests for layered resolution and loading.
//!
//! Covers defaults vs. environment, file search, nested access, rereads,
//! custom loaders, merge sequences, typed getters and unmarshalling.

use confstack::config::RawValue;
use confstack::error::LoadError;
use confstack::{Config, ConfigError, Map, Value};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Write `content` to `name` inside a fresh temp dir.
fn write_config(name: &str, content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join(name);
    fs::write(&path, content).expect("Failed to write config file");
    (dir, path)
}

fn map(value: serde_json::Value) -> Map {
    match Value::from(value) {
        Value::Map(map) => map,
        other => panic!("expected a map, got {other:?}"),
    }
}

#[test]
fn defaults_overridden_by_env() {
    let config = Config::new();
    config.set_env_prefix("CONFSTACK_IT_DEFAULTS");
    config.set_default("port", 8080);
    assert_eq!(config.get_int("port"), 8080);

    // SAFETY: variable name is unique to this test
    unsafe { std::env::set_var("CONFSTACK_IT_DEFAULTS_PORT", "9001") };
    assert_eq!(config.get_int("port"), 9001, "env should override default");
    // SAFETY: see above
    unsafe { std::env::remove_var("CONFSTACK_IT_DEFAULTS_PORT") };
}

#[test]
fn read_explicit_yaml_file() {
    let (_dir, path) = write_config("cfg.yaml", "debug: true\nvalue: 42\n");

    let config = Config::new();
    config.set_config_file(&path);
    config.read_in_config().expect("Failed to read config");

    assert!(config.get_bool("debug"));
    assert_eq!(config.get_int("value"), 42);
    assert_eq!(config.config_file_used(), Some(path));
}

#[test]
fn config_name_and_search_path() {
    let (dir, _path) = write_config("conf.toml", "port=9000\n");

    let config = Config::new();
    config.set_config_name("conf");
    config.set_config_type("toml");
    config.add_config_path(dir.path().to_str().expect("utf-8 temp path"));
    config.read_in_config().expect("Failed to find config by name");

    assert_eq!(config.get_int("port"), 9000);
}

#[test]
fn missing_named_file_is_an_error() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = Config::new();
    config.set_config_name("absent");
    config.add_config_path(dir.path().to_str().expect("utf-8 temp path"));

    let err = config.read_in_config().unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound { .. }), "got {err:?}");
}

#[test]
fn nested_access_json_and_yaml() {
    let cases = [
        ("cfg.json", r#"{"database":{"hosts":["db1","db2"],"port":5432}}"#),
        (
            "cfg.yaml",
            "database:\n  hosts:\n    - db1\n    - db2\n  port: 5432\n",
        ),
    ];

    for (name, content) in cases {
        let (_dir, path) = write_config(name, content);
        let config = Config::new();
        config.set_config_file(&path);
        config.read_in_config().expect("Failed to read config");

        assert_eq!(config.get_string("database.hosts.0"), "db1", "{name}");
        assert_eq!(config.get_int("database.port"), 5432, "{name}");
        assert_eq!(config.get_string("database.hosts.2"), "", "{name}");
        assert_eq!(config.get_string("database.hosts.x"), "", "{name}");
    }
}

#[test]
fn dotted_literal_key_wins_over_traversal() {
    let config = Config::new();
    config.merge_config_map(&map(json!({
        "a.b": "literal",
        "a": {"b": "nested"}
    })));
    assert_eq!(config.get_string("a.b"), "literal");
}

#[test]
fn nested_env_override_with_automatic_env() {
    let (_dir, path) = write_config("cfg.yaml", "database:\n  hosts:\n    - db1\n    - db2\n");

    let config = Config::new();
    config.set_env_prefix("CONFSTACK_IT_NESTED");
    config.automatic_env();
    config.set_config_file(&path);
    config.read_in_config().expect("Failed to read config");

    // SAFETY: variable name is unique to this test
    unsafe { std::env::set_var("CONFSTACK_IT_NESTED_DATABASE_HOSTS_1", "db-override") };
    assert_eq!(config.get_string("database.hosts.1"), "db-override");
    assert_eq!(config.get_string("database.hosts.0"), "db1");
    // SAFETY: see above
    unsafe { std::env::remove_var("CONFSTACK_IT_NESTED_DATABASE_HOSTS_1") };
}

#[test]
fn reread_removes_missing_keys() {
    let (_dir, path) = write_config("cfg.yaml", "keep: 1\nremove: 2\n");

    let config = Config::new();
    config.set_config_file(&path);
    config.read_in_config().expect("Failed to read config");
    assert_eq!(config.get_int("keep"), 1);
    assert_eq!(config.get_int("remove"), 2);

    fs::write(&path, "keep: 3\n").expect("Failed to rewrite config");
    config.read_in_config().expect("Failed to reread config");

    assert_eq!(config.get_int("keep"), 3);
    assert!(!config.is_set("remove"), "remove key should be cleared");
    assert_eq!(config.get_int("remove"), 0);
}

#[test]
fn failed_reread_keeps_previous_values() {
    let (_dir, path) = write_config("cfg.json", r#"{"value": 1}"#);

    let config = Config::new();
    config.set_config_file(&path);
    config.read_in_config().expect("Failed to read config");

    fs::write(&path, "{not json").expect("Failed to rewrite config");
    let err = config.read_in_config().unwrap_err();
    assert!(matches!(err, ConfigError::Decode { .. }), "got {err:?}");
    assert_eq!(config.get_int("value"), 1);
}

#[test]
fn custom_loader_for_file_and_reader() {
    let (_dir, path) = write_config("cfg.fake", "value-from-file\n");

    let config = Config::new();
    config.register_loader("fake", |data: &[u8]| -> Result<RawValue, LoadError> {
        let text = String::from_utf8_lossy(data).trim().to_string();
        Ok(RawValue::map([("raw", RawValue::from(text))]))
    });
    config.set_config_file(&path);
    config
        .read_in_config()
        .expect("Failed to read config with custom loader");
    assert_eq!(config.get_string("raw"), "value-from-file");

    config.set_config_type("fake");
    config
        .read_config("value-from-reader\n".as_bytes())
        .expect("Failed to read config from reader");
    assert_eq!(config.get_string("raw"), "value-from-reader");
}

#[test]
fn replacing_builtin_loader_applies_to_later_reads() {
    let config = Config::new();
    config.set_config_type(".JSON");
    config.register_loader("json", |_: &[u8]| -> Result<RawValue, LoadError> {
        Ok(RawValue::map([("replaced", RawValue::from(true))]))
    });
    config
        .read_config("{}".as_bytes())
        .expect("Failed to read with replaced loader");
    assert!(config.get_bool("replaced"));
}

#[test]
fn unknown_format_is_rejected() {
    let config = Config::new();
    config.set_config_type("hcl");
    let err = config.read_config("a = 1".as_bytes()).unwrap_err();
    assert!(
        matches!(err, ConfigError::UnsupportedFormat { ref format } if format == "hcl"),
        "got {err:?}"
    );
}

#[test]
fn ini_and_xml_files() {
    let (_ini_dir, ini) = write_config("cfg.ini", "name = app\n\n[server]\nport = 8080\n");
    let config = Config::new();
    config.set_config_file(&ini);
    config.read_in_config().expect("Failed to read ini");
    assert_eq!(config.get_string("name"), "app");
    assert_eq!(config.get_int("server.port"), 8080);

    let (_xml_dir, xml) = write_config(
        "cfg.xml",
        "<config><server port=\"9000\"><host>localhost</host></server></config>",
    );
    let config = Config::new();
    config.set_config_file(&xml);
    config.read_in_config().expect("Failed to read xml");
    assert_eq!(config.get_string("server.host"), "localhost");
    assert_eq!(config.get_int("server.@port"), 9000);
}

#[test]
fn merge_sequence_of_maps_and_readers() {
    let config = Config::new();
    config.merge_config_map(&map(json!({
        "server": {"host": "localhost", "port": 8080}
    })));

    config.set_config_type("yaml");
    config
        .read_config("server:\n  port: 9000\n  ssl: true\nfeature:\n  enabled: true\n".as_bytes())
        .expect("Failed to read yaml reader");

    config.merge_config_map(&map(json!({
        "feature": {"name": "beta", "enabled": false},
        "extra": "value"
    })));

    assert_eq!(config.get_string("server.host"), "localhost");
    assert_eq!(config.get_int("server.port"), 9000);
    assert!(config.get_bool("server.ssl"));
    assert!(!config.get_bool("feature.enabled"));
    assert_eq!(config.get_string("feature.name"), "beta");
    assert_eq!(config.get_string("extra"), "value");
}

#[test]
fn sequences_are_replaced_not_concatenated() {
    let config = Config::new();
    config.merge_config_map(&map(json!({"hosts": ["a", "b", "c"]})));
    config.merge_config_map(&map(json!({"hosts": ["z"]})));
    assert_eq!(config.get_string_vec("hosts"), vec!["z"]);
}

#[test]
fn typed_getters() {
    let config = Config::new();
    config.merge_config_map(&map(json!({
        "number": "3.14",
        "duration": "5s",
        "strings": ["a", 2, true],
        "ints": ["1", 2, 3.0],
        "csv": "x, y",
        "mapping": {"key": 12, "list": ["x", "y"]}
    })));

    assert_eq!(config.get_float("number"), 3.14);
    assert_eq!(config.get_int("number"), 0);
    assert_eq!(config.get_duration("duration"), Duration::from_secs(5));
    assert_eq!(config.get_string_vec("strings"), vec!["a", "2", "true"]);
    assert_eq!(config.get_string_vec("csv"), vec!["x", "y"]);
    assert_eq!(config.get_int_vec("ints"), vec![1, 2, 3]);

    let string_map = config.get_string_map("mapping");
    assert_eq!(string_map["key"].to_string(), "12");
    assert_eq!(config.get_string_map_string("mapping")["key"], "12");
    assert_eq!(
        config.get_string_map_string_vec("mapping")["list"],
        vec!["x", "y"]
    );

    assert_eq!(config.get_string("mapping.missing"), "");
    assert!(!config.get_bool("missing"));
    assert!(config.get_string_map("missing").is_empty());
}

#[derive(Debug, Deserialize)]
struct AppConfig {
    server: ServerConfig,
    #[serde(rename = "feature")]
    features: FeatureConfig,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    host: String,
    port: u16,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct FeatureConfig {
    enabled: bool,
    #[serde(default)]
    tags: Vec<String>,
}

#[test]
fn unmarshal_root_and_key() {
    let config = Config::new();
    config.merge_config_map(&map(json!({
        "server": {"host": "localhost", "port": "8080", "timeout": "10s"},
        "feature": {"enabled": "true"}
    })));

    let app: AppConfig = config.unmarshal().expect("Failed to unmarshal root");
    assert_eq!(app.server.host, "localhost");
    assert_eq!(app.server.port, 8080);
    assert_eq!(app.server.timeout, Duration::from_secs(10));
    assert!(app.features.enabled);
    assert!(app.features.tags.is_empty());

    #[derive(Deserialize)]
    struct HostOnly {
        host: String,
    }
    let server: HostOnly = config
        .unmarshal_key("server")
        .expect("Failed to unmarshal server");
    assert_eq!(server.host, "localhost");

    let err = config.unmarshal_key::<HostOnly>("missing").err();
    assert!(matches!(err, Some(ConfigError::MissingKey { .. })));
}

#[test]
fn unmarshal_shape_error() {
    let config = Config::new();
    config.merge_config_map(&map(json!({"server": {"port": "not-a-number"}})));

    #[derive(Debug, Deserialize)]
    struct Server {
        #[allow(dead_code)]
        port: u16,
    }
    let err = config.unmarshal_key::<Server>("server").unwrap_err();
    assert!(matches!(err, ConfigError::Unmarshal(_)), "got {err:?}");
}

#[test]
fn all_settings_layers_values_over_defaults() {
    let config = Config::new();
    config.set_default("server", Value::from(map(json!({"host": "0.0.0.0", "port": 80}))));
    config.merge_config_map(&map(json!({"server": {"port": 8080}})));

    assert_eq!(
        Value::Map(config.all_settings()),
        Value::from(json!({"server": {"host": "0.0.0.0", "port": 8080}}))
    );
    assert_eq!(config.all_keys(), vec!["server.host", "server.port"]);
}

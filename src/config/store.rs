//! The layered store: defaults, file values and environment behind one handle.

use super::coerce;
use super::loader::{Loader, LoaderRegistry, normalize_format};
use super::merge::{deep_merge, deep_merge_all};
use super::path::{leaf_keys, resolve};
use super::watcher::{WatchHandle, WatcherConfig, on_listener_thread};
use crate::de;
use crate::error::{ConfigError, Result};
use crate::value::{Map, Value};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// A configuration store resolving keys across defaults, a config file and
/// the environment.
///
/// Lookup order for [`get`](Config::get):
/// 1. the environment, when [`automatic_env`](Config::automatic_env) is on
/// 2. values read from files, readers or merged maps
/// 3. the environment (bound or implied variable name)
/// 4. defaults
///
/// `Config` is a cheap handle; clones share the same store. The active watch
/// is closed when the last handle is dropped.
#[derive(Clone, Default)]
pub struct Config {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: RwLock<State>,
    watch: Mutex<Option<WatchHandle>>,
}

struct State {
    defaults: Map,
    values: Map,
    env_prefix: Option<String>,
    env_bindings: HashMap<String, String>,
    automatic_env: bool,
    config_name: Option<String>,
    config_type: Option<String>,
    config_paths: Vec<PathBuf>,
    config_file: Option<PathBuf>,
    resolved_file: Option<PathBuf>,
    loaders: LoaderRegistry,
    on_change: Option<ChangeCallback>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            defaults: Map::new(),
            values: Map::new(),
            env_prefix: None,
            env_bindings: HashMap::new(),
            automatic_env: false,
            config_name: None,
            config_type: None,
            config_paths: vec![PathBuf::from(".")],
            config_file: None,
            resolved_file: None,
            loaders: LoaderRegistry::with_defaults(),
            on_change: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("Config")
            .field("config_file", &state.config_file.as_ref().or(state.resolved_file.as_ref()))
            .field("env_prefix", &state.env_prefix)
            .field("automatic_env", &state.automatic_env)
            .field("loaders", &state.loaders)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Sources ---

    /// Set the value used when no other layer has `key`.
    ///
    /// The key is stored as given; a dotted key still resolves because exact
    /// top-level matches are tried before path traversal.
    pub fn set_default(&self, key: &str, value: impl Into<Value>) {
        self.shared
            .state
            .write()
            .defaults
            .insert(key.to_string(), value.into());
    }

    /// Prefix for implied environment variable names (`PREFIX_KEY`). Empty clears it.
    pub fn set_env_prefix(&self, prefix: &str) {
        self.shared.state.write().env_prefix = non_empty(prefix);
    }

    /// Read `key` from the environment variable `env` instead of the implied name.
    pub fn bind_env(&self, key: &str, env: &str) {
        self.shared
            .state
            .write()
            .env_bindings
            .insert(key.to_string(), env.to_string());
    }

    /// Let the environment outrank file values for every key.
    pub fn automatic_env(&self) {
        self.shared.state.write().automatic_env = true;
    }

    /// Base name of the config file to search for, without extension.
    pub fn set_config_name(&self, name: &str) {
        self.shared.state.write().config_name = non_empty(name);
    }

    /// Format of the config file; also the format used by [`read_config`](Config::read_config).
    pub fn set_config_type(&self, config_type: &str) {
        self.shared.state.write().config_type = non_empty(&normalize_format(config_type));
    }

    /// Append a directory to the search path. `~` and `$HOME` expand to the home directory.
    pub fn add_config_path(&self, path: &str) {
        let path = expand_home(path);
        debug!(path = %path.display(), "Added config search path");
        self.shared.state.write().config_paths.push(path);
    }

    /// Use this file directly, skipping the search. An empty path clears it.
    pub fn set_config_file(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.shared.state.write().config_file =
            (!path.as_os_str().is_empty()).then_some(path);
    }

    /// Register `loader` for `format`, replacing any loader already registered for it.
    pub fn register_loader(&self, format: &str, loader: impl Loader + 'static) {
        self.shared.state.write().loaders.register(format, loader);
    }

    // --- Loading ---

    /// Locate, read and decode the config file, replacing all file values.
    ///
    /// Without a config file or config name this does nothing. On error the
    /// current values are left untouched.
    pub fn read_in_config(&self) -> Result<()> {
        let mut state = self.shared.state.write();
        let Some(path) = state.locate_file()? else {
            debug!("No config file or name set, skipping read");
            return Ok(());
        };
        let loaded = state.load_file(&path)?;
        state.values = deep_merge(Map::new(), loaded);
        info!(path = %path.display(), "Loaded config file");
        state.resolved_file = Some(path);
        Ok(())
    }

    /// Decode `reader` with the configured type and merge it over the current values.
    pub fn read_config(&self, mut reader: impl Read) -> Result<()> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        let mut state = self.shared.state.write();
        let format = state
            .config_type
            .clone()
            .ok_or(ConfigError::ConfigTypeUnset)?;
        let loaded = state.loaders.decode(&data, &format)?;
        let values = std::mem::take(&mut state.values);
        state.values = deep_merge(values, loaded);
        debug!(format = %format, "Merged config from reader");
        Ok(())
    }

    /// Deep-merge a copy of `map` over the current values.
    pub fn merge_config_map(&self, map: &Map) {
        let mut state = self.shared.state.write();
        let values = std::mem::take(&mut state.values);
        state.values = deep_merge(values, map.clone());
    }

    // --- Reads ---

    /// Resolve `key` across all layers.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.shared.state.read().lookup(key).map(Cow::into_owned)
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.shared.state.read().lookup(key).is_some()
    }

    pub fn get_string(&self, key: &str) -> String {
        self.read_with(key, coerce::to_string)
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.read_with(key, coerce::to_int)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.read_with(key, coerce::to_bool)
    }

    pub fn get_float(&self, key: &str) -> f64 {
        self.read_with(key, coerce::to_float)
    }

    pub fn get_duration(&self, key: &str) -> Duration {
        self.read_with(key, coerce::to_duration)
    }

    pub fn get_string_vec(&self, key: &str) -> Vec<String> {
        self.read_with(key, coerce::to_string_vec)
    }

    pub fn get_int_vec(&self, key: &str) -> Vec<i64> {
        self.read_with(key, coerce::to_int_vec)
    }

    pub fn get_string_map(&self, key: &str) -> Map {
        self.read_with(key, coerce::to_string_map)
    }

    pub fn get_string_map_string(&self, key: &str) -> BTreeMap<String, String> {
        self.read_with(key, coerce::to_string_map_string)
    }

    pub fn get_string_map_string_vec(&self, key: &str) -> BTreeMap<String, Vec<String>> {
        self.read_with(key, coerce::to_string_map_string_vec)
    }

    /// Defaults with file values merged over them. Environment is not included.
    pub fn all_settings(&self) -> Map {
        let state = self.shared.state.read();
        deep_merge_all([state.defaults.clone(), state.values.clone()])
    }

    /// Sorted dotted paths of every leaf in [`all_settings`](Config::all_settings).
    pub fn all_keys(&self) -> Vec<String> {
        leaf_keys(&self.all_settings())
    }

    /// The explicit config file, or the one found by the last successful search.
    pub fn config_file_used(&self) -> Option<PathBuf> {
        let state = self.shared.state.read();
        state
            .config_file
            .clone()
            .or_else(|| state.resolved_file.clone())
    }

    /// Deserialize all file values into `T`.
    pub fn unmarshal<T: DeserializeOwned>(&self) -> Result<T> {
        self.unmarshal_key("")
    }

    /// Deserialize the value at `key` into `T` with weak typing.
    ///
    /// The empty key selects all file values.
    pub fn unmarshal_key<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = {
            let state = self.shared.state.read();
            if key.is_empty() {
                Value::Map(state.values.clone())
            } else {
                state
                    .lookup(key)
                    .map(Cow::into_owned)
                    .ok_or_else(|| ConfigError::MissingKey {
                        key: key.to_string(),
                    })?
            }
        };
        Ok(de::from_value(value)?)
    }

    fn read_with<R: Default>(&self, key: &str, convert: impl FnOnce(&Value) -> R) -> R {
        let state = self.shared.state.read();
        state
            .lookup(key)
            .map(|value| convert(&*value))
            .unwrap_or_default()
    }

    // --- Watching ---

    /// Callback run after every successful reload triggered by the watcher.
    ///
    /// Runs on the watcher thread with no lock held, so it may read the store.
    /// A callback holding a clone of this `Config` keeps the store alive; stop
    /// such a watch with [`close`](Config::close).
    pub fn on_config_change(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.shared.state.write().on_change = Some(Arc::new(callback));
    }

    /// Watch the config file with the default [`WatcherConfig`].
    pub fn watch_config(&self) -> Result<()> {
        self.watch_config_with(WatcherConfig::default())
    }

    /// Start reloading the config file whenever it is written.
    ///
    /// Does nothing if a watch is already running or no config file is known.
    pub fn watch_config_with(&self, config: WatcherConfig) -> Result<()> {
        let Some(mut slot) = self.lock_watch_slot() else {
            debug!("Watch slot busy with a concurrent close, not starting");
            return Ok(());
        };
        if slot.is_some() {
            return Ok(());
        }
        let Some(path) = self.config_file_used() else {
            debug!("No config file to watch");
            return Ok(());
        };

        let weak = Arc::downgrade(&self.shared);
        let watched = path.clone();
        let handle = WatchHandle::start(&path, config, move || reload(&weak, &watched))?;
        *slot = Some(handle);
        Ok(())
    }

    /// Stop watching. No reload or callback runs after this returns.
    ///
    /// Safe to call from inside the change callback.
    pub fn close(&self) {
        if let Some(mut slot) = self.lock_watch_slot() {
            if let Some(handle) = slot.take() {
                handle.stop();
            }
        }
    }

    /// Inside a callback a blocking lock could wait on a `close` that is
    /// joining this very thread, so only try.
    fn lock_watch_slot(&self) -> Option<MutexGuard<'_, Option<WatchHandle>>> {
        if on_listener_thread() {
            self.shared.watch.try_lock()
        } else {
            Some(self.shared.watch.lock())
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(handle) = self.watch.get_mut().take() {
            handle.stop();
        }
    }
}

/// Watcher-side reload: replace values under the write lock, then notify outside it.
fn reload(shared: &Weak<Shared>, path: &Path) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let callback = {
        let mut state = shared.state.write();
        match state.load_file(path) {
            Ok(loaded) => state.values = deep_merge(Map::new(), loaded),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Config reload failed, keeping previous values");
                return;
            }
        }
        info!(path = %path.display(), "Config reloaded");
        state.on_change.clone()
    };
    if let Some(callback) = callback {
        callback();
    }
}

impl State {
    fn lookup(&self, key: &str) -> Option<Cow<'_, Value>> {
        if self.automatic_env {
            if let Some(value) = self.env_value(key) {
                return Some(Cow::Owned(value));
            }
        }
        if let Some(value) = resolve(&self.values, key) {
            return Some(Cow::Borrowed(value));
        }
        if let Some(value) = self.env_value(key) {
            return Some(Cow::Owned(value));
        }
        resolve(&self.defaults, key).map(Cow::Borrowed)
    }

    fn env_value(&self, key: &str) -> Option<Value> {
        let name = self.env_name(key);
        std::env::var(&name).ok().map(Value::String)
    }

    fn env_name(&self, key: &str) -> String {
        if let Some(bound) = self.env_bindings.get(key) {
            return bound.clone();
        }
        let implied = key.replace('.', "_").to_uppercase();
        match &self.env_prefix {
            Some(prefix) => format!("{prefix}_{implied}"),
            None => implied,
        }
    }

    fn locate_file(&self) -> Result<Option<PathBuf>> {
        if let Some(file) = &self.config_file {
            return Ok(Some(file.clone()));
        }
        let Some(name) = &self.config_name else {
            return Ok(None);
        };

        let mut searched = Vec::new();
        for dir in &self.config_paths {
            for candidate in self.candidates(dir, name) {
                if candidate.is_file() {
                    debug!(path = %candidate.display(), "Found config file");
                    return Ok(Some(candidate));
                }
                searched.push(candidate);
            }
        }
        Err(ConfigError::FileNotFound {
            name: name.clone(),
            searched,
        })
    }

    fn candidates(&self, dir: &Path, name: &str) -> Vec<PathBuf> {
        match &self.config_type {
            Some(ext) => vec![dir.join(format!("{name}.{ext}"))],
            None => self
                .loaders
                .formats()
                .iter()
                .map(|ext| dir.join(format!("{name}.{ext}")))
                .chain(std::iter::once(dir.join(name)))
                .collect(),
        }
    }

    fn load_file(&self, path: &Path) -> Result<Map> {
        let data = std::fs::read(path).map_err(|e| ConfigError::file(path, e))?;
        let format = self.file_format(path)?;
        self.loaders.decode(&data, &format)
    }

    /// The file's extension, falling back to the configured type.
    fn file_format(&self, path: &Path) -> Result<String> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(str::to_lowercase)
            .or_else(|| self.config_type.clone())
            .ok_or_else(|| ConfigError::UnsupportedFormat {
                format: String::new(),
            })
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn expand_home(path: &str) -> PathBuf {
    for prefix in ["~", "$HOME"] {
        let Some(rest) = path.strip_prefix(prefix) else {
            continue;
        };
        if !(rest.is_empty() || rest.starts_with(['/', '\\'])) {
            continue;
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches(['/', '\\']));
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn map(value: serde_json::Value) -> Map {
        match Value::from(value) {
            Value::Map(map) => map,
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence_values_over_defaults() {
        let config = Config::new();
        config.set_default("port", 8080);
        config.set_default("host", "localhost");
        config.merge_config_map(&map(json!({"port": 9000})));

        assert_eq!(config.get_int("port"), 9000);
        assert_eq!(config.get_string("host"), "localhost");
        assert_eq!(config.get("missing"), None);
        assert!(!config.is_set("missing"));
    }

    #[test]
    fn test_env_name_derivation() {
        let mut state = State::default();
        assert_eq!(state.env_name("database.port"), "DATABASE_PORT");

        state.env_prefix = Some("APP".into());
        assert_eq!(state.env_name("database.port"), "APP_DATABASE_PORT");

        state
            .env_bindings
            .insert("database.port".into(), "DB_PORT".into());
        assert_eq!(state.env_name("database.port"), "DB_PORT");
    }

    #[test]
    fn test_bound_env_between_values_and_defaults() {
        let config = Config::new();
        config.bind_env("store.bound", "CONFSTACK_STORE_TEST_BOUND");
        config.set_default("store.bound", "default");
        // SAFETY: variable name is unique to this test
        unsafe { std::env::set_var("CONFSTACK_STORE_TEST_BOUND", "from-env") };

        assert_eq!(config.get_string("store.bound"), "from-env");
        config.merge_config_map(&map(json!({"store": {"bound": "from-values"}})));
        assert_eq!(config.get_string("store.bound"), "from-values");

        // SAFETY: see above
        unsafe { std::env::remove_var("CONFSTACK_STORE_TEST_BOUND") };
    }

    #[test]
    fn test_automatic_env_outranks_values() {
        let config = Config::new();
        config.set_env_prefix("CONFSTACK_STORE_AUTO");
        config.merge_config_map(&map(json!({"level": "values"})));
        // SAFETY: variable name is unique to this test
        unsafe { std::env::set_var("CONFSTACK_STORE_AUTO_LEVEL", "env") };

        assert_eq!(config.get_string("level"), "values");
        config.automatic_env();
        assert_eq!(config.get_string("level"), "env");

        // SAFETY: see above
        unsafe { std::env::remove_var("CONFSTACK_STORE_AUTO_LEVEL") };
    }

    #[test]
    fn test_merge_copies_argument() {
        let config = Config::new();
        let mut source = map(json!({"server": {"port": 1}}));
        config.merge_config_map(&source);
        source.insert("server".into(), Value::from(2));

        assert_eq!(config.get_int("server.port"), 1);
    }

    #[test]
    fn test_read_config_requires_type() {
        let config = Config::new();
        let err = config.read_config("a: 1".as_bytes()).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigTypeUnset));
    }

    #[test]
    fn test_failed_read_keeps_values() {
        let config = Config::new();
        config.set_config_type("json");
        config.read_config(r#"{"a": 1}"#.as_bytes()).unwrap();

        let err = config.read_config("{broken".as_bytes()).unwrap_err();
        assert!(matches!(err, ConfigError::Decode { .. }));
        assert_eq!(config.get_int("a"), 1);
    }

    #[test]
    fn test_read_in_config_without_name_is_noop() {
        let config = Config::new();
        config.read_in_config().unwrap();
        assert_eq!(config.config_file_used(), None);
    }

    #[test]
    fn test_search_tries_registered_extensions() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("app.toml"), "port = 7000\n").unwrap();

        let config = Config::new();
        config.set_config_name("app");
        config.add_config_path(temp.path().to_str().unwrap());
        config.read_in_config().unwrap();

        assert_eq!(config.get_int("port"), 7000);
        assert_eq!(
            config.config_file_used(),
            Some(temp.path().join("app.toml"))
        );
    }

    #[test]
    fn test_search_reports_missing_file() {
        let temp = TempDir::new().unwrap();
        let config = Config::new();
        config.set_config_name("nowhere");
        config.set_config_type("yaml");
        config.add_config_path(temp.path().to_str().unwrap());

        match config.read_in_config() {
            Err(ConfigError::FileNotFound { name, searched }) => {
                assert_eq!(name, "nowhere");
                assert_eq!(searched.len(), 2);
                assert_eq!(searched[1], temp.path().join("nowhere.yaml"));
            }
            other => panic!("expected FileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_extensionless_file_uses_config_type() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("settings");
        std::fs::write(&file, "name: demo\n").unwrap();

        let config = Config::new();
        config.set_config_file(&file);
        assert!(matches!(
            config.read_in_config(),
            Err(ConfigError::UnsupportedFormat { .. })
        ));

        config.set_config_type("YAML");
        config.read_in_config().unwrap();
        assert_eq!(config.get_string("name"), "demo");
    }

    #[test]
    fn test_all_settings_and_keys() {
        let config = Config::new();
        config.set_default("log.level", "info");
        config.set_default("workers", 4);
        config.merge_config_map(&map(json!({"server": {"host": "a", "port": 1}, "workers": 8})));

        let all = config.all_settings();
        assert_eq!(all["workers"], Value::from(8));
        assert_eq!(
            config.all_keys(),
            vec!["log.level", "server.host", "server.port", "workers"]
        );
    }

    #[test]
    fn test_unmarshal_missing_key() {
        let config = Config::new();
        let err = config.unmarshal_key::<String>("absent").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key } if key == "absent"));
    }

    #[test]
    fn test_close_without_watch() {
        let config = Config::new();
        config.close();
        config.watch_config().unwrap();
        config.close();
    }

    #[test]
    fn test_expand_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_home("~"), home);
        assert_eq!(expand_home("~/conf"), home.join("conf"));
        assert_eq!(expand_home("$HOME/conf"), home.join("conf"));
        assert_eq!(expand_home("~other"), PathBuf::from("~other"));
        assert_eq!(expand_home("/etc/app"), PathBuf::from("/etc/app"));
    }
}

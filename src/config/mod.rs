//! Layered configuration store.
//!
//! Values come from three layers, resolved per key in this order:
//! 1. **Environment** - first when automatic mode is on, otherwise after file values
//! 2. **File values** - the config file, readers and merged maps, deep-merged
//! 3. **Defaults** - set programmatically
//!
//! ## Merge Strategy
//! - Maps merge key by key, recursively
//! - Everything else (scalars, sequences) is replaced wholesale
//! - Rereading the config file replaces all file values; readers and maps merge on top
//!
//! ## Environment Variables
//! A key maps to `PREFIX_` + the key uppercased with `.` replaced by `_`
//! (`database.port` → `APP_DATABASE_PORT`), unless bound explicitly with
//! [`Config::bind_env`].

pub(crate) mod coerce;
pub(crate) mod duration;
mod loader;
mod merge;
mod normalize;
mod path;
mod store;
mod watcher;

pub use duration::parse_duration;
pub use loader::{
    IniLoader, JsonLoader, Loader, LoaderRegistry, TomlLoader, XmlLoader, YamlLoader,
    normalize_format,
};
pub use merge::{deep_merge, deep_merge_all};
pub use normalize::{RawValue, normalize, normalize_map};
pub use path::{leaf_keys, resolve};
pub use store::Config;
pub use watcher::WatcherConfig;

//! Error types for configuration loading and decoding.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by a [`Loader`](crate::config::Loader).
pub type LoadError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while resolving, decoding or watching configuration.
///
/// Typed getters never return these; they degrade to zero values instead.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No loader is registered for the resolved extension or config type.
    #[error("unsupported config type '{format}'")]
    UnsupportedFormat { format: String },

    /// The loader rejected the input.
    #[error("failed to decode {format} config: {source}")]
    Decode {
        format: String,
        #[source]
        source: LoadError,
    },

    /// No file matched the configured name across the search paths.
    #[error("config file '{name}' not found in {searched:?}")]
    FileNotFound { name: String, searched: Vec<PathBuf> },

    /// Structured decode was requested for a key that resolves to nothing.
    #[error("key '{key}' not found")]
    MissingKey { key: String },

    /// An in-memory read was attempted without a declared format.
    #[error("config type not set")]
    ConfigTypeUnset,

    /// Structured decode could not reconcile the stored shape with the target type.
    #[error("failed to unmarshal config: {0}")]
    Unmarshal(#[from] crate::de::Error),

    /// I/O error on a specific config file.
    #[error("I/O error on '{path}': {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error without path context (reader input).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file notifier could not be set up.
    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl ConfigError {
    pub(crate) fn decode(format: &str, source: impl Into<LoadError>) -> Self {
        ConfigError::Decode {
            format: format.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ConfigError::File {
            path: path.into(),
            source,
        }
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

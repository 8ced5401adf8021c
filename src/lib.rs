//! confstack: layered configuration with live reload
//!
//! This module exports the store, the value model and the supporting pieces
//! (loaders, merge, weakly typed decoding) for embedding and testing.

pub mod cli;
pub mod config;
pub mod de;
pub mod error;
pub mod logging;
pub mod value;

pub use config::Config;
pub use error::{ConfigError, Result};
pub use value::{Map, Value};

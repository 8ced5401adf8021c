//! CLI command definitions for confstack
//!
//! This module defines the CLI structure using clap's derive macros.
//! The flags describe how to assemble a [`Config`]; subcommands read from it.

use crate::config::Config;
use crate::value::{Map, Value};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Resolve layered configuration from defaults, files and the environment
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Explicit config file (skips the search)
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    /// Config file base name to search for
    #[arg(short, long, global = true)]
    pub name: Option<String>,

    /// Config format (json, yaml, toml, ini, xml); required for files without an extension
    #[arg(short = 't', long = "type", global = true)]
    pub config_type: Option<String>,

    /// Directory to search for the config file (repeatable)
    #[arg(short, long = "path", global = true)]
    pub paths: Vec<String>,

    /// Prefix for implied environment variable names
    #[arg(short, long, global = true)]
    pub env_prefix: Option<String>,

    /// Let environment variables outrank file values
    #[arg(short, long, global = true)]
    pub automatic_env: bool,

    /// Default value as key=value (repeatable)
    #[arg(short, long = "default", value_parser = parse_key_val, global = true)]
    pub defaults: Vec<(String, String)>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resolved value of each key
    Get {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Print all settings (defaults merged with file values)
    Dump(DumpArgs),

    /// Print all settings again every time the config file changes
    Watch(DumpArgs),
}

/// Arguments for the dump and watch subcommands
#[derive(Args, Debug, Clone)]
pub struct DumpArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = DumpFormat::Json)]
    pub format: DumpFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DumpFormat {
    #[default]
    Json,
    Yaml,
}

impl DumpFormat {
    /// Render a settings map.
    pub fn render(self, settings: &Map) -> Result<String> {
        let rendered = match self {
            Self::Json => serde_json::to_string_pretty(settings)?,
            Self::Yaml => serde_yaml::to_string(settings)?,
        };
        Ok(rendered)
    }
}

impl Cli {
    /// Build a store from the flags and read the config file, if one is configured.
    pub fn build_config(&self) -> Result<Config> {
        let config = Config::new();
        for (key, value) in &self.defaults {
            config.set_default(key, Value::String(value.clone()));
        }
        if let Some(prefix) = &self.env_prefix {
            config.set_env_prefix(prefix);
        }
        if self.automatic_env {
            config.automatic_env();
        }
        if let Some(config_type) = &self.config_type {
            config.set_config_type(config_type);
        }
        if let Some(name) = &self.name {
            config.set_config_name(name);
        }
        for path in &self.paths {
            config.add_config_path(path);
        }
        if let Some(file) = &self.file {
            config.set_config_file(file);
        }
        config
            .read_in_config()
            .context("Failed to read config file")?;
        Ok(config)
    }
}

/// Parse a `key=value` pair. The value may itself contain `=`.
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

//! Canonicalization of decoded documents.
//!
//! Loaders hand back a [`RawValue`] in whatever shape their format produces:
//! YAML maps keyed by integers or booleans, TOML datetimes, unsigned numbers
//! beyond `i64`. [`normalize`] rewrites that into the single [`Value`] shape the
//! merge engine and path accessor operate on.

use crate::value::{Map, Value};

/// Loader output before normalization. Map keys may be any raw value.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Seq(Vec<RawValue>),
    Map(Vec<(RawValue, RawValue)>),
}

impl RawValue {
    /// Build a raw map from key/value pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<RawValue>,
        V: Into<RawValue>,
    {
        RawValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Normalize a raw tree into an owned [`Value`].
///
/// - every map key becomes its canonical string form (same rule as string coercion)
/// - unsigned integers that do not fit `i64` become floats
/// - applies recursively through sequences and maps
pub fn normalize(raw: RawValue) -> Value {
    match raw {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(b),
        RawValue::Int(i) => Value::Integer(i),
        RawValue::UInt(u) => match i64::try_from(u) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Float(u as f64),
        },
        RawValue::Float(x) => Value::Float(x),
        RawValue::String(s) => Value::String(s),
        RawValue::Seq(items) => Value::Seq(items.into_iter().map(normalize).collect()),
        RawValue::Map(entries) => Value::Map(normalize_map(entries)),
    }
}

/// Normalize raw map entries. When two keys share a string form, the later one wins.
pub fn normalize_map(entries: Vec<(RawValue, RawValue)>) -> Map {
    entries
        .into_iter()
        .map(|(key, value)| (key_string(key), normalize(value)))
        .collect()
}

fn key_string(key: RawValue) -> String {
    match key {
        RawValue::String(s) => s,
        other => normalize(other).to_string(),
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::String(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::String(s)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Bool(b)
    }
}

impl From<i64> for RawValue {
    fn from(i: i64) -> Self {
        RawValue::Int(i)
    }
}

impl From<f64> for RawValue {
    fn from(x: f64) -> Self {
        RawValue::Float(x)
    }
}

impl From<Vec<RawValue>> for RawValue {
    fn from(items: Vec<RawValue>) -> Self {
        RawValue::Seq(items)
    }
}

fn number(i: Option<i64>, u: Option<u64>, f: Option<f64>) -> RawValue {
    match (i, u, f) {
        (Some(i), _, _) => RawValue::Int(i),
        (None, Some(u), _) => RawValue::UInt(u),
        (None, None, Some(f)) => RawValue::Float(f),
        (None, None, None) => RawValue::Null,
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => RawValue::Null,
            Json::Bool(b) => RawValue::Bool(b),
            Json::Number(n) => number(n.as_i64(), n.as_u64(), n.as_f64()),
            Json::String(s) => RawValue::String(s),
            Json::Array(items) => RawValue::Seq(items.into_iter().map(Into::into).collect()),
            Json::Object(map) => RawValue::Map(
                map.into_iter()
                    .map(|(k, v)| (RawValue::String(k), v.into()))
                    .collect(),
            ),
        }
    }
}

impl From<serde_yaml::Value> for RawValue {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value as Yaml;
        match value {
            Yaml::Null => RawValue::Null,
            Yaml::Bool(b) => RawValue::Bool(b),
            Yaml::Number(n) => number(n.as_i64(), n.as_u64(), n.as_f64()),
            Yaml::String(s) => RawValue::String(s),
            Yaml::Sequence(items) => RawValue::Seq(items.into_iter().map(Into::into).collect()),
            Yaml::Mapping(map) => {
                RawValue::Map(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
            }
            // Custom tags carry no meaning here; keep the tagged node
            Yaml::Tagged(tagged) => tagged.value.into(),
        }
    }
}

impl From<toml::Value> for RawValue {
    fn from(value: toml::Value) -> Self {
        use toml::Value as Toml;
        match value {
            Toml::String(s) => RawValue::String(s),
            Toml::Integer(i) => RawValue::Int(i),
            Toml::Float(x) => RawValue::Float(x),
            Toml::Boolean(b) => RawValue::Bool(b),
            Toml::Datetime(dt) => RawValue::String(dt.to_string()),
            Toml::Array(items) => RawValue::Seq(items.into_iter().map(Into::into).collect()),
            Toml::Table(table) => RawValue::Map(
                table
                    .into_iter()
                    .map(|(k, v)| (RawValue::String(k), v.into()))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        normalize(value.into())
    }
}

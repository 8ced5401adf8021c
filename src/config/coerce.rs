//! Best-effort conversions behind the typed getters.
//!
//! Every function here is total: a shape it cannot convert yields the zero
//! value or an empty container.

use super::duration::parse_duration;
use crate::value::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Parse the boolean spellings `1 t T TRUE true True` and `0 f F FALSE false False`.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

pub fn to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Integers pass through, floats truncate toward zero, strings parse as decimal.
pub fn to_int(value: &Value) -> i64 {
    match value {
        Value::Integer(i) => *i,
        Value::Float(x) => x.trunc() as i64,
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

pub fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => parse_bool(s).unwrap_or(false),
        Value::Integer(i) => *i != 0,
        Value::Float(x) => *x != 0.0,
        _ => false,
    }
}

pub fn to_float(value: &Value) -> f64 {
    match value {
        Value::Float(x) => *x,
        Value::Integer(i) => *i as f64,
        Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Strings parse as duration literals; numbers count nanoseconds.
pub fn to_duration(value: &Value) -> Duration {
    match value {
        Value::String(s) => parse_duration(s).unwrap_or(Duration::ZERO),
        Value::Integer(i) => u64::try_from(*i).map_or(Duration::ZERO, Duration::from_nanos),
        Value::Float(x) if *x > 0.0 => Duration::from_nanos(x.trunc() as u64),
        _ => Duration::ZERO,
    }
}

/// Sequence elements are stringified; a string is split on commas and trimmed.
pub fn to_string_vec(value: &Value) -> Vec<String> {
    match value {
        Value::Seq(items) => items.iter().map(to_string).collect(),
        Value::String(s) if s.is_empty() => Vec::new(),
        Value::String(s) => s.split(',').map(|part| part.trim().to_string()).collect(),
        _ => Vec::new(),
    }
}

/// All-or-nothing: one unconvertible element empties the result.
pub fn to_int_vec(value: &Value) -> Vec<i64> {
    let Value::Seq(items) = value else {
        return Vec::new();
    };
    let converted: Option<Vec<i64>> = items
        .iter()
        .map(|item| match item {
            Value::Integer(i) => Some(*i),
            Value::Float(x) => Some(x.trunc() as i64),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .collect();
    converted.unwrap_or_default()
}

pub fn to_string_map(value: &Value) -> Map {
    match value {
        Value::Map(map) => map.clone(),
        _ => Map::new(),
    }
}

pub fn to_string_map_string(value: &Value) -> BTreeMap<String, String> {
    match value {
        Value::Map(map) => map.iter().map(|(k, v)| (k.clone(), to_string(v))).collect(),
        _ => BTreeMap::new(),
    }
}

pub fn to_string_map_string_vec(value: &Value) -> BTreeMap<String, Vec<String>> {
    match value {
        Value::Map(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), to_string_vec(v)))
            .collect(),
        _ => BTreeMap::new(),
    }
}

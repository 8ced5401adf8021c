//! Deep merge of normalized maps.
//!
//! Nested maps merge key by key; every other kind is replaced wholesale.
//! Sequences are replaced entirely, not concatenated.

use crate::value::{Map, Value};

/// Deep merge `src` into `dst`, with `src` taking precedence.
///
/// - Keys missing from `dst` are adopted from `src`
/// - When both sides hold a map, they merge recursively
/// - Anything else (scalars, sequences, nulls, type mismatches) replaces the `dst` value
///
/// # Example
/// ```
/// use confstack::config::deep_merge;
/// use confstack::Value;
/// use serde_json::json;
///
/// let Value::Map(base) = Value::from(json!({"server": {"port": 8080, "host": "localhost"}})) else { unreachable!() };
/// let Value::Map(overlay) = Value::from(json!({"server": {"port": 9000}})) else { unreachable!() };
/// let merged = deep_merge(base, overlay);
/// assert_eq!(Value::Map(merged), Value::from(json!({"server": {"port": 9000, "host": "localhost"}})));
/// ```
pub fn deep_merge(mut dst: Map, src: Map) -> Map {
    for (key, src_value) in src {
        let merged = match (dst.remove(&key), src_value) {
            (Some(Value::Map(dst_map)), Value::Map(src_map)) => {
                Value::Map(deep_merge(dst_map, src_map))
            }
            (_, src_value) => src_value,
        };
        dst.insert(key, merged);
    }
    dst
}

/// Merge multiple maps in order, with later maps taking precedence.
///
/// Equivalent to folding `deep_merge` over the list.
pub fn deep_merge_all(maps: impl IntoIterator<Item = Map>) -> Map {
    maps.into_iter().fold(Map::new(), deep_merge)
}

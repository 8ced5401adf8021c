//! Dotted-path lookup into normalized maps.

use crate::value::{Map, Value};

/// Resolve `key` against `map`.
///
/// An exact top-level match on the whole key wins, so a key that literally
/// contains dots is found without splitting. Otherwise the key is split on `.`
/// and walked: maps by key, sequences by non-negative index. Any miss, index
/// out of range, or non-container node along the way yields `None`.
pub fn resolve<'a>(map: &'a Map, key: &str) -> Option<&'a Value> {
    if let Some(value) = map.get(key) {
        return Some(value);
    }

    let mut segments = key.split('.');
    let first = segments.next()?;
    let mut current = map.get(first)?;
    for segment in segments {
        current = match current {
            Value::Map(node) => node.get(segment)?,
            Value::Seq(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Collect every leaf path of `map` in dotted form, sorted.
///
/// Sequences count as leaves; an empty nested map is reported under its own key.
pub fn leaf_keys(map: &Map) -> Vec<String> {
    let mut keys = Vec::new();
    collect_leaves(map, None, &mut keys);
    keys
}

fn collect_leaves(map: &Map, prefix: Option<&str>, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.clone(),
        };
        match value {
            Value::Map(nested) if !nested.is_empty() => collect_leaves(nested, Some(&path), out),
            _ => out.push(path),
        }
    }
}

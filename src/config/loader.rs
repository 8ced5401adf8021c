//! Pluggable format decoding.
//!
//! A [`LoaderRegistry`] maps a format identifier (`json`, `yaml`, ...) to a
//! [`Loader`]. Identifiers are case-insensitive and ignore a leading dot, so a
//! file extension can be passed straight through.

use super::normalize::{RawValue, normalize};
use crate::error::{ConfigError, LoadError, Result};
use crate::value::{Map, Value};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Decodes raw bytes of one format into an un-normalized tree.
///
/// Implementations must be safe to call repeatedly; no state may carry over
/// between calls.
pub trait Loader: Send + Sync {
    fn load(&self, data: &[u8]) -> std::result::Result<RawValue, LoadError>;
}

impl<F> Loader for F
where
    F: Fn(&[u8]) -> std::result::Result<RawValue, LoadError> + Send + Sync,
{
    fn load(&self, data: &[u8]) -> std::result::Result<RawValue, LoadError> {
        self(data)
    }
}

/// Lowercase a format identifier and strip one leading dot.
pub fn normalize_format(format: &str) -> String {
    format.strip_prefix('.').unwrap_or(format).to_lowercase()
}

/// Registry of loaders keyed by normalized format identifier.
#[derive(Clone)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn Loader>>,
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

impl LoaderRegistry {
    /// Registry with no loaders at all.
    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// Registry with the built-in JSON, YAML, TOML, INI and XML loaders.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("json", JsonLoader);
        registry.register("yaml", YamlLoader);
        registry.register("yml", YamlLoader);
        registry.register("toml", TomlLoader);
        registry.register("ini", IniLoader);
        registry.register("xml", XmlLoader);
        registry
    }

    /// Register `loader` for `format`, replacing any previous registration.
    ///
    /// Ignored when the normalized format is empty.
    pub fn register(&mut self, format: &str, loader: impl Loader + 'static) {
        self.register_shared(format, Arc::new(loader));
    }

    /// Same as [`register`](Self::register) for an already shared loader.
    pub fn register_shared(&mut self, format: &str, loader: Arc<dyn Loader>) {
        let format = normalize_format(format);
        if format.is_empty() {
            return;
        }
        self.loaders.insert(format, loader);
    }

    pub fn contains(&self, format: &str) -> bool {
        self.loaders.contains_key(&normalize_format(format))
    }

    /// Registered identifiers, sorted.
    pub fn formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = self.loaders.keys().cloned().collect();
        formats.sort();
        formats
    }

    /// Decode `data` with the loader registered for `format` and normalize it.
    ///
    /// An empty document (null root) decodes to an empty map; any other
    /// non-map root is a decode error.
    pub fn decode(&self, data: &[u8], format: &str) -> Result<Map> {
        let format = normalize_format(format);
        let loader = self
            .loaders
            .get(&format)
            .ok_or_else(|| ConfigError::UnsupportedFormat {
                format: format.clone(),
            })?;
        let raw = loader
            .load(data)
            .map_err(|source| ConfigError::decode(&format, source))?;
        match normalize(raw) {
            Value::Map(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(ConfigError::decode(
                &format,
                format!("document root must be a map, found {}", other.kind()),
            )),
        }
    }
}

/// JSON documents via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLoader;

impl Loader for JsonLoader {
    fn load(&self, data: &[u8]) -> std::result::Result<RawValue, LoadError> {
        let value: serde_json::Value = serde_json::from_slice(data)?;
        Ok(value.into())
    }
}

/// YAML documents via `serde_yaml`.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlLoader;

impl Loader for YamlLoader {
    fn load(&self, data: &[u8]) -> std::result::Result<RawValue, LoadError> {
        let value: serde_yaml::Value = serde_yaml::from_slice(data)?;
        Ok(value.into())
    }
}

/// TOML documents via `toml`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlLoader;

impl Loader for TomlLoader {
    fn load(&self, data: &[u8]) -> std::result::Result<RawValue, LoadError> {
        let text = std::str::from_utf8(data)?;
        let table: toml::Table = toml::from_str(text)?;
        Ok(toml::Value::Table(table).into())
    }
}

/// INI documents via `rust-ini`.
///
/// Keys outside any section land at the top level; each named section becomes
/// a nested map.
#[derive(Debug, Clone, Copy, Default)]
pub struct IniLoader;

impl Loader for IniLoader {
    fn load(&self, data: &[u8]) -> std::result::Result<RawValue, LoadError> {
        let text = std::str::from_utf8(data)?;
        let ini = ini::Ini::load_from_str(text)?;

        let mut entries: Vec<(RawValue, RawValue)> = Vec::new();
        for (section, properties) in ini.iter() {
            let pairs = properties
                .iter()
                .map(|(k, v)| (RawValue::from(k), RawValue::from(v)));
            match section {
                None => entries.extend(pairs),
                Some(name) => entries.push((RawValue::from(name), RawValue::Map(pairs.collect()))),
            }
        }
        Ok(RawValue::Map(entries))
    }
}

/// XML documents via `quick-xml`.
///
/// The document element's children form the top-level map. Text-only elements
/// become strings, repeated siblings become sequences, attributes are stored
/// under `@name` and mixed text under `#text`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlLoader;

impl Loader for XmlLoader {
    fn load(&self, data: &[u8]) -> std::result::Result<RawValue, LoadError> {
        let mut reader = Reader::from_reader(data);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<RawValue> = None;
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(start) => stack.push(XmlElement::open(&start)?),
                Event::Empty(start) => {
                    let element = XmlElement::open(&start)?;
                    close_element(element, &mut stack, &mut root);
                }
                Event::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(cdata) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&cdata.into_inner()));
                    }
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or("unexpected closing tag")?;
                    close_element(element, &mut stack, &mut root);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(format!("unclosed element <{}>", open.name).into());
        }
        Ok(root.unwrap_or(RawValue::Null))
    }
}

struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<(String, RawValue)>,
}

impl XmlElement {
    fn open(start: &BytesStart<'_>) -> std::result::Result<Self, LoadError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((format!("@{}", key), value));
        }
        Ok(Self {
            name,
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    fn into_map(self) -> RawValue {
        let mut entries: Vec<(RawValue, RawValue)> = self
            .attributes
            .into_iter()
            .map(|(k, v)| (RawValue::String(k), RawValue::String(v)))
            .collect();
        entries.extend(
            group_siblings(self.children)
                .into_iter()
                .map(|(k, v)| (RawValue::String(k), v)),
        );
        if !self.text.is_empty() {
            entries.push((RawValue::from("#text"), RawValue::String(self.text)));
        }
        RawValue::Map(entries)
    }

    fn into_value(self) -> RawValue {
        if self.children.is_empty() && self.attributes.is_empty() {
            RawValue::String(self.text)
        } else {
            self.into_map()
        }
    }
}

fn close_element(element: XmlElement, stack: &mut [XmlElement], root: &mut Option<RawValue>) {
    match stack.last_mut() {
        Some(parent) => {
            let name = element.name.clone();
            parent.children.push((name, element.into_value()));
        }
        None => *root = Some(element.into_map()),
    }
}

/// Element values are never sequences, so a sequence here marks a repeated name.
fn group_siblings(children: Vec<(String, RawValue)>) -> Vec<(String, RawValue)> {
    let mut grouped: Vec<(String, RawValue)> = Vec::new();
    for (name, value) in children {
        match grouped.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, RawValue::Seq(items))) => items.push(value),
            Some((_, slot)) => {
                let first = std::mem::replace(slot, RawValue::Null);
                *slot = RawValue::Seq(vec![first, value]);
            }
            None => grouped.push((name, value)),
        }
    }
    grouped
}

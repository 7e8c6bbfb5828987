// src/record.rs

use serde::de::{Deserializer, Error as _};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field values of one section, keyed by canonical field key.
pub type Section = BTreeMap<String, Value>;

/// A partially filled LC form: section name -> field key -> value.
///
/// Top-level scalar fields (such as `transaction_role`) are stored as a section
/// holding a single field of the same name, and serialize back to the top level.
/// `Value::Null` and an absent key both mean "not known yet".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LcRecord {
    sections: BTreeMap<String, Section>,
}

impl LcRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value at (section, key), with null folded into `None`.
    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .filter(|v| !v.is_null())
    }

    /// Non-empty trimmed text at (section, key).
    pub fn text(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn number(&self, section: &str, key: &str) -> Option<f64> {
        self.get(section, key).and_then(Value::as_f64)
    }

    pub fn contains(&self, section: &str, key: &str) -> bool {
        self.sections
            .get(section)
            .is_some_and(|s| s.contains_key(key))
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&String, &Section)> {
        self.sections.iter()
    }

    /// Builder-style insert, used when assembling records by hand.
    pub fn with(mut self, section: &str, key: &str, value: impl Into<Value>) -> Self {
        self.set(section, key, value.into());
        self
    }

    /// Records are only mutated while they are being built; merges create new ones.
    pub(crate) fn set(&mut self, section: &str, key: &str, value: Value) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub(crate) fn ensure_section(&mut self, section: &str) {
        self.sections.entry(section.to_string()).or_default();
    }

    pub(crate) fn from_sections(sections: BTreeMap<String, Section>) -> Self {
        Self { sections }
    }

    /// Count of (section, key) pairs present, null or not.
    pub fn len(&self) -> usize {
        self.sections.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Split a raw JSON object into sections without consulting any schema.
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        let mut record = Self::new();
        for (name, value) in object {
            match value {
                Value::Object(fields) => {
                    record.ensure_section(name);
                    for (key, v) in fields {
                        record.set(name, key, v.clone());
                    }
                }
                other => record.set(name, name, other.clone()),
            }
        }
        record
    }

    fn is_flat(name: &str, section: &Section) -> bool {
        section.len() == 1
            && section
                .get(name)
                .is_some_and(|v| !v.is_object())
    }
}

impl Serialize for LcRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for (name, section) in &self.sections {
            if Self::is_flat(name, section) {
                map.serialize_entry(name, &section[name])?;
            } else {
                map.serialize_entry(name, section)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LcRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(object) => Ok(Self::from_json_object(&object)),
            other => Err(D::Error::custom(format!(
                "LC record must be a JSON object, got {other}"
            ))),
        }
    }
}

// src/merge.rs

use crate::record::{LcRecord, Section};
use crate::schema::SchemaRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Fill-only merge of two partial records.
///
/// For every (section, key) in either input the result holds `base`'s value when
/// it is non-null, otherwise `incoming`'s value, otherwise null. A non-null base
/// value is never replaced. Neither input is modified.
pub fn merge(base: &LcRecord, incoming: &LcRecord) -> LcRecord {
    let mut sections: BTreeMap<String, Section> = BTreeMap::new();

    for (name, fields) in base.sections() {
        sections.insert(name.clone(), fields.clone());
    }

    for (name, fields) in incoming.sections() {
        let merged = sections.entry(name.clone()).or_default();
        for (key, value) in fields {
            match merged.get(key) {
                Some(existing) if !existing.is_null() => {}
                Some(_) if value.is_null() => {}
                _ => {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
    }

    LcRecord::from_sections(sections)
}

/// One schema field that still has no value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingField {
    pub section: String,
    pub key: String,
    pub options: Vec<String>,
}

/// Fields with no value after merge, in schema declaration order.
pub fn missing_fields(registry: &SchemaRegistry, record: &LcRecord) -> Vec<MissingField> {
    registry
        .fields()
        .filter(|f| record.get(f.section_name(), f.key()).is_none())
        .map(|f| MissingField {
            section: f.section_name().to_string(),
            key: f.key().to_string(),
            options: f.field.options.clone(),
        })
        .collect()
}

/// Missing fields grouped by section, sections in declaration order.
pub fn missing_by_section(missing: &[MissingField]) -> Vec<(String, Vec<&MissingField>)> {
    let mut grouped: Vec<(String, Vec<&MissingField>)> = Vec::new();
    for field in missing {
        match grouped.last_mut() {
            Some((section, fields)) if *section == field.section => fields.push(field),
            _ => grouped.push((field.section.clone(), vec![field])),
        }
    }
    grouped
}

/// How many schema fields hold a value (filled, total).
pub fn coverage(registry: &SchemaRegistry, record: &LcRecord) -> (usize, usize) {
    let total = registry.fields().count();
    let filled = registry
        .fields()
        .filter(|f| record.get(f.section_name(), f.key()).is_some_and(has_content))
        .count();
    (filled, total)
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_coverage((filled, total): (usize, usize)) -> Self {
        if total == 0 {
            return Confidence::Low;
        }
        let ratio = filled as f64 / total as f64;
        if ratio >= 0.7 {
            Confidence::High
        } else if ratio >= 0.4 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

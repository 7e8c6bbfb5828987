// src/schema/mod.rs

mod lc_form;

pub use lc_form::lc_form_sections;

use serde::Serialize;
use serde_json::{Number, Value};
use std::collections::HashMap;
use thiserror::Error;
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// Primitive type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Number,
    Date,
    Boolean,
    Array,
}

/// Field-level rewrite applied before normal validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SpecialMapping {
    /// Any non-null input is replaced by `sentinel`; the original value is dropped.
    CollapseToSentinel { sentinel: String, description: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaField {
    pub canonical_key: String,
    /// Short name the extraction prompt asks the model to emit.
    pub wire_name: String,
    pub data_type: DataType,
    pub options: Vec<String>,
    pub aliases: Vec<String>,
    pub special_mapping: Option<SpecialMapping>,
    pub max_length: Option<usize>,
    pub note: Option<String>,
}

impl SchemaField {
    pub fn new(canonical_key: &str, wire_name: &str, data_type: DataType) -> Self {
        Self {
            canonical_key: canonical_key.to_string(),
            wire_name: wire_name.to_string(),
            data_type,
            options: Vec::new(),
            aliases: Vec::new(),
            special_mapping: None,
            max_length: None,
            note: None,
        }
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn collapse_to(mut self, sentinel: &str, description: &str) -> Self {
        self.special_mapping = Some(SpecialMapping::CollapseToSentinel {
            sentinel: sentinel.to_string(),
            description: description.to_string(),
        });
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    pub fn is_enum(&self) -> bool {
        !self.options.is_empty()
    }
}

/// A named group of fields. A `flat` section holds exactly one field whose key
/// equals the section name and is stored at the top level of a record.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSection {
    pub name: String,
    pub flat: bool,
    pub fields: Vec<SchemaField>,
}

impl SchemaSection {
    pub fn nested(name: &str, fields: Vec<SchemaField>) -> Self {
        Self {
            name: name.to_string(),
            flat: false,
            fields,
        }
    }

    pub fn flat(field: SchemaField) -> Self {
        Self {
            name: field.canonical_key.clone(),
            flat: true,
            fields: vec![field],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaError {
    #[error("label '{label}' matches no schema field or alias")]
    UnknownLabel { label: String },

    #[error("'{key}' is not a field of the schema")]
    UndefinedField { key: String },

    #[error("value {value} for '{key}' not in option set {options:?}")]
    NotInOptions {
        key: String,
        value: String,
        options: Vec<String>,
    },

    #[error("value {value} for '{key}' is not a valid {expected:?}")]
    TypeMismatch {
        key: String,
        value: String,
        expected: DataType,
    },

    #[error("value for '{key}' is {len} characters, max {max}")]
    ExceedsMaxLength { key: String, len: usize, max: usize },

    #[error("canonical key '{key}' declared twice")]
    DuplicateKey { key: String },

    #[error("section '{section}' declared twice")]
    DuplicateSection { section: String },

    #[error("flat section '{section}' must hold exactly one field named after it")]
    MalformedFlatSection { section: String },
}

/// Location of a field inside the registry: (section index, field index).
type Slot = (usize, usize);

/// A successfully resolved label.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedField<'a> {
    pub section: &'a SchemaSection,
    pub field: &'a SchemaField,
}

impl ResolvedField<'_> {
    pub fn section_name(&self) -> &str {
        &self.section.name
    }

    pub fn key(&self) -> &str {
        &self.field.canonical_key
    }
}

/// Immutable table of sections and fields plus the reverse lookup indexes
/// built once at construction.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    sections: Vec<SchemaSection>,
    section_index: HashMap<String, usize>,
    by_key: HashMap<String, Slot>,
    by_wire: HashMap<String, Vec<Slot>>,
    by_alias: HashMap<String, Vec<Slot>>,
}

/// Lowercase, trim, treat `_` as a space and collapse whitespace runs.
pub fn normalize_label(raw: &str) -> String {
    raw.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl SchemaRegistry {
    pub fn new(sections: Vec<SchemaSection>) -> Result<Self, SchemaError> {
        let mut section_index = HashMap::new();
        let mut by_key = HashMap::new();
        let mut by_wire: HashMap<String, Vec<Slot>> = HashMap::new();
        let mut by_alias: HashMap<String, Vec<Slot>> = HashMap::new();

        for (si, section) in sections.iter().enumerate() {
            if section.flat
                && (section.fields.len() != 1 || section.fields[0].canonical_key != section.name)
            {
                return Err(SchemaError::MalformedFlatSection {
                    section: section.name.clone(),
                });
            }
            if section_index
                .insert(normalize_label(&section.name), si)
                .is_some()
            {
                return Err(SchemaError::DuplicateSection {
                    section: section.name.clone(),
                });
            }

            for (fi, field) in section.fields.iter().enumerate() {
                if by_key
                    .insert(normalize_label(&field.canonical_key), (si, fi))
                    .is_some()
                {
                    return Err(SchemaError::DuplicateKey {
                        key: field.canonical_key.clone(),
                    });
                }
                by_wire
                    .entry(normalize_label(&field.wire_name))
                    .or_default()
                    .push((si, fi));
                for alias in &field.aliases {
                    let slots = by_alias.entry(normalize_label(alias)).or_default();
                    if !slots.contains(&(si, fi)) {
                        slots.push((si, fi));
                    }
                }
            }
        }

        Ok(Self {
            sections,
            section_index,
            by_key,
            by_wire,
            by_alias,
        })
    }

    /// The built-in Letter-of-Credit form.
    pub fn lc_form() -> Result<Self, SchemaError> {
        Self::new(lc_form_sections())
    }

    pub fn sections(&self) -> &[SchemaSection] {
        &self.sections
    }

    pub fn fields(&self) -> impl Iterator<Item = ResolvedField<'_>> {
        self.sections.iter().flat_map(|section| {
            section
                .fields
                .iter()
                .map(move |field| ResolvedField { section, field })
        })
    }

    pub fn section(&self, name: &str) -> Option<&SchemaSection> {
        self.section_index
            .get(&normalize_label(name))
            .map(|&i| &self.sections[i])
    }

    pub fn field(&self, canonical_key: &str) -> Option<ResolvedField<'_>> {
        self.by_key
            .get(&normalize_label(canonical_key))
            .map(|&slot| self.slot(slot))
    }

    /// Replace the special mapping of one field. Only the named field changes.
    pub fn set_special_mapping(
        &mut self,
        canonical_key: &str,
        mapping: Option<SpecialMapping>,
    ) -> Result<(), SchemaError> {
        let (si, fi) = *self
            .by_key
            .get(&normalize_label(canonical_key))
            .ok_or_else(|| SchemaError::UndefinedField {
                key: canonical_key.to_string(),
            })?;
        self.sections[si].fields[fi].special_mapping = mapping;
        Ok(())
    }

    fn slot(&self, (si, fi): Slot) -> ResolvedField<'_> {
        let section = &self.sections[si];
        ResolvedField {
            section,
            field: &section.fields[fi],
        }
    }

    /// Resolve a raw label without a section hint.
    pub fn resolve(&self, raw_label: &str) -> Result<ResolvedField<'_>, SchemaError> {
        self.resolve_field(None, raw_label)
    }

    /// Resolve a raw label to a schema field.
    ///
    /// Match order is canonical key, wire name, then aliases. When a hint names a
    /// known section, candidates inside it win; otherwise the first candidate in
    /// declaration order wins.
    pub fn resolve_field(
        &self,
        section_hint: Option<&str>,
        raw_label: &str,
    ) -> Result<ResolvedField<'_>, SchemaError> {
        let label = normalize_label(raw_label);
        let hinted = section_hint
            .and_then(|h| self.section_index.get(&normalize_label(h)).copied());

        let key_hit = self.by_key.get(&label).copied();
        let wire_hits = self.by_wire.get(&label).map(Vec::as_slice).unwrap_or(&[]);
        let alias_hits = self.by_alias.get(&label).map(Vec::as_slice).unwrap_or(&[]);

        let candidates = key_hit
            .iter()
            .chain(wire_hits.iter())
            .chain(alias_hits.iter())
            .copied();

        let chosen = match hinted {
            Some(si) => candidates
                .clone()
                .find(|&(s, _)| s == si)
                .or_else(|| candidates.clone().next()),
            None => candidates.clone().next(),
        };

        chosen
            .map(|slot| self.slot(slot))
            .ok_or_else(|| SchemaError::UnknownLabel {
                label: raw_label.to_string(),
            })
    }

    /// Validate (and coerce) a value for a field identified by canonical key.
    ///
    /// Returns the value to store. Null is always accepted. A collapse-to-sentinel
    /// rule replaces any non-null value before any other check.
    pub fn validate_value(&self, canonical_key: &str, value: &Value) -> Result<Value, SchemaError> {
        let resolved = self
            .field(canonical_key)
            .ok_or_else(|| SchemaError::UndefinedField {
                key: canonical_key.to_string(),
            })?;
        validate_field(resolved.field, value)
    }
}

pub fn validate_field(field: &SchemaField, value: &Value) -> Result<Value, SchemaError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    if let Some(SpecialMapping::CollapseToSentinel { sentinel, .. }) = &field.special_mapping {
        return Ok(Value::String(sentinel.clone()));
    }

    let mismatch = || SchemaError::TypeMismatch {
        key: field.canonical_key.clone(),
        value: value.to_string(),
        expected: field.data_type,
    };

    let coerced = match field.data_type {
        DataType::String => match value {
            Value::String(s) => Value::String(s.trim().to_string()),
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            _ => return Err(mismatch()),
        },
        DataType::Number => match value {
            Value::Number(_) => value.clone(),
            Value::String(s) => parse_number(s).ok_or_else(mismatch)?,
            _ => return Err(mismatch()),
        },
        DataType::Boolean => match value {
            Value::Bool(_) => value.clone(),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "y" => Value::Bool(true),
                "false" | "no" | "n" => Value::Bool(false),
                _ => return Err(mismatch()),
            },
            _ => return Err(mismatch()),
        },
        DataType::Date => match value {
            Value::String(s) => parse_date(s)
                .map(|d| Value::String(format_date(d)))
                .ok_or_else(mismatch)?,
            _ => return Err(mismatch()),
        },
        DataType::Array => match value {
            Value::Array(_) => value.clone(),
            other => Value::Array(vec![other.clone()]),
        },
    };

    if field.is_enum() {
        let Value::String(s) = &coerced else {
            return Err(mismatch());
        };
        if !field.options.iter().any(|o| o == s) {
            return Err(SchemaError::NotInOptions {
                key: field.canonical_key.clone(),
                value: s.clone(),
                options: field.options.clone(),
            });
        }
    }

    if let (Some(max), Value::String(s)) = (field.max_length, &coerced) {
        let len = s.chars().count();
        if len > max {
            return Err(SchemaError::ExceedsMaxLength {
                key: field.canonical_key.clone(),
                len,
                max,
            });
        }
    }

    Ok(coerced)
}

/// Parse amounts like "USD 1,250,000.50" or "$1000".
fn parse_number(raw: &str) -> Option<Value> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("US$")
        .trim_start_matches("USD")
        .trim_start_matches('$')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(i) = cleaned.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    let f = cleaned.parse::<f64>().ok()?;
    Number::from_f64(f).map(Value::Number)
}

const DATE_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day]"),
    format_description!("[day]/[month]/[year]"),
    format_description!("[day]-[month]-[year]"),
    format_description!(
        "[month repr:long case_sensitive:false] [day padding:none], [year]"
    ),
    format_description!("[day padding:none] [month repr:long case_sensitive:false] [year]"),
];

pub fn parse_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| Date::parse(raw, *format).ok())
}

pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

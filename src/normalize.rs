// src/normalize.rs

use crate::record::LcRecord;
use crate::schema::{self, SchemaError, SchemaRegistry, format_date, parse_date};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use time::Duration;
use tracing::debug;

/// A raw label that matched no schema field. Kept so callers can decide
/// whether to carry it along or drop it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmappedField {
    pub section: Option<String>,
    pub label: String,
    pub value: Value,
}

/// A value that failed validation and what was done about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldIssue {
    pub section: String,
    pub key: String,
    pub error: SchemaError,
    pub action: IssueAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueAction {
    /// The offending value was replaced by null.
    Nulled,
    /// The value was cut down to the field's maximum length.
    Truncated,
    /// The value was derived from another field.
    Derived,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Normalized {
    pub record: LcRecord,
    pub unmapped: Vec<UnmappedField>,
    pub issues: Vec<FieldIssue>,
}

static VALIDITY_DAYS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:valid(?:ity)?\s*(?:for|of)?\s*)?(\d{1,4})\s*days?\s*$")
        .expect("validity regex")
});

impl SchemaRegistry {
    /// Map a raw extracted object onto canonical sections and fields.
    ///
    /// Nothing here aborts the record: unknown labels go to `unmapped`, values
    /// outside an option set are nulled, over-long text is truncated. Every schema
    /// field missing from the input is present as null in the output.
    pub fn normalize(&self, raw: &Map<String, Value>) -> Normalized {
        let mut out = Normalized::default();
        let mut validity_days: Option<i64> = None;

        for (top_label, top_value) in raw {
            match top_value {
                Value::Object(fields) if self.section(top_label).is_some_and(|s| !s.flat) => {
                    for (label, value) in fields {
                        self.place(Some(top_label), label, value, &mut out, &mut validity_days);
                    }
                }
                Value::Object(fields) => {
                    // Unknown grouping: resolve every inner label globally.
                    for (label, value) in fields {
                        self.place(None, label, value, &mut out, &mut validity_days);
                    }
                }
                value => self.place(None, top_label, value, &mut out, &mut validity_days),
            }
        }

        if let Some(days) = validity_days {
            self.derive_bid_deadline(days, &mut out);
        }

        for resolved in self.fields() {
            if !out.record.contains(resolved.section_name(), resolved.key()) {
                out.record
                    .set(resolved.section_name(), resolved.key(), Value::Null);
            }
        }

        out
    }

    fn place(
        &self,
        section_hint: Option<&str>,
        label: &str,
        value: &Value,
        out: &mut Normalized,
        validity_days: &mut Option<i64>,
    ) {
        let resolved = match self.resolve_field(section_hint, label) {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!(section = ?section_hint, label, error = %e, "Unmapped field");
                out.unmapped.push(UnmappedField {
                    section: section_hint.map(str::to_string),
                    label: label.to_string(),
                    value: value.clone(),
                });
                return;
            }
        };
        let section = resolved.section_name().to_string();
        let key = resolved.key().to_string();

        // Two labels resolving to one field: the first non-null value in label order
        // stays. Raw maps iterate their keys alphabetically.
        if out.record.get(&section, &key).is_some() {
            return;
        }

        if key == "last_date_for_bids" {
            if let Some(days) = value
                .as_str()
                .and_then(|s| VALIDITY_DAYS.captures(s))
                .and_then(|c| c[1].parse::<i64>().ok())
            {
                *validity_days = Some(days);
                out.record.set(&section, &key, Value::Null);
                return;
            }
        }

        let stored = match schema::validate_field(resolved.field, value) {
            Ok(v) => v,
            Err(SchemaError::ExceedsMaxLength { len, max, .. }) => {
                let text = match value {
                    Value::String(s) => s.trim().to_string(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => String::new(),
                };
                let cut: String = text.chars().take(max).collect();
                let cut = cut.trim_end().to_string();
                out.issues.push(FieldIssue {
                    section: section.clone(),
                    key: key.clone(),
                    error: SchemaError::ExceedsMaxLength {
                        key: key.clone(),
                        len,
                        max,
                    },
                    action: IssueAction::Truncated,
                });
                Value::String(cut)
            }
            Err(e) => {
                debug!(%section, %key, error = %e, "Invalid value nulled");
                out.issues.push(FieldIssue {
                    section: section.clone(),
                    key: key.clone(),
                    error: e,
                    action: IssueAction::Nulled,
                });
                Value::Null
            }
        };

        out.record.set(&section, &key, stored);
    }

    /// `last_date_for_bids = lc_issuing_date + days`, when the issue date is known.
    fn derive_bid_deadline(&self, days: i64, out: &mut Normalized) {
        if out.record.get("bidding_deadline", "last_date_for_bids").is_some() {
            return;
        }
        let Some(issued) = out
            .record
            .text("lc_details", "lc_issuing_date")
            .and_then(parse_date)
        else {
            debug!(days, "Validity in days without an issue date; deadline left empty");
            return;
        };
        let Some(deadline) = issued.checked_add(Duration::days(days)) else {
            return;
        };
        out.record.set(
            "bidding_deadline",
            "last_date_for_bids",
            Value::String(format_date(deadline)),
        );
        out.issues.push(FieldIssue {
            section: "bidding_deadline".to_string(),
            key: "last_date_for_bids".to_string(),
            error: SchemaError::TypeMismatch {
                key: "last_date_for_bids".to_string(),
                value: format!("\"{days} days\""),
                expected: schema::DataType::Date,
            },
            action: IssueAction::Derived,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, SchemaField, SchemaSection};
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::lc_form().unwrap()
    }

    fn object(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_aliases_and_wire_names_land_on_canonical_keys() {
        let reg = registry();
        let n = reg.normalize(&object(json!({
            "role_in_transaction": "Importer (Applicant)",
            "amount_and_payment": {"amount": "USD 250,000", "payment_terms": "Sight LC"},
            "shipment_details": {"loading_port": "Karachi", "POD": "Jebel Ali"},
            "importer_info": {"buyer": "Tech Imports Ltd"}
        })));

        let r = &n.record;
        assert_eq!(r.text("transaction_role", "transaction_role"), Some("Importer (Applicant)"));
        assert_eq!(r.number("amount_and_payment", "amount_usd"), Some(250000.0));
        assert_eq!(r.text("shipment_details", "port_of_loading"), Some("Karachi"));
        assert_eq!(r.text("shipment_details", "port_of_destination"), Some("Jebel Ali"));
        assert_eq!(r.text("importer_info", "applicant_name"), Some("Tech Imports Ltd"));
        assert!(n.unmapped.is_empty());
        assert!(n.issues.is_empty());
    }

    #[test]
    fn test_unknown_labels_are_kept_as_unmapped() {
        let reg = registry();
        let n = reg.normalize(&object(json!({
            "shipment_details": {"vessel_name": "MSC Aurora"},
            "hs_code_analysis": {"hs_code": "847130"}
        })));
        assert_eq!(n.unmapped.len(), 2);
        assert_eq!(n.unmapped[0].label, "hs_code");
        assert_eq!(n.unmapped[0].section, None);
        assert_eq!(n.unmapped[1].label, "vessel_name");
        assert_eq!(n.unmapped[1].section.as_deref(), Some("shipment_details"));
    }

    #[test]
    fn test_bad_enum_value_is_nulled() {
        let reg = registry();
        let n = reg.normalize(&object(json!({
            "shipment_details": {"shipment_type": "Sea Port"}
        })));
        assert!(n.record.contains("shipment_details", "shipment_type"));
        assert!(n.record.get("shipment_details", "shipment_type").is_none());
        assert_eq!(n.issues.len(), 1);
        assert_eq!(n.issues[0].action, IssueAction::Nulled);
        assert!(matches!(n.issues[0].error, SchemaError::NotInOptions { .. }));
    }

    #[test]
    fn test_bank_names_collapse_to_all_banks() {
        let reg = registry();
        let n = reg.normalize(&object(json!({
            "lc_details": {"expected_banks": "First Abu Dhabi Bank, Mashreq Bank"}
        })));
        assert_eq!(
            n.record.text("lc_details", "expected_issuing_banks"),
            Some("All_Banks")
        );
        assert!(n.issues.is_empty());
    }

    #[test]
    fn test_long_product_description_truncated() {
        let reg = registry();
        let long = "Industrial centrifugal pumps with stainless steel impellers and seals";
        let n = reg.normalize(&object(json!({"shipment_details": {"product": long}})));
        let stored = n.record.text("shipment_details", "product_description").unwrap();
        assert_eq!(stored, "Industrial centrifugal pumps with stainless steel");
        assert!(stored.chars().count() <= 50);
        assert_eq!(n.issues[0].action, IssueAction::Truncated);
    }

    #[test]
    fn test_every_schema_field_present() {
        let reg = registry();
        let n = reg.normalize(&Map::new());
        assert_eq!(n.record.len(), reg.fields().count());
        assert!(n.record.contains("bidding_deadline", "last_date_for_bids"));
    }

    #[test]
    fn test_bid_deadline_from_validity_days() {
        let reg = registry();
        let n = reg.normalize(&object(json!({
            "lc_details": {"issue_date": "2025-01-01"},
            "bidding_deadline": {"validity": "60 days"}
        })));
        assert_eq!(
            n.record.text("bidding_deadline", "last_date_for_bids"),
            Some("2025-03-02")
        );
        assert_eq!(n.issues[0].action, IssueAction::Derived);
    }

    #[test]
    fn test_validity_without_issue_date_stays_null() {
        let reg = registry();
        let n = reg.normalize(&object(json!({
            "bidding_deadline": {"bid_deadline": "90 days"}
        })));
        assert!(n.record.get("bidding_deadline", "last_date_for_bids").is_none());
        assert!(n.issues.is_empty());
    }

    #[test]
    fn test_first_non_null_label_in_key_order_wins() {
        let reg = registry();
        let n = reg.normalize(&object(json!({
            "importer_info": {"buyer": "Beta Ltd", "applicant": "Alpha Ltd"}
        })));
        assert_eq!(n.record.text("importer_info", "applicant_name"), Some("Alpha Ltd"));

        let n = reg.normalize(&object(json!({
            "importer_info": {"applicant": null, "buyer": "Beta Ltd"}
        })));
        assert_eq!(n.record.text("importer_info", "applicant_name"), Some("Beta Ltd"));
    }

    #[test]
    fn test_numeric_value_over_max_length_truncated_as_text() {
        let reg = SchemaRegistry::new(vec![SchemaSection::nested(
            "goods",
            vec![SchemaField::new("code", "code", DataType::String).max_length(3)],
        )])
        .unwrap();
        let n = reg.normalize(&object(json!({"goods": {"code": 12345}})));
        assert_eq!(n.record.text("goods", "code"), Some("123"));
        assert_eq!(n.issues.len(), 1);
        assert_eq!(n.issues[0].action, IssueAction::Truncated);
    }
}

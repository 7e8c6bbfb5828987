// src/compliance.rs

use crate::record::LcRecord;
use crate::reference::ReferenceData;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

pub use crate::reference::RiskLevel;

const DUAL_USE_NOTE: &str = "Dual-Use Product Alert: product description contains keywords \
suggesting potential dual-use (civilian + military) applications. Export licenses may be \
required. Verify Commerce Control List (CCL) classification.";

const NO_MATCH_REASON: &str = "No sanctions detected. Transaction appears compliant.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    CannotProceed,
    ManualReview,
    ProceedWithCaution,
    Proceed,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::CannotProceed => "Transaction CANNOT proceed. Contact compliance team.",
            Recommendation::ManualReview => "Manual compliance review required before proceeding.",
            Recommendation::ProceedWithCaution => {
                "Proceed with caution. Verify export control requirements."
            }
            Recommendation::Proceed => {
                "Transaction can proceed. Standard due diligence recommended."
            }
        };
        f.write_str(s)
    }
}

/// The record values the check looked at.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComplianceSubject {
    pub beneficiary_country: Option<String>,
    pub issuing_bank_country: Option<String>,
    pub port_of_loading: Option<String>,
    pub port_of_destination: Option<String>,
    pub product_description: Option<String>,
    /// Carried for reference; not used by any rule.
    pub amount_usd: Option<f64>,
}

impl ComplianceSubject {
    pub fn from_record(record: &LcRecord) -> Self {
        let text = |section: &str, key: &str| record.text(section, key).map(str::to_string);
        Self {
            beneficiary_country: text("exporter_info", "beneficiary_country"),
            issuing_bank_country: text("lc_details", "issuing_bank_country"),
            port_of_loading: text("shipment_details", "port_of_loading"),
            port_of_destination: text("shipment_details", "port_of_destination"),
            product_description: text("shipment_details", "product_description"),
            amount_usd: record.number("amount_and_payment", "amount_usd"),
        }
    }
}

/// Outcome of one compliance check.
///
/// `blocked` implies `!compliant` and `risk_level == Critical`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceVerdict {
    pub compliant: bool,
    pub risk_level: RiskLevel,
    pub blocked: bool,
    pub reasons: Vec<String>,
    pub details: Vec<String>,
    pub sources: BTreeSet<String>,
    pub recommendation: Recommendation,
    pub recommendation_text: String,
    pub subject: ComplianceSubject,
}

impl ComplianceVerdict {
    /// All reasons joined the way the summary line shows them.
    pub fn reason_summary(&self) -> String {
        if self.reasons.is_empty() {
            NO_MATCH_REASON.to_string()
        } else {
            self.reasons.join("; ")
        }
    }
}

/// Accumulates triggered rules. Risk only moves up; `blocked` only turns on.
struct VerdictBuilder {
    compliant: bool,
    risk_level: RiskLevel,
    blocked: bool,
    reasons: Vec<String>,
    details: Vec<String>,
    sources: BTreeSet<String>,
}

impl VerdictBuilder {
    fn new() -> Self {
        Self {
            compliant: true,
            risk_level: RiskLevel::Low,
            blocked: false,
            reasons: Vec::new(),
            details: Vec::new(),
            sources: BTreeSet::new(),
        }
    }

    fn escalate(&mut self, candidate: RiskLevel) {
        self.risk_level = self.risk_level.max(candidate);
    }

    fn block(&mut self) {
        self.blocked = true;
        self.compliant = false;
        self.escalate(RiskLevel::Critical);
    }

    fn finish(self, subject: ComplianceSubject) -> ComplianceVerdict {
        let recommendation = if self.blocked {
            Recommendation::CannotProceed
        } else if self.risk_level == RiskLevel::High {
            Recommendation::ManualReview
        } else if !self.reasons.is_empty() {
            Recommendation::ProceedWithCaution
        } else {
            Recommendation::Proceed
        };

        let mut details = self.details;
        if self.reasons.is_empty() {
            details.push(format!(
                "Checked against offline sanctions database. No matches found for {}.",
                subject
                    .beneficiary_country
                    .as_deref()
                    .unwrap_or("specified country")
            ));
        }

        ComplianceVerdict {
            compliant: self.compliant,
            risk_level: self.risk_level,
            blocked: self.blocked,
            reasons: self.reasons,
            details,
            sources: self.sources,
            recommendation,
            recommendation_text: recommendation.to_string(),
            subject,
        }
    }
}

/// Deterministic sanctions / dual-use classification over an LC record.
///
/// Holds only immutable reference data, so one evaluator can serve concurrent
/// callers without locking.
#[derive(Debug, Clone)]
pub struct ComplianceEvaluator {
    reference: ReferenceData,
}

impl ComplianceEvaluator {
    pub fn new(reference: ReferenceData) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    /// Every rule is applied; none short-circuits the others.
    pub fn evaluate(&self, record: &LcRecord) -> ComplianceVerdict {
        self.evaluate_subject(ComplianceSubject::from_record(record))
    }

    pub fn evaluate_subject(&self, subject: ComplianceSubject) -> ComplianceVerdict {
        let mut v = VerdictBuilder::new();

        if let Some(entry) = subject
            .beneficiary_country
            .as_deref()
            .and_then(|c| self.reference.country(c))
        {
            debug!(
                country = %entry.canonical_name,
                level = %entry.risk_level,
                "Beneficiary country sanctioned"
            );
            v.compliant = false;
            v.escalate(entry.risk_level);
            if entry.blocked {
                v.block();
            }
            v.sources.extend(entry.sources.iter().cloned());
            v.reasons.push(format!(
                "Beneficiary country ({}) is under {}",
                entry.canonical_name, entry.status
            ));
            v.details
                .push(format!("{} Sanctions: {}", entry.canonical_name, entry.details));
        }

        if let Some(entry) = subject
            .issuing_bank_country
            .as_deref()
            .and_then(|c| self.reference.country(c))
        {
            debug!(
                country = %entry.canonical_name,
                level = %entry.risk_level,
                "Issuing bank country sanctioned"
            );
            v.compliant = false;
            v.escalate(entry.risk_level);
            v.sources.extend(entry.sources.iter().cloned());
            v.reasons.push(format!(
                "Issuing bank country ({}) is under {}",
                entry.canonical_name, entry.status
            ));
        }

        if let Some((port, entry)) = subject
            .port_of_destination
            .as_deref()
            .and_then(|p| self.reference.port(p).map(|e| (p, e)))
        {
            debug!(port, level = %entry.risk_level.level(), "Destination port flagged");
            v.compliant = false;
            if entry.risk_level.level() == RiskLevel::Critical {
                v.block();
            }
            v.reasons.push(format!(
                "Port of destination ({port}) is in high-risk area: {}",
                entry.reason
            ));
        }

        // Loading-port risk is capped at HIGH and never blocks.
        if let Some((port, entry)) = subject
            .port_of_loading
            .as_deref()
            .and_then(|p| self.reference.port(p).map(|e| (p, e)))
        {
            debug!(port, "Loading port flagged");
            v.escalate(RiskLevel::High);
            v.reasons.push(format!(
                "Port of loading ({port}) is in high-risk area: {}",
                entry.reason
            ));
        }

        if let Some(product) = subject.product_description.as_deref() {
            if let Some(keyword) = self.reference.dual_use_match(product) {
                debug!(product, keyword, "Dual-use keyword matched");
                v.escalate(RiskLevel::Medium);
                v.reasons.push(format!(
                    "Product ({product}) may be dual-use goods requiring export controls"
                ));
                v.details.push(DUAL_USE_NOTE.to_string());
            }
        }

        v.finish(subject)
    }

    /// Check a single country as if it were the beneficiary country.
    pub fn quick_country_check(&self, country: &str) -> ComplianceVerdict {
        self.evaluate_subject(ComplianceSubject {
            beneficiary_country: Some(country.to_string()),
            ..Default::default()
        })
    }

    /// Check a port as the destination, optionally with a beneficiary country.
    pub fn quick_port_check(&self, port: &str, country: Option<&str>) -> ComplianceVerdict {
        self.evaluate_subject(ComplianceSubject {
            port_of_destination: Some(port.to_string()),
            beneficiary_country: country.map(str::to_string),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn evaluator() -> ComplianceEvaluator {
        ComplianceEvaluator::new(ReferenceData::builtin().unwrap())
    }

    fn lc(
        beneficiary: Option<&str>,
        issuing: Option<&str>,
        loading: Option<&str>,
        destination: Option<&str>,
        product: Option<&str>,
    ) -> LcRecord {
        let v = |s: Option<&str>| s.map(Value::from).unwrap_or(Value::Null);
        LcRecord::new()
            .with("exporter_info", "beneficiary_country", v(beneficiary))
            .with("lc_details", "issuing_bank_country", v(issuing))
            .with("shipment_details", "port_of_loading", v(loading))
            .with("shipment_details", "port_of_destination", v(destination))
            .with("shipment_details", "product_description", v(product))
            .with("amount_and_payment", "amount_usd", 100000)
    }

    fn assert_invariants(verdict: &ComplianceVerdict) {
        if verdict.blocked {
            assert!(!verdict.compliant);
            assert_eq!(verdict.risk_level, RiskLevel::Critical);
        }
    }

    #[test]
    fn test_iran_beneficiary_blocked() {
        let verdict = evaluator().evaluate(&lc(Some("Iran"), None, None, None, None));
        assert!(!verdict.compliant);
        assert_eq!(verdict.risk_level, RiskLevel::Critical);
        assert!(verdict.blocked);
        assert!(!verdict.sources.is_empty());
        assert_eq!(verdict.recommendation, Recommendation::CannotProceed);
        assert_invariants(&verdict);
    }

    #[test]
    fn test_uae_clean() {
        let uae = lc(Some("United Arab Emirates"), None, None, None, None);
        let verdict = evaluator().evaluate(&uae);
        assert!(verdict.compliant);
        assert_eq!(verdict.risk_level, RiskLevel::Low);
        assert!(!verdict.blocked);
        assert!(verdict.reasons.is_empty());
        assert_eq!(verdict.recommendation, Recommendation::Proceed);
        assert_eq!(verdict.reason_summary(), NO_MATCH_REASON);
        assert!(verdict.details[0].contains("United Arab Emirates"));
    }

    #[test]
    fn test_russia_issuing_high() {
        let verdict = evaluator().evaluate(&lc(None, Some("Russia"), None, None, None));
        assert!(!verdict.compliant);
        assert_eq!(verdict.risk_level, RiskLevel::High);
        assert!(!verdict.blocked);
        assert_eq!(verdict.recommendation, Recommendation::ManualReview);
    }

    #[test]
    fn test_critical_issuing_country_alone_is_caution() {
        let verdict = evaluator().evaluate(&lc(None, Some("Iran"), None, None, None));
        assert_eq!(verdict.risk_level, RiskLevel::Critical);
        assert!(!verdict.blocked);
        assert!(!verdict.compliant);
        assert_eq!(verdict.recommendation, Recommendation::ProceedWithCaution);
        assert_invariants(&verdict);
    }

    #[test]
    fn test_dual_use_product_medium() {
        let verdict = evaluator().evaluate(&lc(
            Some("Singapore"),
            Some("Singapore"),
            Some("Singapore Port"),
            Some("Jebel Ali"),
            Some("military drone components"),
        ));
        assert!(verdict.risk_level >= RiskLevel::Medium);
        assert!(verdict.compliant);
        assert!(!verdict.blocked);
        assert_eq!(verdict.recommendation, Recommendation::ProceedWithCaution);
        assert!(verdict.details.iter().any(|d| d.contains("Dual-Use")));
    }

    #[test]
    fn test_bandar_abbas_destination_blocked() {
        for beneficiary in [None, Some("United Arab Emirates"), Some("Russia")] {
            let record = lc(beneficiary, None, None, Some("Bandar Abbas"), None);
            let verdict = evaluator().evaluate(&record);
            assert_eq!(verdict.risk_level, RiskLevel::Critical);
            assert!(verdict.blocked);
            assert_invariants(&verdict);
        }
    }

    #[test]
    fn test_loading_port_caps_at_high() {
        let verdict = evaluator().evaluate(&lc(None, None, Some("Bandar Abbas"), None, None));
        assert_eq!(verdict.risk_level, RiskLevel::High);
        assert!(!verdict.blocked);
        assert!(verdict.compliant);
    }

    #[test]
    fn test_dual_use_never_downgrades() {
        let record = lc(Some("Iran"), None, None, None, Some("nuclear reactor parts"));
        let verdict = evaluator().evaluate(&record);
        assert_eq!(verdict.risk_level, RiskLevel::Critical);
        assert!(verdict.blocked);
        assert_eq!(verdict.reasons.len(), 2);
    }

    #[test]
    fn test_all_rules_accumulate() {
        let verdict = evaluator().evaluate(&lc(
            Some("Sudan"),
            Some("Russia"),
            Some("Novorossiysk"),
            Some("Latakia"),
            Some("semiconductor wafers"),
        ));
        assert_eq!(verdict.reasons.len(), 5);
        assert_eq!(verdict.risk_level, RiskLevel::Critical);
        assert!(verdict.blocked);
        assert!(verdict.sources.len() >= 2);
    }

    #[test]
    fn test_final_level_covers_every_trigger() {
        let reference = ReferenceData::builtin().unwrap();
        let cases = [
            ("Sudan", "Russia"),
            ("Russia", "Sudan"),
            ("Lebanon", "Iran"),
            ("Iran", "Lebanon"),
        ];
        for (beneficiary, issuing) in cases {
            let record = lc(Some(beneficiary), Some(issuing), None, None, None);
            let verdict = evaluator().evaluate(&record);
            let b = reference.country(beneficiary).unwrap().risk_level;
            let i = reference.country(issuing).unwrap().risk_level;
            assert_eq!(verdict.risk_level, b.max(i));
            assert_invariants(&verdict);
        }
    }

    #[test]
    fn test_country_names_are_normalized() {
        let verdict = evaluator().evaluate(&lc(Some("  NORTH KOREA "), None, None, None, None));
        assert!(verdict.blocked);
    }

    #[test]
    fn test_quick_checks() {
        let e = evaluator();
        assert!(e.quick_country_check("Syria").blocked);
        assert!(e.quick_country_check("Japan").compliant);

        let port = e.quick_port_check("Vladivostok", None);
        assert!(!port.compliant);
        assert!(!port.blocked);

        let port = e.quick_port_check("Nampo", Some("North Korea"));
        assert!(port.blocked);
        assert_eq!(port.reasons.len(), 2);
    }

    #[test]
    fn test_fixture_tables_injected() {
        let reference = ReferenceData::from_toml(
            r#"
            dual_use_keywords = ["laser"]
            [countries.atlantis]
            name = "Atlantis"
            status = "COMPREHENSIVE_SANCTIONS"
            risk_level = "CRITICAL"
            blocked = true
            sources = ["https://example.test/atlantis"]
            "#,
        )
        .unwrap();
        let e = ComplianceEvaluator::new(reference);
        assert!(e.evaluate(&lc(Some("Atlantis"), None, None, None, None)).blocked);
        assert!(!e.evaluate(&lc(Some("Iran"), None, None, None, None)).blocked);
        assert_eq!(
            e.evaluate(&lc(None, None, None, None, Some("military drone"))).risk_level,
            RiskLevel::Low
        );
    }

    #[test]
    fn test_amount_does_not_affect_risk() {
        let base = lc(Some("Japan"), None, None, None, None);
        let huge = base.clone().with("amount_and_payment", "amount_usd", 9_000_000_000i64);
        let a = evaluator().evaluate(&base);
        let b = evaluator().evaluate(&huge);
        assert_eq!(a.risk_level, b.risk_level);
        assert_eq!(b.subject.amount_usd, Some(9_000_000_000.0));
    }
}

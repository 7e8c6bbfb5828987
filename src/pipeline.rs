// src/pipeline.rs

use crate::compliance::{ComplianceEvaluator, ComplianceVerdict};
use crate::error::ExtractError;
use crate::merge::{self, Confidence, MissingField};
use crate::normalize::{FieldIssue, Normalized, UnmappedField};
use crate::pdf_extract;
use crate::record::LcRecord;
use crate::reference::ReferenceData;
use crate::schema::SchemaRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{Instrument, info, warn};

/// Shorter transcripts (after trimming) are rejected before extraction.
pub const MIN_TRANSCRIPT_CHARS: usize = 10;

/// Harmonized System classification of the goods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HsCodeInfo {
    pub hs_code: String,
    #[serde(default)]
    pub hs_description: Option<String>,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default = "default_hs_confidence")]
    pub confidence: Confidence,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub alternative_codes: Vec<String>,
}

fn default_hs_confidence() -> Confidence {
    Confidence::Low
}

/// Anything that turns free text into a raw (not yet normalized) LC object.
#[async_trait]
pub trait LcExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract_document(&self, text: &str) -> Result<Map<String, Value>, ExtractError>;

    /// `provided` holds what the caller already knows; it is context only.
    async fn extract_transcript(
        &self,
        transcript: &str,
        provided: &LcRecord,
    ) -> Result<Map<String, Value>, ExtractError>;

    async fn classify_hs(&self, product: &str) -> Result<Option<HsCodeInfo>, ExtractError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Pdf,
    Voice,
    Form,
}

impl Channel {
    fn as_str(self) -> &'static str {
        match self {
            Channel::Pdf => "pdf",
            Channel::Voice => "voice",
            Channel::Form => "form",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub filled: usize,
    pub total: usize,
}

/// Everything known about one LC after a pass through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct LcReport {
    /// Hex SHA-256 over the channel and input bytes.
    pub id: String,
    pub channel: Channel,
    pub checked_at: String,
    pub lc_data: LcRecord,
    pub unmapped: Vec<UnmappedField>,
    pub issues: Vec<FieldIssue>,
    pub missing: Vec<MissingField>,
    pub coverage: Coverage,
    pub confidence: Confidence,
    pub hs_code: Option<HsCodeInfo>,
    pub compliance: ComplianceVerdict,
}

/// Stable id for a given channel and input.
pub fn report_id(channel: Channel, input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(channel.as_str().as_bytes());
    hasher.update(input);
    format!("{:x}", hasher.finalize())
}

/// Normalize, merge and evaluate. Holds no per-request state.
#[derive(Debug, Clone)]
pub struct LcPipeline {
    registry: SchemaRegistry,
    evaluator: ComplianceEvaluator,
}

impl LcPipeline {
    pub fn new(registry: SchemaRegistry, reference: ReferenceData) -> Self {
        Self {
            registry,
            evaluator: ComplianceEvaluator::new(reference),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn evaluator(&self) -> &ComplianceEvaluator {
        &self.evaluator
    }

    /// Finish a report from an already normalized record.
    pub fn assemble(
        &self,
        channel: Channel,
        input: &[u8],
        normalized: Normalized,
        hs_code: Option<HsCodeInfo>,
    ) -> LcReport {
        let Normalized {
            record,
            unmapped,
            issues,
        } = normalized;

        let missing = merge::missing_fields(&self.registry, &record);
        let (filled, total) = merge::coverage(&self.registry, &record);
        let compliance = self.evaluator.evaluate(&record);
        let checked_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();

        info!(
            channel = channel.as_str(),
            filled,
            total,
            missing = missing.len(),
            unmapped = unmapped.len(),
            risk = %compliance.risk_level,
            blocked = compliance.blocked,
            "LC report assembled"
        );

        LcReport {
            id: report_id(channel, input),
            channel,
            checked_at,
            lc_data: record,
            unmapped,
            issues,
            missing,
            coverage: Coverage { filled, total },
            confidence: Confidence::from_coverage((filled, total)),
            hs_code,
            compliance,
        }
    }

    /// Web-form data on its own: no extraction, no HS lookup.
    pub fn process_form(&self, raw: &Map<String, Value>) -> LcReport {
        let span = tracing::info_span!("form", labels = raw.len());
        let _guard = span.enter();

        let input = Value::Object(raw.clone()).to_string();
        self.assemble(Channel::Form, input.as_bytes(), self.registry.normalize(raw), None)
    }

    pub async fn process_pdf(
        &self,
        extractor: &dyn LcExtractor,
        pdf_bytes: &[u8],
        provided: Option<&Map<String, Value>>,
    ) -> Result<LcReport, ExtractError> {
        let text = pdf_extract::read_pdf_text(pdf_bytes)?;
        let span = tracing::info_span!(
            "pdf",
            bytes = pdf_bytes.len(),
            extractor = extractor.name()
        );
        self.document_report(extractor, &text, pdf_bytes, provided)
            .instrument(span)
            .await
    }

    /// Document text that is already extracted, such as a pasted MT700.
    pub async fn process_document_text(
        &self,
        extractor: &dyn LcExtractor,
        text: &str,
        provided: Option<&Map<String, Value>>,
    ) -> Result<LcReport, ExtractError> {
        let span = tracing::info_span!(
            "document",
            chars = text.len(),
            extractor = extractor.name()
        );
        self.document_report(extractor, text, text.as_bytes(), provided)
            .instrument(span)
            .await
    }

    async fn document_report(
        &self,
        extractor: &dyn LcExtractor,
        text: &str,
        input: &[u8],
        provided: Option<&Map<String, Value>>,
    ) -> Result<LcReport, ExtractError> {
        let extracted = self.registry.normalize(&extractor.extract_document(text).await?);
        let normalized = match provided {
            Some(p) => join(self.registry.normalize(p), extracted),
            None => extracted,
        };
        let hs_code = self.classify(extractor, &normalized.record).await;

        Ok(self.assemble(Channel::Pdf, input, normalized, hs_code))
    }

    /// Transcript of a call. Data the caller already provided wins over anything
    /// heard on the call.
    pub async fn process_transcript(
        &self,
        extractor: &dyn LcExtractor,
        transcript: &str,
        provided: Option<&Map<String, Value>>,
    ) -> Result<LcReport, ExtractError> {
        let trimmed = transcript.trim();
        let len = trimmed.chars().count();
        if len < MIN_TRANSCRIPT_CHARS {
            return Err(ExtractError::TranscriptTooShort {
                len,
                min: MIN_TRANSCRIPT_CHARS,
            });
        }

        let span = tracing::info_span!("voice", chars = len, extractor = extractor.name());
        async {
            let base = provided.map(|p| self.registry.normalize(p));
            let context = base.as_ref().map(|b| b.record.clone()).unwrap_or_default();
            let raw = extractor.extract_transcript(trimmed, &context).await?;
            let extracted = self.registry.normalize(&raw);

            let normalized = match base {
                Some(base) => join(base, extracted),
                None => extracted,
            };
            let hs_code = self.classify(extractor, &normalized.record).await;

            Ok::<_, ExtractError>(self.assemble(
                Channel::Voice,
                trimmed.as_bytes(),
                normalized,
                hs_code,
            ))
        }
        .instrument(span)
        .await
    }

    /// HS lookup is enrichment only; a failure leaves the report without it.
    async fn classify(&self, extractor: &dyn LcExtractor, record: &LcRecord) -> Option<HsCodeInfo> {
        let product = record.text("shipment_details", "product_description")?;
        match extractor.classify_hs(product).await {
            Ok(hs) => hs,
            Err(e) => {
                warn!(error = %e, product, "HS code classification failed");
                None
            }
        }
    }
}

/// Fill-only merge with `base` authoritative; diagnostics from both sides are kept.
fn join(base: Normalized, incoming: Normalized) -> Normalized {
    let mut unmapped = base.unmapped;
    unmapped.extend(incoming.unmapped);
    let mut issues = base.issues;
    issues.extend(incoming.issues);
    Normalized {
        record: merge::merge(&base.record, &incoming.record),
        unmapped,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::{Recommendation, RiskLevel};
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays a canned raw object and records the context it was given.
    struct StubExtractor {
        raw: Value,
        hs: Option<HsCodeInfo>,
        hs_fails: bool,
        seen_context: Mutex<Option<LcRecord>>,
    }

    impl StubExtractor {
        fn new(raw: Value) -> Self {
            Self {
                raw,
                hs: None,
                hs_fails: false,
                seen_context: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LcExtractor for StubExtractor {
        fn name(&self) -> &str {
            "stub"
        }

        async fn extract_document(&self, _text: &str) -> Result<Map<String, Value>, ExtractError> {
            Ok(self.raw.as_object().cloned().unwrap_or_default())
        }

        async fn extract_transcript(
            &self,
            _transcript: &str,
            provided: &LcRecord,
        ) -> Result<Map<String, Value>, ExtractError> {
            *self.seen_context.lock().unwrap() = Some(provided.clone());
            Ok(self.raw.as_object().cloned().unwrap_or_default())
        }

        async fn classify_hs(&self, _product: &str) -> Result<Option<HsCodeInfo>, ExtractError> {
            if self.hs_fails {
                return Err(ExtractError::EmptyResponse);
            }
            Ok(self.hs.clone())
        }
    }

    fn pipeline() -> LcPipeline {
        LcPipeline::new(
            SchemaRegistry::lc_form().unwrap(),
            ReferenceData::builtin().unwrap(),
        )
    }

    fn object(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_transcript_too_short() {
        let stub = StubExtractor::new(json!({}));
        let err = pipeline()
            .process_transcript(&stub, "   hi there  ", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractError::TranscriptTooShort { len: 8, min: 10 }
        ));
    }

    #[tokio::test]
    async fn test_transcript_keeps_provided_values() {
        let stub = StubExtractor::new(json!({
            "shipment_details": {
                "loading_port": "Port Qasim",
                "destination_port": "Jebel Ali",
                "product_description": "Cotton yarn"
            },
            "exporter_info": { "beneficiary_country": "UAE" }
        }));
        let provided = object(json!({
            "shipment_details": { "port_of_loading": "Karachi" },
            "amount_and_payment": { "amount_usd": 250000 }
        }));

        let report = pipeline()
            .process_transcript(&stub, "We are shipping cotton yarn to Dubai.", Some(&provided))
            .await
            .unwrap();

        let lc = &report.lc_data;
        assert_eq!(lc.text("shipment_details", "port_of_loading"), Some("Karachi"));
        assert_eq!(lc.text("shipment_details", "port_of_destination"), Some("Jebel Ali"));
        assert_eq!(lc.number("amount_and_payment", "amount_usd"), Some(250000.0));
        assert_eq!(report.channel, Channel::Voice);
        assert!(report.compliance.compliant);
        assert_eq!(report.compliance.recommendation, Recommendation::Proceed);

        let seen = stub.seen_context.lock().unwrap().clone().unwrap();
        assert_eq!(seen.text("shipment_details", "port_of_loading"), Some("Karachi"));
    }

    #[tokio::test]
    async fn test_document_blocked_destination() {
        let stub = StubExtractor::new(json!({
            "exporter_info": { "beneficiary_country": "UAE" },
            "shipment_details": { "destination_port": "Bandar Abbas" }
        }));
        let report = pipeline()
            .process_document_text(&stub, "LC text", None)
            .await
            .unwrap();
        assert!(report.compliance.blocked);
        assert_eq!(report.compliance.risk_level, RiskLevel::Critical);
        assert_eq!(report.channel, Channel::Pdf);
    }

    #[tokio::test]
    async fn test_hs_failure_is_not_fatal() {
        let mut stub = StubExtractor::new(json!({
            "shipment_details": { "product_description": "Industrial drone parts" }
        }));
        stub.hs_fails = true;
        let report = pipeline()
            .process_document_text(&stub, "LC text", None)
            .await
            .unwrap();
        assert!(report.hs_code.is_none());
        assert_eq!(report.compliance.risk_level, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn test_hs_attached_when_product_known() {
        let mut stub = StubExtractor::new(json!({
            "shipment_details": { "product_description": "Cotton yarn" }
        }));
        stub.hs = Some(HsCodeInfo {
            hs_code: "520512".to_string(),
            hs_description: Some("Cotton yarn, single, uncombed".to_string()),
            chapter: Some("Cotton".to_string()),
            confidence: Confidence::High,
            reasoning: None,
            alternative_codes: vec![],
        });
        let report = pipeline()
            .process_document_text(&stub, "LC text", None)
            .await
            .unwrap();
        assert_eq!(report.hs_code.unwrap().hs_code, "520512");
    }

    #[test]
    fn test_form_report_shape() {
        let raw = object(json!({
            "transaction_role": "Importer (Applicant)",
            "lc_details": { "lc_type": "International", "swift_ref": "X1" },
            "beneficiary_country": "Iran"
        }));
        let report = pipeline().process_form(&raw);
        assert!(report.compliance.blocked);
        assert_eq!(report.unmapped.len(), 1);
        assert_eq!(report.coverage.filled, 3);
        assert_eq!(report.missing.len(), report.coverage.total - 3);
        assert_eq!(report.confidence, Confidence::Low);
        assert!(report.hs_code.is_none());
        assert_eq!(report.id, pipeline().process_form(&raw).id);
    }

    #[test]
    fn test_report_id_depends_on_channel() {
        assert_ne!(
            report_id(Channel::Pdf, b"same"),
            report_id(Channel::Voice, b"same")
        );
        assert_eq!(report_id(Channel::Form, b"x").len(), 64);
    }

    #[test]
    fn test_hs_info_defaults() {
        let hs: HsCodeInfo = serde_json::from_value(json!({ "hs_code": "8471" })).unwrap();
        assert_eq!(hs.confidence, Confidence::Low);
        assert!(hs.alternative_codes.is_empty());
    }
}

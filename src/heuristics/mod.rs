// src/heuristics/mod.rs

mod mt700;

pub use mt700::parse_tags;

use crate::error::ExtractError;
use crate::pipeline::{HsCodeInfo, LcExtractor};
use crate::record::LcRecord;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

/// Extract a raw LC record from SWIFT MT700 tagged text.
///
/// Keys are the short wire names the normalizer resolves; tags without a form
/// field travel as top-level labels and end up in the unmapped bucket.
pub fn extract_lc(text: &str) -> Map<String, Value> {
    mt700::extract(text)
}

/// Offline extractor used by the `heuristics` backend. Never touches the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicExtractor;

#[async_trait]
impl LcExtractor for HeuristicExtractor {
    fn name(&self) -> &str {
        "heuristics"
    }

    async fn extract_document(&self, text: &str) -> Result<Map<String, Value>, ExtractError> {
        let raw = extract_lc(text);
        debug!(labels = raw.len(), "MT700 heuristic extraction");
        Ok(raw)
    }

    async fn extract_transcript(
        &self,
        transcript: &str,
        _provided: &LcRecord,
    ) -> Result<Map<String, Value>, ExtractError> {
        // Spoken calls rarely carry tags; whatever does parse is still useful.
        Ok(extract_lc(transcript))
    }

    async fn classify_hs(&self, _product: &str) -> Result<Option<HsCodeInfo>, ExtractError> {
        Ok(None)
    }
}

// src/error.rs

use crate::reference::ReferenceError;
use crate::schema::SchemaError;
use thiserror::Error;

/// Failures on the way from a document or transcript to a report.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("empty response from LLM")]
    EmptyResponse,

    #[error("no JSON object in LLM response: {0}")]
    NoJsonObject(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(String),

    #[error("failed to read PDF: {0}")]
    Pdf(String),

    #[error("PDF is scanned or image-only and needs OCR")]
    ScannedPdf,

    #[error("transcript too short ({len} chars, need at least {min})")]
    TranscriptTooShort { len: usize, min: usize },

    #[error("LLM_API_KEY env var required for remote backend")]
    MissingApiKey,

    #[error("{backend} backend is not reachable at {url}")]
    BackendUnavailable { backend: String, url: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// src/pdf_extract.rs

use crate::error::ExtractError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, info, warn};

/// What a PDF upload turned out to be.
#[derive(Debug, PartialEq)]
pub enum PdfContent {
    Text(String),
    /// Image-only pages; an LC scan needs OCR before it can be read.
    ScannedImage,
    Error(String),
}

/// Below this many non-whitespace characters a PDF counts as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// Share of image-only pages above which the whole document counts as scanned.
const SCANNED_PAGE_RATIO: f64 = 0.8;

/// Classify the PDF and pull its text when there is any.
pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> PdfContent {
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => return PdfContent::Error(format!("Failed to parse PDF: {e}")),
    };

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned");
        return PdfContent::ScannedImage;
    }

    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => {
            let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
            if meaningful < MIN_TEXT_CHARS {
                info!(chars = meaningful, "Extracted text too short, treating as scanned");
                PdfContent::ScannedImage
            } else {
                info!(chars = meaningful, "Text extracted from LC document");
                PdfContent::Text(text)
            }
        }
        Err(e) => {
            warn!(error = %e, "pdf-extract failed, may be scanned or corrupted");
            PdfContent::ScannedImage
        }
    }
}

/// Text of a PDF, or the reason there is none.
pub fn read_pdf_text(pdf_bytes: &[u8]) -> Result<String, ExtractError> {
    match extract_text_from_pdf(pdf_bytes) {
        PdfContent::Text(text) => Ok(text),
        PdfContent::ScannedImage => Err(ExtractError::ScannedPdf),
        PdfContent::Error(e) => Err(ExtractError::Pdf(e)),
    }
}

/// Follow a reference (if any) and view the target as a dictionary.
fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    doc.dereference(obj)
        .ok()
        .and_then(|(_, resolved)| resolved.as_dict().ok())
}

/// Non-empty entry `key` of the page's Resources dictionary.
fn has_resource(doc: &Document, page: &Dictionary, key: &[u8]) -> bool {
    page.get(b"Resources")
        .ok()
        .and_then(|r| resolve_dict(doc, r))
        .and_then(|res| res.get(key).ok())
        .and_then(|entry| resolve_dict(doc, entry))
        .is_some_and(|d| !d.is_empty())
}

fn is_image_only(doc: &Document, page_id: ObjectId) -> bool {
    let Some(page) = doc.get_object(page_id).ok().and_then(|o| o.as_dict().ok()) else {
        return false;
    };
    has_resource(doc, page, b"XObject") && !has_resource(doc, page, b"Font")
}

/// A page with XObject images but no Font resources is a scan.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false;
    }

    let image_only = pages
        .values()
        .filter(|id| is_image_only(doc, **id))
        .count();
    let ratio = image_only as f64 / pages.len() as f64;
    debug!(
        total_pages = pages.len(),
        image_only,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    ratio >= SCANNED_PAGE_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes() {
        let result = extract_text_from_pdf(b"this is not a pdf");
        assert!(matches!(result, PdfContent::Error(_)));
    }

    #[test]
    fn test_read_pdf_text_maps_errors() {
        let err = read_pdf_text(b"%PDF-garbage").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_empty_document_is_not_scanned() {
        assert!(!looks_like_scanned(&Document::with_version("1.5")));
    }
}

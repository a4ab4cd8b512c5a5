//! PDF text extraction.
//!
//! Pages are walked in order with lopdf and their text joined with newlines.
//! When lopdf yields nothing (unusual encodings, damaged xref tables) the
//! whole buffer is handed to pdf-extract instead.

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use lopdf::Document;
use tracing::{debug, warn};

use crate::{Result, StemError};

pub const PDF_SIGNATURE: &[u8] = b"%PDF";
const FIRST_PAGE_EXCERPT_CHARS: usize = 1000;

/// Plain text and layout facts recovered from one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub text: String,
    pub page_count: usize,
    pub first_page_text: Option<String>,
}

impl ExtractedDocument {
    #[inline]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: Vec<u8>) -> Result<ExtractedDocument>;
}

#[derive(Debug, Clone)]
pub struct PdfTextExtractor {
    max_bytes: u64,
}

impl PdfTextExtractor {
    #[inline]
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<ExtractedDocument> {
        validate_pdf(&bytes, self.max_bytes)?;

        let document = tokio::task::spawn_blocking(move || extract_pdf(&bytes))
            .await
            .map_err(|e| StemError::Extraction(format!("Task join error: {}", e)))??;

        debug!(
            "Extracted {} characters from {} pages",
            document.text.len(),
            document.page_count
        );
        Ok(document)
    }
}

/// Reject payloads that are empty, oversized, or lack the PDF signature.
#[inline]
pub fn validate_pdf(bytes: &[u8], max_bytes: u64) -> Result<()> {
    if bytes.is_empty() {
        return Err(StemError::Extraction("Document is empty".to_string()));
    }

    if bytes.len() as u64 > max_bytes {
        return Err(StemError::Extraction(format!(
            "Document is {} bytes, larger than the {} byte limit",
            bytes.len(),
            max_bytes
        )));
    }

    if !bytes.starts_with(PDF_SIGNATURE) {
        return Err(StemError::Extraction(
            "Invalid PDF file: missing %PDF signature".to_string(),
        ));
    }

    Ok(())
}

/// Extract text page by page, falling back to pdf-extract for the whole buffer.
#[inline]
pub fn extract_pdf(bytes: &[u8]) -> Result<ExtractedDocument> {
    let document = Document::load_mem(bytes)
        .map_err(|e| StemError::Extraction(format!("Failed to parse PDF: {}", e)))?;

    let pages = document.get_pages();
    let page_count = pages.len();
    let mut page_texts = Vec::with_capacity(page_count);

    for page_number in pages.keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) => page_texts.push(text.trim().to_string()),
            Err(e) => {
                debug!("No text recovered from page {}: {}", page_number, e);
                page_texts.push(String::new());
            }
        }
    }

    let first_page_text = page_texts
        .first()
        .filter(|text| !text.is_empty())
        .map(|text| excerpt(text, FIRST_PAGE_EXCERPT_CHARS));

    let mut text = page_texts.join("\n");

    if text.trim().is_empty() {
        match pdf_extract::extract_text_from_mem(bytes) {
            Ok(fallback) => text = fallback,
            Err(e) => warn!("pdf-extract fallback failed: {}", e),
        }
    }

    Ok(ExtractedDocument {
        text,
        page_count,
        first_page_text,
    })
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

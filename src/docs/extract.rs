//! Text extraction and preflight validation for uploaded files.
//!
//! Extraction runs BEFORE the file is sent to the retrieval API: empty,
//! corrupted, and image-only files are rejected up front with distinct
//! user-facing errors, and the page index built here is what the citation
//! locator later matches quotes against.

use tracing::{debug, info};

use crate::docs::ocr::OcrEngine;
use crate::docs::page::Document;
use crate::error::BotError;

/// Payloads under 1KB are treated as effectively empty.
pub const MIN_FILE_BYTES: usize = 1024;

/// Minimum normalized characters across all pages for a PDF to count as
/// having searchable text.
pub const MIN_TEXT_CHARS_NORM: usize = 40;

/// The two upload types the coach accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Text,
}

impl FileKind {
    /// Classify from the attachment's content type, falling back to the
    /// filename extension when the host didn't set one.
    pub fn classify(content_type: Option<&str>, filename: &str) -> Option<Self> {
        match content_type {
            Some(ct) if ct.starts_with("application/pdf") => return Some(Self::Pdf),
            Some(ct) if ct.starts_with("text/plain") => return Some(Self::Text),
            _ => {}
        }
        let lower = filename.to_lowercase();
        if lower.ends_with(".pdf") {
            Some(Self::Pdf)
        } else if lower.ends_with(".txt") {
            Some(Self::Text)
        } else {
            None
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Text => "text/plain",
        }
    }
}

/// Extract a page-indexed [`Document`] from raw file bytes.
///
/// PDFs go through `pdf-extract`; when that yields pages but no usable text
/// (scanned documents), the OCR engine is tried if available. Plain text
/// becomes a single-page document.
pub async fn extract_document(
    filename: &str,
    kind: FileKind,
    data: &[u8],
    ocr: Option<&OcrEngine>,
) -> Result<Document, BotError> {
    if data.len() < MIN_FILE_BYTES {
        return Err(BotError::EmptyDocument);
    }
    match kind {
        FileKind::Text => extract_text(filename, data),
        FileKind::Pdf => extract_pdf(filename, data, ocr).await,
    }
}

fn extract_text(filename: &str, data: &[u8]) -> Result<Document, BotError> {
    let text = String::from_utf8_lossy(data);
    if text.trim().is_empty() {
        return Err(BotError::EmptyDocument);
    }
    Ok(Document::new(filename, vec![text.into_owned()]))
}

async fn extract_pdf(
    filename: &str,
    data: &[u8],
    ocr: Option<&OcrEngine>,
) -> Result<Document, BotError> {
    // pdf-extract is CPU-bound; keep it off the event loop.
    let owned = data.to_vec();
    let pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&owned)
    })
    .await
    .map_err(|e| BotError::ExtractionFailed(format!("extraction task: {e}")))?
    .map_err(|e| BotError::ExtractionFailed(e.to_string()))?;

    if pages.is_empty() {
        return Err(BotError::EmptyDocument);
    }

    let doc = Document::new(filename, pages);
    let raw_chars: usize = doc.pages().iter().map(|p| p.text().len()).sum();
    debug!(
        filename,
        pages = doc.page_count(),
        raw_chars,
        norm_chars = doc.norm_char_count(),
        "PDF preflight"
    );
    if doc.norm_char_count() >= MIN_TEXT_CHARS_NORM {
        return Ok(doc);
    }

    // Native extraction came up (nearly) empty: image-only PDF. Try OCR.
    let Some(engine) = ocr else {
        return Err(BotError::NoSearchableText);
    };
    info!(filename, "native extraction empty, running OCR fallback");
    let ocr_pages = engine.extract_pages(data).await?;
    if ocr_pages.is_empty() {
        return Err(BotError::NoSearchableText);
    }
    let doc = Document::new(filename, ocr_pages);
    if doc.norm_char_count() < MIN_TEXT_CHARS_NORM {
        return Err(BotError::NoSearchableText);
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prefers_content_type() {
        assert_eq!(
            FileKind::classify(Some("application/pdf"), "whatever.bin"),
            Some(FileKind::Pdf)
        );
        assert_eq!(
            FileKind::classify(Some("text/plain; charset=utf-8"), "notes"),
            Some(FileKind::Text)
        );
    }

    #[test]
    fn classify_falls_back_to_extension() {
        assert_eq!(FileKind::classify(None, "Guide.PDF"), Some(FileKind::Pdf));
        assert_eq!(FileKind::classify(None, "notes.txt"), Some(FileKind::Text));
        assert_eq!(FileKind::classify(Some("image/png"), "scan.png"), None);
        assert_eq!(FileKind::classify(None, "archive.zip"), None);
    }

    #[tokio::test]
    async fn tiny_payload_is_empty_document() {
        let err = extract_document("a.txt", FileKind::Text, b"hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::EmptyDocument));
    }

    #[tokio::test]
    async fn whitespace_only_text_is_empty_document() {
        let blob = vec![b' '; 4096];
        let err = extract_document("a.txt", FileKind::Text, &blob, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::EmptyDocument));
    }

    #[tokio::test]
    async fn text_file_becomes_single_page() {
        let mut blob = b"Investing means putting money to work over time.".to_vec();
        blob.resize(2048, b' ');
        let doc = extract_document("notes.txt", FileKind::Text, &blob, None)
            .await
            .unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.pages()[0].number(), 1);
        assert!(doc.pages()[0].norm().starts_with("investing means"));
    }

    #[tokio::test]
    async fn garbage_pdf_is_extraction_failed() {
        let blob = vec![0xA5u8; 4096];
        let err = extract_document("broken.pdf", FileKind::Pdf, &blob, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::ExtractionFailed(_)));
    }
}

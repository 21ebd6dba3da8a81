use thiserror::Error;

/// Domain errors for the bot. Every variant is recovered locally and turned
/// into a chat reply via [`BotError::user_message`]; none of these crash the
/// process.
#[derive(Debug, Error)]
pub enum BotError {
    /// File had no content at all (zero bytes, sub-1KB payload, or a PDF
    /// that parsed to zero pages).
    #[error("document is empty")]
    EmptyDocument,

    /// File could not be parsed (corrupted or password-protected PDF).
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// PDF parsed but yielded no searchable text, and the OCR fallback was
    /// disabled, unavailable, or also came up empty.
    #[error("no searchable text in document")]
    NoSearchableText,

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    /// Attachment could not be fetched from the file host.
    #[error("download failed: {0}")]
    Download(String),

    /// File upload to the retrieval API failed.
    #[error("upload failed: {0}")]
    Upload(String),

    /// A quote could not be matched to any page above the confidence
    /// threshold. Callers degrade to "page n/a" rather than guessing.
    #[error("citation could not be resolved to a page")]
    UnresolvedCitation,

    /// OpenAI returned a non-success status, an unparseable body, or the
    /// assistant run timed out / ended in a terminal failure state.
    #[error("upstream API error: {0}")]
    UpstreamApi(String),

    #[error("rate limited")]
    RateLimited,

    /// The in-flight request was cancelled by `/reset`.
    #[error("cancelled by reset")]
    Cancelled,

    /// NPF_ASSISTANT_ID is not set.
    #[error("assistant not configured")]
    NotConfigured,
}

impl BotError {
    /// The friendly message shown in the Discord channel. Wording is stable:
    /// compliance review signed off on these strings.
    pub fn user_message(&self) -> String {
        match self {
            BotError::EmptyDocument => "This file is empty, no analysis possible.".into(),
            BotError::ExtractionFailed(_) => {
                "This file is corrupted and cannot be read.".into()
            }
            BotError::NoSearchableText => {
                "I couldn't find searchable text in this document. If it's a \
                 scanned/image-only PDF, OCR could not recover any text from it."
                    .into()
            }
            BotError::UnsupportedFileType(_) => {
                "Unsupported file type. Please upload PDF or TXT.".into()
            }
            BotError::FileTooLarge(_) => {
                "File too large. Please keep it under the size limit.".into()
            }
            BotError::Download(_) => {
                "I couldn't download the file from Discord. Please re-upload and try again."
                    .into()
            }
            BotError::Upload(_) => {
                "There was a problem processing this file. Please try another file.".into()
            }
            BotError::UnresolvedCitation => {
                "I couldn't pin that citation to a page.".into()
            }
            BotError::UpstreamApi(_) => {
                "Sorry, I hit an issue talking to the model. Please try again.".into()
            }
            BotError::RateLimited => {
                "⏳ Rate limit reached. Please retry in a minute.".into()
            }
            BotError::Cancelled => {
                "♻️ Session was reset; the pending request was cancelled.".into()
            }
            BotError::NotConfigured => {
                "Assistant is not configured yet. Please set NPF_ASSISTANT_ID.".into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_distinguish_empty_from_corrupted() {
        let empty = BotError::EmptyDocument.user_message();
        let corrupt = BotError::ExtractionFailed("bad xref".into()).user_message();
        let scanned = BotError::NoSearchableText.user_message();
        assert_ne!(empty, corrupt);
        assert_ne!(empty, scanned);
        assert_ne!(corrupt, scanned);
    }

    #[test]
    fn display_carries_detail_for_logs() {
        let err = BotError::UpstreamApi("HTTP 500".into());
        assert!(err.to_string().contains("HTTP 500"));
        // but the user never sees the raw detail
        assert!(!err.user_message().contains("500"));
    }
}

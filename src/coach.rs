//! Coach mode pipeline: attachment guards, preflight extraction, upload,
//! question/run round-trip, and citation resolution.
//!
//! The ordering matters: files are validated and page-indexed locally BEFORE
//! anything is sent to OpenAI, so empty/corrupted/image-only uploads are
//! rejected without burning an upload, and the page index is guaranteed to
//! exist by the time citations come back.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::discord::types::Attachment;
use crate::docs::extract::{extract_document, FileKind, MIN_FILE_BYTES};
use crate::docs::Locator;
use crate::error::BotError;
use crate::openai::assistant::FileQuote;
use crate::session::SessionStore;
use crate::state::AppState;

/// Citation snippets are clipped to this many characters in the reply.
const MAX_SNIPPET_CHARS: usize = 140;

/// Shortest quoted span in an answer worth synthesizing a citation from.
const MIN_SYNTH_QUOTE_CHARS: usize = 12;

fn quote_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| Regex::new(r#""([^"]+)"|“([^”]+)”"#).unwrap())
}

/// Answer a coach question, optionally ingesting a new attachment first.
/// Returns the formatted reply text; every failure mode maps to a friendly
/// message via [`BotError::user_message`].
pub async fn coach_answer(
    state: &Arc<AppState>,
    user_id: &str,
    question: Option<&str>,
    attachment: Option<&Attachment>,
) -> Result<String, BotError> {
    let Some(assistant_id) = state.config.assistant_id.clone() else {
        return Err(BotError::NotConfigured);
    };
    let cancel = state.sessions.cancel_token(user_id);

    let mut file_ids: Vec<String> = Vec::new();
    if let Some(attachment) = attachment {
        let file_id = ingest_attachment(state, user_id, attachment).await?;
        file_ids.push(file_id);
    }

    // Coach is retrieval-first: free questions need a prior valid upload.
    if file_ids.is_empty() && !state.sessions.has_file(user_id) {
        return Ok("Please upload a PDF or TXT to start a new session.".to_string());
    }

    let thread_id = match state.sessions.thread_id(user_id) {
        Some(id) => id,
        None => {
            let id = state.openai.create_thread().await?;
            state.sessions.set_thread_id(user_id, id.clone());
            id
        }
    };

    state
        .openai
        .post_user_message(&thread_id, question.unwrap_or(""), &file_ids)
        .await?;
    let reply = state
        .openai
        .run_and_wait(&thread_id, &assistant_id, &cancel)
        .await?;

    let quotes = if reply.quotes.is_empty() {
        debug!(user_id, "no annotations returned, synthesizing from answer text");
        synthesize_citations(&state.sessions, &state.locator, user_id, &reply.answer)
    } else {
        reply.quotes
    };

    Ok(format_with_citations(
        &state.sessions,
        &state.locator,
        user_id,
        &reply.answer,
        &quotes,
    ))
}

/// Validate, download, preflight-extract, upload, and index one attachment.
/// Returns the OpenAI file id.
async fn ingest_attachment(
    state: &Arc<AppState>,
    user_id: &str,
    attachment: &Attachment,
) -> Result<String, BotError> {
    info!(
        user_id,
        filename = %attachment.filename,
        size = attachment.size,
        content_type = attachment.content_type.as_deref().unwrap_or("-"),
        "coach upload received"
    );

    let kind = FileKind::classify(attachment.content_type.as_deref(), &attachment.filename)
        .ok_or_else(|| {
            BotError::UnsupportedFileType(
                attachment.content_type.clone().unwrap_or_else(|| attachment.filename.clone()),
            )
        })?;
    if (attachment.size as usize) < MIN_FILE_BYTES {
        return Err(BotError::EmptyDocument);
    }
    if attachment.size > state.config.max_file_bytes() {
        return Err(BotError::FileTooLarge(attachment.size));
    }

    let data = state
        .rest
        .download(&attachment.url, state.config.max_file_bytes())
        .await?;

    // Preflight: parse and page-index before the upload, failing fast on
    // empty/corrupted/image-only files.
    let document =
        extract_document(&attachment.filename, kind, &data, state.ocr.as_ref()).await?;
    debug!(
        filename = %attachment.filename,
        pages = document.page_count(),
        norm_chars = document.norm_char_count(),
        "preflight extraction ok"
    );

    let file_id = state
        .openai
        .upload_file(&attachment.filename, data, kind.mime())
        .await?;
    state.sessions.add_file(user_id, file_id.clone(), Arc::new(document));
    Ok(file_id)
}

/// First double-quoted span of the answer, if long enough to match against.
fn extract_quote_from_answer(answer: &str) -> Option<String> {
    let caps = quote_rx().captures(answer)?;
    let quote = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())?;
    (quote.chars().count() >= MIN_SYNTH_QUOTE_CHARS).then_some(quote)
}

/// When the assistant returned no annotations, try to recover a citation
/// from quoted text in the answer: any session file the quote locates in
/// wins; otherwise fall back to the most recent file with no page claim.
fn synthesize_citations(
    sessions: &SessionStore,
    locator: &Locator,
    user_id: &str,
    answer: &str,
) -> Vec<FileQuote> {
    let Some(quote) = extract_quote_from_answer(answer) else {
        return Vec::new();
    };
    let files = sessions.files(user_id);
    for file in &files {
        if locator.resolve(&file.document, &quote).is_ok() {
            debug!(file_id = %file.file_id, "synthesized citation located in file");
            return vec![FileQuote { file_id: file.file_id.clone(), quote }];
        }
    }
    match files.last() {
        Some(file) => {
            warn!("synthesized citation could not be located; attributing to latest file");
            vec![FileQuote { file_id: file.file_id.clone(), quote }]
        }
        None => Vec::new(),
    }
}

/// Append a numbered citations block, resolving each quote to a page via the
/// locator. Unresolvable quotes degrade to "page n/a" — a wrong page number
/// is worse than none.
fn format_with_citations(
    sessions: &SessionStore,
    locator: &Locator,
    user_id: &str,
    answer: &str,
    quotes: &[FileQuote],
) -> String {
    if quotes.is_empty() {
        return answer.to_string();
    }

    let mut seen: Vec<(String, String, Option<u32>)> = Vec::new();
    let mut lines = Vec::new();
    for quote in quotes {
        let document = sessions.document_for(user_id, &quote.file_id);
        let filename = document
            .as_ref()
            .map(|d| d.filename().to_string())
            .unwrap_or_else(|| quote.file_id.clone());

        let page = document
            .as_ref()
            .filter(|_| !quote.quote.is_empty())
            .and_then(|doc| locator.resolve(doc, &quote.quote).ok())
            .map(|c| c.page);

        let mut snippet = if quote.quote.is_empty() {
            format!("See source {filename}")
        } else {
            quote.quote.clone()
        };
        if snippet.chars().count() > MAX_SNIPPET_CHARS {
            snippet = snippet.chars().take(MAX_SNIPPET_CHARS - 3).collect::<String>() + "...";
        }

        let key = (quote.file_id.clone(), snippet.clone(), page);
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);

        let page_part = match page {
            Some(n) => format!("page {n}"),
            None => "page n/a".to_string(),
        };
        lines.push(format!("[{}] {snippet} ({filename}, {page_part})", lines.len() + 1));
    }

    format!("{answer}\n\n**Citations:**\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::Document;

    fn store_with_doc() -> SessionStore {
        let store = SessionStore::new();
        store.add_file(
            "alice",
            "file-abc".into(),
            Arc::new(Document::new(
                "guide.pdf",
                vec![
                    "Investing means putting money to work over time.".into(),
                    "Risk is the chance an outcome differs from what you expect.".into(),
                ],
            )),
        );
        store
    }

    #[test]
    fn extract_quote_prefers_first_long_enough_span() {
        let answer = r#"As the text says, "Risk is the chance an outcome differs" on this topic."#;
        assert_eq!(
            extract_quote_from_answer(answer).as_deref(),
            Some("Risk is the chance an outcome differs")
        );
    }

    #[test]
    fn extract_quote_handles_curly_quotes_and_rejects_short_ones() {
        assert_eq!(
            extract_quote_from_answer("It notes “the chance an outcome differs” here."),
            Some("the chance an outcome differs".to_string())
        );
        assert_eq!(extract_quote_from_answer(r#"Just "short" words."#), None);
        assert_eq!(extract_quote_from_answer("No quotes at all."), None);
    }

    #[test]
    fn synthesize_attaches_to_the_file_containing_the_quote() {
        let store = store_with_doc();
        let locator = Locator::new(0.82);
        let answer = r#"The document states "Risk is the chance an outcome differs"."#;
        let quotes = synthesize_citations(&store, &locator, "alice", answer);
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].file_id, "file-abc");
    }

    #[test]
    fn synthesize_returns_nothing_without_files_or_quotes() {
        let store = SessionStore::new();
        let locator = Locator::new(0.82);
        let answer = r#"The document states "Risk is the chance an outcome differs"."#;
        assert!(synthesize_citations(&store, &locator, "alice", answer).is_empty());

        let store = store_with_doc();
        assert!(synthesize_citations(&store, &locator, "alice", "No quotes.").is_empty());
    }

    #[test]
    fn format_resolves_page_and_filename() {
        let store = store_with_doc();
        let locator = Locator::new(0.82);
        let quotes = vec![FileQuote {
            file_id: "file-abc".into(),
            quote: "Risk is the chance an outcome differs".into(),
        }];
        let out = format_with_citations(&store, &locator, "alice", "The answer.", &quotes);
        assert!(out.starts_with("The answer."));
        assert!(out.contains("**Citations:**"));
        assert!(out.contains("(guide.pdf, page 2)"));
    }

    #[test]
    fn format_degrades_to_page_na_for_unlocatable_quotes() {
        let store = store_with_doc();
        let locator = Locator::new(0.82);
        let quotes = vec![FileQuote {
            file_id: "file-abc".into(),
            quote: "Diversification reduces portfolio volatility".into(),
        }];
        let out = format_with_citations(&store, &locator, "alice", "The answer.", &quotes);
        assert!(out.contains("page n/a"));
        assert!(!out.contains("page 1"));
        assert!(!out.contains("page 2"));
    }

    #[test]
    fn format_dedupes_identical_citations_and_numbers_sequentially() {
        let store = store_with_doc();
        let locator = Locator::new(0.82);
        let quote = FileQuote {
            file_id: "file-abc".into(),
            quote: "Risk is the chance an outcome differs".into(),
        };
        let other = FileQuote {
            file_id: "file-abc".into(),
            quote: "Investing means putting money to work".into(),
        };
        let out = format_with_citations(
            &store,
            &locator,
            "alice",
            "A.",
            &[quote.clone(), quote, other],
        );
        assert_eq!(out.matches("page 2").count(), 1);
        assert!(out.contains("[1]"));
        assert!(out.contains("[2]"));
        assert!(!out.contains("[3]"));
    }

    #[test]
    fn format_truncates_long_snippets() {
        let store = store_with_doc();
        let locator = Locator::new(0.82);
        let quotes = vec![FileQuote {
            file_id: "file-abc".into(),
            quote: "y".repeat(400),
        }];
        let out = format_with_citations(&store, &locator, "alice", "A.", &quotes);
        let line = out.lines().last().unwrap();
        assert!(line.contains("..."));
        assert!(line.chars().count() < 200);
    }

    #[test]
    fn format_without_quotes_returns_answer_unchanged() {
        let store = store_with_doc();
        let locator = Locator::new(0.82);
        assert_eq!(
            format_with_citations(&store, &locator, "alice", "Plain.", &[]),
            "Plain."
        );
    }

    #[test]
    fn unknown_file_id_falls_back_to_the_id_as_filename() {
        let store = SessionStore::new();
        let locator = Locator::new(0.82);
        let quotes = vec![FileQuote {
            file_id: "file-zzz".into(),
            quote: "some quoted material here".into(),
        }];
        let out = format_with_citations(&store, &locator, "alice", "A.", &quotes);
        assert!(out.contains("(file-zzz, page n/a)"));
    }
}

//! Assistants API plumbing for `/coach`: threads, file uploads, runs, and
//! file_citation annotation parsing. Retrieval and ranking stay entirely on
//! the OpenAI side; we only consume the quoted snippets it returns.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::OpenAiClient;
use crate::error::BotError;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const RUN_TIMEOUT: Duration = Duration::from_secs(90);

/// A quoted snippet the retrieval step attributed to an uploaded file.
/// No page information — that's the citation locator's job.
#[derive(Debug, Clone, PartialEq)]
pub struct FileQuote {
    pub file_id: String,
    pub quote: String,
}

/// The assistant's answer together with whatever quotes its annotations
/// carried (possibly none; the coach pipeline then falls back to quote
/// synthesis from the answer text).
#[derive(Debug, Clone)]
pub struct AssistantReply {
    pub answer: String,
    pub quotes: Vec<FileQuote>,
}

#[derive(Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Deserialize)]
struct Run {
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    text: Option<TextContent>,
}

#[derive(Deserialize)]
struct TextContent {
    value: String,
    #[serde(default)]
    annotations: Vec<Annotation>,
}

#[derive(Deserialize)]
struct Annotation {
    #[serde(rename = "type")]
    kind: String,
    file_citation: Option<FileCitation>,
}

#[derive(Deserialize)]
struct FileCitation {
    file_id: String,
    /// Dropped by some API versions; absence triggers the fallback
    /// synthesis path downstream.
    #[serde(default)]
    quote: Option<String>,
}

impl OpenAiClient {
    pub async fn create_thread(&self) -> Result<String, BotError> {
        let thread: IdObject = self
            .send_json(self.request(reqwest::Method::POST, "/threads").json(&json!({})))
            .await?;
        debug!(thread_id = %thread.id, "created assistant thread");
        Ok(thread.id)
    }

    /// Upload file bytes with purpose `assistants`, returning the file id.
    pub async fn upload_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<String, BotError> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime)
            .map_err(|e| BotError::Upload(format!("mime: {e}")))?;
        let form = Form::new().text("purpose", "assistants").part("file", part);

        let response = self
            .request(reqwest::Method::POST, "/files")
            .multipart(form)
            .send()
            .await
            .map_err(|e| BotError::Upload(format!("request: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Upload(format!("HTTP {status}: {body}")));
        }
        let file: IdObject = response
            .json()
            .await
            .map_err(|e| BotError::Upload(format!("decode: {e}")))?;
        debug!(file_id = %file.id, filename, "uploaded file to OpenAI");
        Ok(file.id)
    }

    /// Post the user's question, attaching freshly uploaded files for
    /// file_search.
    pub async fn post_user_message(
        &self,
        thread_id: &str,
        content: &str,
        file_ids: &[String],
    ) -> Result<(), BotError> {
        let content = if content.trim().is_empty() {
            "Please analyze the file(s)."
        } else {
            content
        };
        let attachments: Vec<_> = file_ids
            .iter()
            .map(|fid| json!({ "file_id": fid, "tools": [{ "type": "file_search" }] }))
            .collect();
        let mut body = json!({ "role": "user", "content": content });
        if !attachments.is_empty() {
            body["attachments"] = json!(attachments);
        }

        let _: serde_json::Value = self
            .send_json(
                self.request(
                    reqwest::Method::POST,
                    &format!("/threads/{thread_id}/messages"),
                )
                .json(&body),
            )
            .await?;
        Ok(())
    }

    /// Start a run and poll until it reaches a terminal state, then fetch
    /// the latest assistant message. Polling keeps the event loop free for
    /// other users; the token aborts the wait when the session is reset.
    pub async fn run_and_wait(
        &self,
        thread_id: &str,
        assistant_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AssistantReply, BotError> {
        let run: Run = self
            .send_json(
                self.request(reqwest::Method::POST, &format!("/threads/{thread_id}/runs"))
                    .json(&json!({ "assistant_id": assistant_id })),
            )
            .await?;
        debug!(run_id = %run.id, thread_id, "assistant run started");

        let deadline = Instant::now() + RUN_TIMEOUT;
        let status = loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(BotError::Cancelled),
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
            let polled: Run = self
                .send_json(self.request(
                    reqwest::Method::GET,
                    &format!("/threads/{thread_id}/runs/{}", run.id),
                ))
                .await?;
            match polled.status.as_str() {
                "completed" | "failed" | "requires_action" | "cancelled" | "expired" => {
                    break polled.status;
                }
                _ if Instant::now() >= deadline => {
                    warn!(run_id = %run.id, "assistant run timed out");
                    return Err(BotError::UpstreamApi("run timed out".into()));
                }
                _ => {}
            }
        };
        if status != "completed" {
            return Err(BotError::UpstreamApi(format!("run ended as {status}")));
        }

        let messages: MessageList = self
            .send_json(self.request(
                reqwest::Method::GET,
                &format!("/threads/{thread_id}/messages?order=desc&limit=1"),
            ))
            .await?;
        let Some(message) = messages.data.into_iter().next() else {
            return Err(BotError::UpstreamApi("run produced no message".into()));
        };
        Ok(parse_reply(message))
    }
}

fn parse_reply(message: ThreadMessage) -> AssistantReply {
    let mut parts = Vec::new();
    let mut quotes = Vec::new();
    for content in message.content {
        if content.kind != "text" {
            continue;
        }
        let Some(text) = content.text else { continue };
        parts.push(text.value.trim().to_string());
        for ann in text.annotations {
            if ann.kind != "file_citation" {
                continue;
            }
            let Some(fc) = ann.file_citation else { continue };
            let quote = fc.quote.unwrap_or_default().trim().to_string();
            quotes.push(FileQuote { file_id: fc.file_id, quote });
        }
    }
    let answer = parts.join("\n").trim().to_string();
    let answer = if answer.is_empty() { "No text response.".to_string() } else { answer };
    AssistantReply { answer, quotes }
}

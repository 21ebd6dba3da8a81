//! Discord REST calls: command registration, interaction responses, and
//! attachment downloads.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info};

use crate::error::BotError;

const API_BASE: &str = "https://discord.com/api/v10";

/// Discord rejects message content over 2000 characters.
const MAX_MESSAGE_CHARS: usize = 2000;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

// Interaction callback types.
const CALLBACK_MESSAGE: u8 = 4;
const CALLBACK_DEFERRED: u8 = 5;

const FLAG_EPHEMERAL: u64 = 1 << 6;

pub struct DiscordRest {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl DiscordRest {
    pub fn new(token: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, token, base_url: API_BASE.to_string() }
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("Authorization", format!("Bot {}", self.token))
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{what} failed: HTTP {status}: {body}");
        }
        Ok(response)
    }

    /// The application id of the bot's own OAuth2 application; needed for
    /// command registration and followup webhooks before READY arrives.
    pub async fn current_application_id(&self) -> Result<String> {
        let response = self
            .auth(self.http.get(format!("{}/applications/@me", self.base_url)))
            .send()
            .await
            .context("fetch current application")?;
        let response = Self::check(response, "fetch current application").await?;
        let body: serde_json::Value = response.json().await?;
        body["id"]
            .as_str()
            .map(str::to_string)
            .context("application response missing id")
    }

    /// Bulk-overwrite the global slash commands. Global propagation can take
    /// up to an hour on Discord's side; registration itself is idempotent.
    pub async fn register_commands(&self, application_id: &str) -> Result<()> {
        let commands = command_definitions();
        let url = format!("{}/applications/{application_id}/commands", self.base_url);
        let response = self
            .auth(self.http.put(&url))
            .json(&commands)
            .send()
            .await
            .context("register commands")?;
        Self::check(response, "register commands").await?;
        info!(count = commands.as_array().map_or(0, |a| a.len()), "registered slash commands");
        Ok(())
    }

    /// Immediate text reply to an interaction.
    pub async fn respond_message(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        content: &str,
        ephemeral: bool,
    ) -> Result<()> {
        let mut data = json!({ "content": truncate_message(content) });
        if ephemeral {
            data["flags"] = json!(FLAG_EPHEMERAL);
        }
        let body = json!({ "type": CALLBACK_MESSAGE, "data": data });
        let url = format!(
            "{}/interactions/{interaction_id}/{interaction_token}/callback",
            self.base_url
        );
        let response = self.auth(self.http.post(&url)).json(&body).send().await?;
        Self::check(response, "interaction response").await?;
        Ok(())
    }

    /// "Bot is thinking..." acknowledgement; buys 15 minutes to follow up.
    pub async fn respond_deferred(
        &self,
        interaction_id: &str,
        interaction_token: &str,
    ) -> Result<()> {
        let body = json!({ "type": CALLBACK_DEFERRED });
        let url = format!(
            "{}/interactions/{interaction_id}/{interaction_token}/callback",
            self.base_url
        );
        let response = self.auth(self.http.post(&url)).json(&body).send().await?;
        Self::check(response, "deferred response").await?;
        Ok(())
    }

    /// Followup message after a deferred acknowledgement.
    pub async fn followup(
        &self,
        application_id: &str,
        interaction_token: &str,
        content: &str,
    ) -> Result<()> {
        let body = json!({ "content": truncate_message(content) });
        let url = format!(
            "{}/webhooks/{application_id}/{interaction_token}",
            self.base_url
        );
        let response = self.auth(self.http.post(&url)).json(&body).send().await?;
        Self::check(response, "followup").await?;
        Ok(())
    }

    /// Fetch an attachment from the CDN, refusing payloads over `max_bytes`.
    pub async fn download(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>, BotError> {
        debug!(url, "downloading attachment");
        let response = self
            .http
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| BotError::Download(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BotError::Download(format!("HTTP {status}")));
        }
        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(BotError::FileTooLarge(response.content_length().unwrap_or(0)));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BotError::Download(e.to_string()))?;
        if bytes.len() as u64 > max_bytes {
            return Err(BotError::FileTooLarge(bytes.len() as u64));
        }
        debug!(len = bytes.len(), "attachment downloaded");
        Ok(bytes.to_vec())
    }
}

/// The bot's slash-command surface.
fn command_definitions() -> serde_json::Value {
    // Option type 3 = STRING, 11 = ATTACHMENT.
    json!([
        {
            "name": "health",
            "description": "Bot health check",
            "type": 1
        },
        {
            "name": "chat",
            "description": "Chat mode (fast Q&A)",
            "type": 1,
            "options": [
                { "name": "prompt", "description": "Your question", "type": 3, "required": true }
            ]
        },
        {
            "name": "coach",
            "description": "Coach mode (PDF/TXT + citations)",
            "type": 1,
            "options": [
                { "name": "question", "description": "Your question about the file or topic", "type": 3, "required": false },
                { "name": "file", "description": "Optional file: PDF/TXT (<=15MB)", "type": 11, "required": false }
            ]
        },
        {
            "name": "reset",
            "description": "Reset your session context",
            "type": 1,
            "options": [
                {
                    "name": "mode",
                    "description": "Which context to reset",
                    "type": 3,
                    "required": false,
                    "choices": [
                        { "name": "chat", "value": "chat" },
                        { "name": "coach", "value": "coach" },
                        { "name": "all", "value": "all" }
                    ]
                }
            ]
        }
    ])
}

/// Clip to Discord's content limit on a char boundary, with an ellipsis so
/// truncation is visible.
fn truncate_message(content: &str) -> String {
    let count = content.chars().count();
    if count <= MAX_MESSAGE_CHARS {
        return content.to_string();
    }
    let clipped: String = content.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    format!("{clipped}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_pass_through() {
        assert_eq!(truncate_message("hello"), "hello");
    }

    #[test]
    fn long_messages_are_clipped_with_ellipsis() {
        let long = "x".repeat(2500);
        let out = truncate_message(&long);
        assert_eq!(out.chars().count(), MAX_MESSAGE_CHARS);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn truncation_respects_multibyte_chars() {
        let long = "é".repeat(2100);
        let out = truncate_message(&long);
        assert_eq!(out.chars().count(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn command_definitions_cover_the_surface() {
        let defs = command_definitions();
        let names: Vec<&str> = defs
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["health", "chat", "coach", "reset"]);
    }
}

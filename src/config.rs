//! Environment-supplied configuration.
//!
//! The bot runs as a containerized background worker, so everything comes
//! from environment variables rather than a config file.

use anyhow::{Context, Result};
use std::str::FromStr;

pub const DEFAULT_CHAT_CHANNEL: &str = "chat";
pub const DEFAULT_COACH_CHANNEL: &str = "coach";
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 20;
pub const DEFAULT_MAX_FILE_MB: u64 = 15;
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.82;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub openai_api_key: String,
    /// Pre-provisioned Assistants API assistant (asst_...). Coach mode is
    /// refused with a setup hint until this is set.
    pub assistant_id: Option<String>,
    /// Channel names the commands are routed to.
    pub chat_channel: String,
    pub coach_channel: String,
    pub rate_limit_per_minute: u32,
    pub max_file_mb: u64,
    /// Minimum fuzzy similarity for a citation to be pinned to a page.
    pub match_threshold: f32,
    pub ocr_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let discord_token = std::env::var("DISCORD_BOT_TOKEN")
            .context("DISCORD_BOT_TOKEN is not set")?;
        let openai_api_key =
            std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;

        Ok(Self {
            discord_token,
            openai_api_key,
            assistant_id: std::env::var("NPF_ASSISTANT_ID").ok().filter(|s| !s.is_empty()),
            chat_channel: env_or("CHAT_CHANNEL", DEFAULT_CHAT_CHANNEL),
            coach_channel: env_or("COACH_CHANNEL", DEFAULT_COACH_CHANNEL),
            rate_limit_per_minute: env_parse(
                "RATE_LIMIT_PER_MINUTE",
                DEFAULT_RATE_LIMIT_PER_MINUTE,
            ),
            max_file_mb: env_parse("MAX_FILE_MB", DEFAULT_MAX_FILE_MB),
            match_threshold: env_parse("MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            ocr_enabled: env_parse("OCR_ENABLED", true),
        })
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb * 1024 * 1024
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|s| !s.is_empty()).unwrap_or_else(|| default.to_string())
}

/// Parse an env var, falling back to the default on absence or garbage.
/// A bad value should not take the worker down; it is logged at startup.
fn env_parse<T: FromStr + Copy + std::fmt::Debug>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(%key, %raw, ?default, "unparseable env var, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("NEXTPLAY_TEST_LIMIT", "not-a-number");
        assert_eq!(env_parse("NEXTPLAY_TEST_LIMIT", 20u32), 20);
        std::env::remove_var("NEXTPLAY_TEST_LIMIT");
    }

    #[test]
    fn env_parse_reads_valid_values() {
        std::env::set_var("NEXTPLAY_TEST_THRESHOLD", "0.9");
        assert_eq!(env_parse("NEXTPLAY_TEST_THRESHOLD", 0.82f32), 0.9);
        std::env::remove_var("NEXTPLAY_TEST_THRESHOLD");
    }

    #[test]
    fn env_or_ignores_empty_strings() {
        std::env::set_var("NEXTPLAY_TEST_CHANNEL", "");
        assert_eq!(env_or("NEXTPLAY_TEST_CHANNEL", "chat"), "chat");
        std::env::remove_var("NEXTPLAY_TEST_CHANNEL");
    }
}

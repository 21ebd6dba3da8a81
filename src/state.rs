//! Shared application state, passed by `Arc` into every handler.

use std::sync::OnceLock;

use crate::config::Config;
use crate::discord::rest::DiscordRest;
use crate::docs::ocr::OcrEngine;
use crate::docs::Locator;
use crate::openai::OpenAiClient;
use crate::ratelimit::RateLimiter;
use crate::session::SessionStore;

pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub ratelimit: RateLimiter,
    pub rest: DiscordRest,
    pub openai: OpenAiClient,
    pub locator: Locator,
    /// None when pdftoppm/tesseract are not on PATH or OCR is disabled.
    pub ocr: Option<OcrEngine>,
    application_id: OnceLock<String>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let ocr = if config.ocr_enabled { OcrEngine::detect() } else { None };
        if ocr.is_none() {
            tracing::info!("OCR fallback unavailable; image-only PDFs will be rejected");
        }
        Self {
            rest: DiscordRest::new(config.discord_token.clone()),
            openai: OpenAiClient::new(config.openai_api_key.clone()),
            locator: Locator::new(config.match_threshold),
            ratelimit: RateLimiter::new(config.rate_limit_per_minute),
            sessions: SessionStore::new(),
            ocr,
            config,
            application_id: OnceLock::new(),
        }
    }

    /// Learned from READY (or fetched over REST for --register-only).
    pub fn set_application_id(&self, id: String) {
        let _ = self.application_id.set(id);
    }

    pub fn application_id(&self) -> Option<&str> {
        self.application_id.get().map(String::as_str)
    }
}

//! OpenAI client: chat completions for `/chat`, Assistants API with
//! file_search for `/coach`.

pub mod assistant;
pub mod chat;

use std::time::Duration;

use crate::error::BotError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, api_key, base_url: DEFAULT_BASE_URL.to_string() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.api_key)
            // Threads/runs/messages live behind the Assistants v2 beta flag.
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// Send, check status, and decode the JSON body, surfacing non-success
    /// responses as [`BotError::UpstreamApi`] with the body for the logs.
    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, BotError> {
        let response = builder
            .send()
            .await
            .map_err(|e| BotError::UpstreamApi(format!("request: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::UpstreamApi(format!("HTTP {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| BotError::UpstreamApi(format!("decode: {e}")))
    }
}

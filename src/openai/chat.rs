//! Fast Q&A over chat completions for `/chat`.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::OpenAiClient;
use crate::error::BotError;

const CHAT_MODEL: &str = "gpt-4o-mini";
const CHAT_TEMPERATURE: f32 = 0.4;
const CHAT_MAX_TOKENS: u32 = 400;

/// Education-only guardrails. The disclaimer is enforced in the prompt so
/// every answer carries it; compliance requires non-prescriptive wording.
const SYSTEM_PROMPT: &str = "You are NextPlay Chat, a concise finance education-only chatbot for Discord. \
Your role is to provide short, clear, and non-prescriptive answers. \
Do not give allocations (percentages), buy/sell instructions, or product recommendations. \
Instead, explain concepts in general terms using phrases like 'Some investors...' or 'Historically, people have...'. \
Always append this disclaimer at the end of your answer: \
'*This information is for educational purposes only and not financial advice. Please consult a licensed financial professional before making any investment decisions.*'";

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    /// One stateless completion; the `user` field is passed through for
    /// OpenAI-side abuse attribution.
    pub async fn chat_fast(&self, prompt: &str, user_id: &str) -> Result<String, BotError> {
        let body = json!({
            "model": CHAT_MODEL,
            "temperature": CHAT_TEMPERATURE,
            "max_tokens": CHAT_MAX_TOKENS,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "user": user_id,
        });

        debug!(user_id, prompt_len = prompt.len(), "chat completion request");
        let resp: ChatResponse = self
            .send_json(self.request(reqwest::Method::POST, "/chat/completions").json(&body))
            .await?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BotError::UpstreamApi("empty chat completion".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_parses_expected_shape() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": " Risk means... " } }
            ]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some(" Risk means... ")
        );
    }

    #[test]
    fn system_prompt_carries_the_disclaimer() {
        assert!(SYSTEM_PROMPT.contains("educational purposes only"));
        assert!(SYSTEM_PROMPT.contains("not financial advice"));
    }
}

//! Thin adapter over an OpenAI-compatible `/chat/completions` endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ShellError, ShellResult};
use crate::llm::config::TierConfig;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: LlmUsage,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enable_thinking: Option<bool>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatApiError {
    message: String,
}

#[derive(Deserialize, Default)]
struct ChatResponseWire {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: LlmUsage,
    #[serde(default)]
    error: Option<ChatApiError>,
}

/// A chat call against a single resolved tier's endpoint.
pub struct Chat {
    client: reqwest::Client,
    config: TierConfig,
}

impl Chat {
    pub fn new(config: TierConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .expect("reqwest client builder"),
            config,
        }
    }

    pub fn with_client(config: TierConfig, client: reqwest::Client) -> Self {
        Self { client, config }
    }

    /// Sends a two-message conversation (system, user) and returns the sanitized-free
    /// raw content plus usage. Callers apply `strip_think_blocks`/`strip_fences` as
    /// appropriate for their own parse target.
    pub async fn chat(&self, system: &str, user: &str) -> ShellResult<ChatResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            enable_thinking: self.config.enable_thinking.then_some(true),
        };

        debug!(
            tier_model = %self.config.model,
            base_url = %self.config.base_url,
            enable_thinking = self.config.enable_thinking,
            "llm.chat"
        );
        trace!(%user, "llm.chat.request");

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ShellError::Gateway(format!("transport error: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ShellError::Gateway(format!("http {status}: {text}")));
        }

        let wire: ChatResponseWire = res
            .json()
            .await
            .map_err(|e| ShellError::Gateway(format!("decode error: {e}")))?;

        if let Some(err) = wire.error {
            return Err(ShellError::Gateway(format!("api error: {}", err.message)));
        }

        let content = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ShellError::Gateway("empty choices".to_string()))?
            .message
            .content;

        trace!(%content, "llm.chat.response");

        Ok(ChatResponse { content, usage: wire.usage })
    }
}

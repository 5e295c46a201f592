//! OpenAI Chat Completions client (or any server exposing the same API).

use crate::llm::{ChatMessage, CompletionBackend, CompletionParams, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for POST /chat/completions with bearer auth.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// POST /chat/completions — non-streaming. Returns the first choice's content, untrimmed.
    pub async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        params: CompletionParams,
    ) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = OpenAiChatRequest {
            model: model.to_string(),
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        let data: OpenAiChatResponse = res.json().await?;
        first_choice_content(data)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        params: CompletionParams,
    ) -> Result<String, LlmError> {
        self.chat(model, messages, params).await
    }
}

// --- wire types ---

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Option<Vec<OpenAiChoice>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

fn first_choice_content(data: OpenAiChatResponse) -> Result<String, LlmError> {
    let message = data
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message)
        .ok_or(LlmError::EmptyResponse)?;
    Ok(message.content.unwrap_or_default())
}

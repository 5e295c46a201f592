//! Completion API abstraction and OpenAI client.
//!
//! The bot only needs one non-streaming completion per message; `CompletionBackend` is the seam
//! between the bot and the HTTP client.

mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::{OpenAiClient, DEFAULT_BASE_URL};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion api error: {0}")]
    Api(String),
    #[error("completion api returned no choices")]
    EmptyResponse,
}

/// One chat message sent to the completion API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling parameters for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

/// A completion API that turns a message list into the assistant's text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        params: CompletionParams,
    ) -> Result<String, LlmError>;
}

//! Bot turn: filter the message, ask the completion API in persona, post-process the answer.
//! Stateless: every message is answered on its own, with only the persona prompt as context.

use crate::config::{Config, PersonaConfig, Secrets};
use crate::llm::{ChatMessage, CompletionBackend, CompletionParams, OpenAiClient};
use crate::policy::{finalize_reply, TopicFilter};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// What the bot sends back for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Message was outside the persona's topic; canned reply, no API call.
    OffTopic(String),
    /// Post-processed answer from the completion API.
    Answer(String),
    /// Canned reply after an API failure, an empty answer, or an empty message.
    Fallback(String),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::OffTopic(t) | Reply::Answer(t) | Reply::Fallback(t) => t,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Reply::OffTopic(_) => "off-topic",
            Reply::Answer(_) => "answer",
            Reply::Fallback(_) => "fallback",
        }
    }
}

pub struct Bot {
    backend: Arc<dyn CompletionBackend>,
    persona: PersonaConfig,
    filter: TopicFilter,
    model: String,
    params: CompletionParams,
}

impl Bot {
    /// The reply limit is at least one character; canned replies are held to it as well.
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        mut persona: PersonaConfig,
        model: impl Into<String>,
        params: CompletionParams,
    ) -> Self {
        let defaults = PersonaConfig::default();
        persona.max_reply_chars = persona.max_reply_chars.max(1);
        persona.off_topic_reply = canned_reply(
            &persona.off_topic_reply,
            &defaults.off_topic_reply,
            persona.max_reply_chars,
        );
        persona.error_reply = canned_reply(
            &persona.error_reply,
            &defaults.error_reply,
            persona.max_reply_chars,
        );
        let filter = TopicFilter::new(&persona.keywords);
        Self {
            backend,
            persona,
            filter,
            model: model.into(),
            params,
        }
    }

    /// Build a bot talking to the configured OpenAI-compatible API. Fails when no API key is set.
    pub fn from_config(config: &Config, secrets: &Secrets) -> Result<Self> {
        let Some(api_key) = secrets.openai_api_key.clone() else {
            anyhow::bail!("completion API key not configured (set OPENAI_API_KEY or llm.apiKey)");
        };
        let client = OpenAiClient::new(
            api_key,
            config.llm.base_url.clone(),
            Duration::from_secs(config.llm.timeout_secs),
        );
        let params = CompletionParams {
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
        };
        Ok(Self::new(
            Arc::new(client),
            config.persona.clone(),
            config.llm.model.clone(),
            params,
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Answer one user message. Never fails: errors become the persona's fallback reply.
    pub async fn respond(&self, text: &str) -> Reply {
        let text = text.trim();
        if text.is_empty() {
            return Reply::Fallback(self.persona.off_topic_reply.clone());
        }
        if !self.filter.is_on_topic(text) {
            log::debug!("bot: message is off-topic, sending canned reply");
            return Reply::OffTopic(self.persona.off_topic_reply.clone());
        }

        let messages = vec![
            ChatMessage::system(self.persona.system_prompt.clone()),
            ChatMessage::user(text),
        ];
        log::info!("bot: asking {} ({} chars)", self.model, text.chars().count());
        let raw = match self.backend.complete(&self.model, messages, self.params).await {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("bot: completion failed: {}", e);
                return Reply::Fallback(self.persona.error_reply.clone());
            }
        };
        match finalize_reply(&raw, self.persona.max_reply_chars) {
            Some(answer) => Reply::Answer(answer),
            None => {
                log::warn!("bot: completion returned an empty answer");
                Reply::Fallback(self.persona.error_reply.clone())
            }
        }
    }
}

/// Configured canned text, cut to the reply limit; a blank one falls back to the built-in text.
fn canned_reply(configured: &str, default: &str, max_chars: usize) -> String {
    finalize_reply(configured, max_chars)
        .or_else(|| finalize_reply(default, max_chars))
        .unwrap_or_default()
}

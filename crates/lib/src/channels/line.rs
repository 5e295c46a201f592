//! LINE channel: webhook payloads, signature verification, and the reply API.

use crate::channels::inbound::{InboundMessage, ReplyChannel};
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

const LINE_API_BASE: &str = "https://api.line.me";

/// Header carrying base64(HMAC-SHA256(channel secret, raw body)).
pub const SIGNATURE_HEADER: &str = "X-Line-Signature";

type HmacSha256 = Hmac<Sha256>;

/// Check the `X-Line-Signature` header against the raw request body. Comparison is constant-time.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Webhook POST body: `{ "destination": "...", "events": [...] }`.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

/// One webhook event. Only the fields the bot needs are parsed; the rest is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub message: Option<EventMessage>,
    #[serde(default)]
    pub webhook_event_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl EventSource {
    /// Group or room id when the message came from one, else the user id.
    fn conversation_id(&self) -> String {
        self.group_id
            .as_ref()
            .or(self.room_id.as_ref())
            .or(self.user_id.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

impl WebhookEvent {
    /// Inbound message for text message events that carry a reply token; None for everything else
    /// (follow, stickers, images, postbacks, ...).
    pub fn to_inbound(&self) -> Option<InboundMessage> {
        if self.typ != "message" {
            return None;
        }
        let message = self.message.as_ref()?;
        if message.typ != "text" {
            return None;
        }
        let text = message.text.as_ref()?;
        let reply_token = self.reply_token.as_ref()?;
        Some(InboundMessage {
            channel_id: "line".to_string(),
            reply_token: reply_token.clone(),
            conversation_id: self
                .source
                .as_ref()
                .map(EventSource::conversation_id)
                .unwrap_or_default(),
            text: text.clone(),
        })
    }
}

/// LINE Messaging API client used for replies and webhook registration.
pub struct LineChannel {
    id: String,
    access_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl LineChannel {
    pub fn new(access_token: String, api_base: Option<String>) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| LINE_API_BASE.to_string());
        Self {
            id: "line".to_string(),
            access_token,
            api_base,
            client: reqwest::Client::new(),
        }
    }

    /// POST /v2/bot/message/reply — answer an event with one text message.
    pub async fn reply_message(&self, reply_token: &str, text: &str) -> Result<(), String> {
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        let body = serde_json::json!({
            "replyToken": reply_token,
            "messages": [{ "type": "text", "text": text }],
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("reply failed: {} {}", status, body));
        }
        Ok(())
    }

    /// PUT /v2/bot/channel/webhook/endpoint — point the channel's webhook at this server.
    pub async fn set_webhook_endpoint(&self, endpoint: &str) -> Result<(), String> {
        let url = format!("{}/v2/bot/channel/webhook/endpoint", self.api_base);
        let body = serde_json::json!({ "endpoint": endpoint });
        let res = self
            .client
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("set webhook endpoint failed: {} {}", status, body));
        }
        Ok(())
    }
}

#[async_trait]
impl ReplyChannel for LineChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), String> {
        self.reply_message(reply_token, text).await
    }
}

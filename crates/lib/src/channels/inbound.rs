//! Inbound message from a channel and the handle used to answer it.

use async_trait::async_trait;

/// A text message from a channel, to be answered by the bot.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel_id: String,
    /// Single-use token the answer must be sent with.
    pub reply_token: String,
    /// User, group or room the message came from (for logs only).
    pub conversation_id: String,
    pub text: String,
}

/// Handle to a channel that can answer an inbound message.
#[async_trait]
pub trait ReplyChannel: Send + Sync {
    /// Channel id (e.g. "line").
    fn id(&self) -> &str;
    /// Send one text reply using the message's reply token.
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), String>;
}

//! Communication channels (LINE).
//!
//! Webhook payload parsing, signature verification and the reply API. Inbound messages
//! are handed to the gateway's processor; replies go back through a `ReplyChannel`.

mod inbound;
mod line;

pub use inbound::{InboundMessage, ReplyChannel};
pub use line::{
    verify_signature, EventMessage, EventSource, LineChannel, WebhookBody, WebhookEvent,
    SIGNATURE_HEADER,
};

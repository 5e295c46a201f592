//! Gateway: webhook HTTP server.
//!
//! Single port serves the LINE webhook and a health check. Webhook requests are verified and
//! acknowledged immediately; answers are produced by a processor task and sent via the reply API.

mod server;

pub use server::{run_gateway, run_gateway_with_secrets, GatewayState};

//! Webhook HTTP server: LINE POSTs events here, replies go out through the reply API.

use crate::bot::Bot;
use crate::channels::{
    verify_signature, InboundMessage, LineChannel, ReplyChannel, WebhookBody, SIGNATURE_HEADER,
};
use crate::config::{self, Config, Secrets};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

const INBOUND_QUEUE_CAPACITY: usize = 64;

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Resolved channel secret; every webhook body must be signed with it.
    pub channel_secret: Arc<str>,
    /// Sender for inbound messages. Processor task receives.
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    pub model: String,
}

/// Answer one inbound message and send the reply back on its channel.
async fn process_inbound_message(bot: Arc<Bot>, channel: Arc<dyn ReplyChannel>, msg: InboundMessage) {
    let reply = bot.respond(&msg.text).await;
    log::info!(
        "inbound: {} reply for {} conversation {}",
        reply.kind(),
        msg.channel_id,
        msg.conversation_id
    );
    if let Err(e) = channel.reply(&msg.reply_token, reply.text()).await {
        log::warn!("inbound: {} reply failed: {}", channel.id(), e);
    }
}

/// Receive inbound messages until every sender is gone; each message runs in its own task
/// because reply tokens expire and one slow completion must not hold up the rest.
/// Waits for in-flight replies before returning.
async fn run_processor(
    bot: Arc<Bot>,
    channel: Arc<dyn ReplyChannel>,
    mut inbound_rx: mpsc::Receiver<InboundMessage>,
) {
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            msg = inbound_rx.recv() => {
                let Some(msg) = msg else { break };
                in_flight.spawn(process_inbound_message(bot.clone(), channel.clone(), msg));
            }
            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = done {
                    log::warn!("inbound: reply task failed: {}", e);
                }
            }
        }
    }
    if !in_flight.is_empty() {
        log::info!("waiting for {} in-flight reply task(s)", in_flight.len());
    }
    while let Some(done) = in_flight.join_next().await {
        if let Err(e) = done {
            log::warn!("inbound: reply task failed: {}", e);
        }
    }
}

/// Run the webhook server with secrets taken from the process environment, then the config.
pub async fn run_gateway(config: Config) -> Result<()> {
    let secrets = Secrets::from_env(&config);
    run_gateway_with_secrets(config, secrets).await
}

/// Run the webhook server; binds to config.gateway.bind:config.gateway.port.
/// Refuses to start without a channel secret (webhooks could not be verified), a channel
/// access token (replies could not be sent), a completion API key, or a literal webhook path.
/// Blocks until shutdown (e.g. Ctrl+C), then finishes replies already in progress.
pub async fn run_gateway_with_secrets(config: Config, secrets: Secrets) -> Result<()> {
    let webhook_path = webhook_route(&config.gateway.webhook_path)?;
    let Some(channel_secret) = secrets.line_channel_secret.clone() else {
        anyhow::bail!(
            "refusing to start without a LINE channel secret (set LINE_CHANNEL_SECRET or channels.line.channelSecret)"
        );
    };
    let Some(access_token) = secrets.line_access_token.clone() else {
        anyhow::bail!(
            "LINE channel access token not configured (set LINE_CHANNEL_ACCESS_TOKEN or channels.line.channelAccessToken)"
        );
    };
    let bot = Arc::new(Bot::from_config(&config, &secrets)?);
    let line = Arc::new(LineChannel::new(
        access_token,
        config.channels.line.api_base_url.clone(),
    ));

    let bind = config.gateway.bind.trim().to_string();
    if config::is_loopback_bind(&bind) {
        log::warn!(
            "gateway bound to loopback {}; LINE can only reach it through a tunnel or reverse proxy",
            bind
        );
    }

    if let Some(ref url) = config.channels.line.webhook_url {
        match line.set_webhook_endpoint(url).await {
            Ok(()) => log::info!("line webhook endpoint set to {}", url),
            Err(e) => log::warn!("line set webhook endpoint failed: {}", e),
        }
    }

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_QUEUE_CAPACITY);
    let processor = tokio::spawn(run_processor(bot.clone(), line, inbound_rx));

    let state = GatewayState {
        config: Arc::new(config.clone()),
        channel_secret: Arc::from(channel_secret),
        inbound_tx,
        model: bot.model().to_string(),
    };
    let app = Router::new()
        .route("/", get(health_http))
        .route(&webhook_path, post(line_webhook))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {} (webhook {})", bind_addr, webhook_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;

    // The router (and with it the last inbound sender) is gone; the processor drains and exits.
    if let Err(e) = processor.await {
        log::warn!("inbound processor failed: {}", e);
    }
    log::info!("gateway stopped");
    Ok(())
}

/// Leading slash, no trailing slash ("callback/" -> "/callback").
fn normalize_webhook_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{}", trimmed)
}

/// Normalized webhook path, refused when the router would read it as a capture or wildcard.
fn webhook_route(path: &str) -> Result<String> {
    let path = normalize_webhook_path(path);
    if let Some(c) = path.chars().find(|c| matches!(c, ':' | '*' | '{' | '}')) {
        anyhow::bail!(
            "invalid gateway.webhookPath {:?}: '{}' is not allowed, use a literal path such as /callback",
            path,
            c
        );
    }
    Ok(path)
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// POST {webhookPath}: verifies X-Line-Signature, queues text messages, answers 200 at once.
/// A closed queue answers 503 before anything is queued, so LINE's redelivery is not answered twice.
async fn line_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        log::debug!("webhook: missing {} header", SIGNATURE_HEADER);
        return (StatusCode::BAD_REQUEST, "missing signature");
    };
    if !verify_signature(&state.channel_secret, &body, signature) {
        log::warn!("webhook: invalid signature, rejecting request");
        return (StatusCode::BAD_REQUEST, "invalid signature");
    }
    let payload: WebhookBody = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            log::debug!("webhook: unparseable body: {}", e);
            return (StatusCode::BAD_REQUEST, "invalid body");
        }
    };
    if payload.events.is_empty() {
        log::debug!("webhook: no events (verification request)");
    }
    let inbound: Vec<InboundMessage> = payload.events.iter().filter_map(|e| e.to_inbound()).collect();
    if !inbound.is_empty() && state.inbound_tx.is_closed() {
        log::warn!("webhook: inbound queue closed, rejecting {} message(s)", inbound.len());
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down");
    }
    for msg in inbound {
        if state.inbound_tx.send(msg).await.is_err() {
            return (StatusCode::SERVICE_UNAVAILABLE, "shutting down");
        }
    }
    (StatusCode::OK, "OK")
}

/// GET / returns a simple health JSON (for uptime checks).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "webhookPath": normalize_webhook_path(&state.config.gateway.webhook_path),
        "model": state.model,
    }))
}

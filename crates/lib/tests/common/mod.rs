//! Shared helpers: stub LINE + completion API server and a gateway launcher.

#![allow(dead_code)]

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{post, put},
    Json, Router,
};
use base64::Engine;
use hmac::{Hmac, Mac};
use lib::config::{Config, Secrets};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const CHANNEL_SECRET: &str = "test-channel-secret";
pub const ACCESS_TOKEN: &str = "test-access-token";
pub const API_KEY: &str = "sk-test";

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

pub fn sign(body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(CHANNEL_SECRET.as_bytes()).expect("hmac key");
    mac.update(body.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Requests seen by the stub, plus the answer it gives to completions.
#[derive(Clone)]
pub struct Stub {
    pub base_url: String,
    pub completions: Arc<Mutex<Vec<Value>>>,
    pub replies: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    pub webhook_endpoints: Arc<Mutex<Vec<Value>>>,
    answer: Arc<String>,
}

async fn stub_completion(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    stub.completions.lock().await.push(body);
    Json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": stub.answer.as_str() },
            "finish_reason": "stop"
        }]
    }))
}

async fn stub_reply(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    stub.replies.lock().await.push((auth, body));
    Json(json!({}))
}

async fn stub_webhook_endpoint(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    stub.webhook_endpoints.lock().await.push(body);
    Json(json!({}))
}

/// Serve LINE's reply API and the completion API on one ephemeral port.
pub async fn start_stub(answer: &str) -> Stub {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    let stub = Stub {
        base_url: format!("http://{}", addr),
        completions: Arc::new(Mutex::new(Vec::new())),
        replies: Arc::new(Mutex::new(Vec::new())),
        webhook_endpoints: Arc::new(Mutex::new(Vec::new())),
        answer: Arc::new(answer.to_string()),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(stub_completion))
        .route("/v2/bot/message/reply", post(stub_reply))
        .route("/v2/bot/channel/webhook/endpoint", put(stub_webhook_endpoint))
        .with_state(stub.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    stub
}

/// Config pointing both external APIs at the stub, with every secret set.
pub fn config_for(stub: &Stub, port: u16) -> Config {
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.channels.line.channel_secret = Some(CHANNEL_SECRET.to_string());
    config.channels.line.channel_access_token = Some(ACCESS_TOKEN.to_string());
    config.channels.line.api_base_url = Some(stub.base_url.clone());
    config.llm.api_key = Some(API_KEY.to_string());
    config.llm.base_url = Some(format!("{}/v1", stub.base_url));
    config.llm.timeout_secs = 5;
    config
}

/// Secrets from the config alone, so the developer's environment never leaks into a test.
pub fn config_secrets(config: &Config) -> Secrets {
    Secrets::resolve_with(config, |_| None)
}

/// Run the gateway with `config_secrets`, returning once it fails or stops.
pub async fn run_gateway(config: Config) -> anyhow::Result<()> {
    let secrets = config_secrets(&config);
    lib::gateway::run_gateway_with_secrets(config, secrets).await
}

/// Spawn the gateway and wait until GET / answers. Returns the health JSON.
pub async fn start_gateway(config: Config) -> Value {
    let url = format!("http://127.0.0.1:{}/", config.gateway.port);
    tokio::spawn(async move {
        if let Err(e) = run_gateway(config).await {
            panic!("gateway failed: {:#}", e);
        }
    });
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                return resp.json().await.expect("parse health JSON");
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "GET {} did not return 200 within 5s; last error: {:?}",
        url, last_err
    );
}

/// Poll until the stub has seen `n` replies (or 5s pass).
pub async fn wait_for_replies(stub: &Stub, n: usize) -> Vec<(Option<String>, Value)> {
    for _ in 0..100 {
        {
            let replies = stub.replies.lock().await;
            if replies.len() >= n {
                return replies.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    stub.replies.lock().await.clone()
}

/// Webhook body with one text message event per (reply token, text).
pub fn text_events(messages: &[(&str, &str)]) -> String {
    let events: Vec<Value> = messages
        .iter()
        .enumerate()
        .map(|(i, (token, text))| {
            json!({
                "type": "message",
                "mode": "active",
                "timestamp": 1700000000000u64 + i as u64,
                "webhookEventId": format!("01TESTEVENT{}", i),
                "deliveryContext": { "isRedelivery": false },
                "replyToken": token,
                "source": { "type": "user", "userId": format!("Utest{}", i) },
                "message": { "id": format!("{}", 1000 + i), "type": "text", "text": text }
            })
        })
        .collect();
    json!({ "destination": "Ubot", "events": events }).to_string()
}

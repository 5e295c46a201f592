//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.nutribot/config.json`), `.env` files, and environment.
//! Secrets (LINE tokens, completion API key) may live in either; the environment wins.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Webhook server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (LINE).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Completion API settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Persona prompt, topic keywords and canned replies.
    #[serde(default)]
    pub persona: PersonaConfig,
}

/// Webhook server bind, port and path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 10000).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; LINE must be able to reach it).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Path LINE POSTs webhook events to (default "/callback").
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

fn default_gateway_port() -> u16 {
    10000
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_webhook_path() -> String {
    "/callback".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            webhook_path: default_webhook_path(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub line: LineChannelConfig,
}

/// LINE Messaging API channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineChannelConfig {
    /// Long-lived channel access token. Overridden by LINE_CHANNEL_ACCESS_TOKEN env when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_access_token: Option<String>,
    /// Channel secret used to verify X-Line-Signature. Overridden by LINE_CHANNEL_SECRET env when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_secret: Option<String>,
    /// Messaging API base URL (default https://api.line.me).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// When set, registered as the channel's webhook endpoint at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// Completion API settings (OpenAI Chat Completions or a compatible server).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// API key. Overridden by OPENAI_API_KEY env when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL including the version segment (default https://api.openai.com/v1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Upper bound on generated tokens per reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature. Omitted from the request when null.
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    300
}

fn default_temperature() -> Option<f32> {
    Some(0.7)
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Who the bot is and what it is willing to talk about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaConfig {
    /// System prompt sent before every user message.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// A message must contain at least one keyword to reach the completion API. Empty list admits everything.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    /// Sent when a message contains none of the keywords.
    #[serde(default = "default_off_topic_reply")]
    pub off_topic_reply: String,
    /// Sent when the completion API fails or returns nothing.
    #[serde(default = "default_error_reply")]
    pub error_reply: String,
    /// Replies longer than this many characters are truncated (LINE caps text messages at 5000).
    /// Applies to the canned replies too; 0 is treated as 1.
    #[serde(default = "default_max_reply_chars")]
    pub max_reply_chars: usize,
}

fn default_system_prompt() -> String {
    "你是一位口語化、親切有同理心的營養師，請以台灣人熟悉的口吻回覆".to_string()
}

fn default_keywords() -> Vec<String> {
    ["吃", "熱量", "體重", "營養", "脂肪", "蛋白質", "便秘", "健康", "減肥"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_off_topic_reply() -> String {
    "我是營養專屬小幫手～只回答營養相關的問題唷！".to_string()
}

fn default_error_reply() -> String {
    "小幫手現在有點忙不過來，請稍後再問我一次喔！".to_string()
}

fn default_max_reply_chars() -> usize {
    5000
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            keywords: default_keywords(),
            off_topic_reply: default_off_topic_reply(),
            error_reply: default_error_reply(),
            max_reply_chars: default_max_reply_chars(),
        }
    }
}

/// Env value wins over config value; blank strings count as unset on both sides.
fn env_or_config(env_value: Option<String>, config_value: Option<&String>) -> Option<String> {
    env_value
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config_value
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Secrets resolved once at startup; each env variable overrides its config field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    /// LINE_CHANNEL_ACCESS_TOKEN or channels.line.channelAccessToken.
    pub line_access_token: Option<String>,
    /// LINE_CHANNEL_SECRET or channels.line.channelSecret.
    pub line_channel_secret: Option<String>,
    /// OPENAI_API_KEY or llm.apiKey.
    pub openai_api_key: Option<String>,
}

impl Secrets {
    /// Resolve against the process environment.
    pub fn from_env(config: &Config) -> Self {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    /// Resolve with an explicit variable lookup; `|_| None` reads the config alone.
    pub fn resolve_with(config: &Config, env: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            line_access_token: env_or_config(
                env("LINE_CHANNEL_ACCESS_TOKEN"),
                config.channels.line.channel_access_token.as_ref(),
            ),
            line_channel_secret: env_or_config(
                env("LINE_CHANNEL_SECRET"),
                config.channels.line.channel_secret.as_ref(),
            ),
            openai_api_key: env_or_config(env("OPENAI_API_KEY"), config.llm.api_key.as_ref()),
        }
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("NUTRIBOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".nutribot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Directory holding the config file (and its `.env`).
pub fn config_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Load `.env` from the working directory, then from the config directory, and return the
/// config path to use (explicit path, else NUTRIBOT_CONFIG_PATH, which a `.env` may set, else default).
/// Variables already set in the process environment are never overridden.
pub fn load_env_files(config_path: Option<PathBuf>) -> PathBuf {
    match dotenv::dotenv() {
        Ok(path) => log::debug!("loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => log::warn!("ignoring .env in working directory: {}", e),
    }
    let config_path = config_path.unwrap_or_else(default_config_path);
    let env_path = config_dir(&config_path).join(".env");
    if env_path.exists() {
        match dotenv::from_path(&env_path) {
            Ok(()) => log::debug!("loaded environment from {}", env_path.display()),
            Err(e) => log::warn!("ignoring {}: {}", env_path.display(), e),
        }
    }
    config_path
}

/// Load config from the given path (or NUTRIBOT_CONFIG_PATH / default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_bind_and_path() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 10000);
        assert_eq!(g.bind, "0.0.0.0");
        assert_eq!(g.webhook_path, "/callback");
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.max_tokens, 300);
        assert_eq!(config.llm.temperature, Some(0.7));
        assert_eq!(config.persona.keywords.len(), 9);
        assert!(config.persona.keywords.iter().any(|k| k == "營養"));
        assert_eq!(config.persona.max_reply_chars, 5000);
    }

    #[test]
    fn camel_case_keys_are_read() {
        let config: Config = serde_json::from_str(
            r#"{
                "gateway": { "port": 8080, "webhookPath": "/line" },
                "channels": { "line": { "channelSecret": "s3cret", "apiBaseUrl": "http://127.0.0.1:9" } },
                "llm": { "maxTokens": 150, "temperature": null },
                "persona": { "keywords": [], "maxReplyChars": 10 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.bind, "0.0.0.0");
        assert_eq!(config.gateway.webhook_path, "/line");
        assert_eq!(config.channels.line.channel_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.llm.max_tokens, 150);
        assert_eq!(config.llm.temperature, None);
        assert!(config.persona.keywords.is_empty());
        assert_eq!(config.persona.max_reply_chars, 10);
    }

    #[test]
    fn secrets_are_not_serialized_when_unset() {
        let s = serde_json::to_string(&Config::default()).unwrap();
        assert!(!s.contains("channelSecret"));
        assert!(!s.contains("apiKey"));
    }

    #[test]
    fn env_value_overrides_config_value() {
        let from_file = "file-token".to_string();
        assert_eq!(
            env_or_config(Some(" env-token ".to_string()), Some(&from_file)),
            Some("env-token".to_string())
        );
        assert_eq!(
            env_or_config(Some("   ".to_string()), Some(&from_file)),
            Some("file-token".to_string())
        );
        assert_eq!(env_or_config(None, Some(&"".to_string())), None);
        assert_eq!(env_or_config(None, None), None);
    }

    #[test]
    fn load_config_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("nutribot-does-not-exist").join("config.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.gateway.port, 10000);
    }

    #[test]
    fn config_dir_of_bare_file_is_cwd() {
        assert_eq!(config_dir(Path::new("config.json")), Path::new("."));
        assert_eq!(
            config_dir(Path::new("/home/user/.nutribot/config.json")),
            Path::new("/home/user/.nutribot")
        );
    }

    #[test]
    fn secrets_prefer_lookup_over_config() {
        let mut config = Config::default();
        config.channels.line.channel_secret = Some("file-secret".into());
        config.channels.line.channel_access_token = Some("file-token".into());
        config.llm.api_key = Some("  ".into());

        let secrets = Secrets::resolve_with(&config, |name| match name {
            "LINE_CHANNEL_SECRET" => Some("env-secret".into()),
            _ => None,
        });
        assert_eq!(secrets.line_channel_secret.as_deref(), Some("env-secret"));
        assert_eq!(secrets.line_access_token.as_deref(), Some("file-token"));
        assert_eq!(secrets.openai_api_key, None);

        let config_only = Secrets::resolve_with(&config, |_| None);
        assert_eq!(config_only.line_channel_secret.as_deref(), Some("file-secret"));
    }

    #[test]
    fn env_files_never_replace_process_variables() {
        let tag = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        let preset = format!("NUTRIBOT_TEST_PRESET_{}", tag);
        let fresh = format!("NUTRIBOT_TEST_FRESH_{}", tag);
        let dir = std::env::temp_dir().join(format!("nutribot-env-{}", tag));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(".env"),
            format!("{}=from_file\n{}=from_file\n", preset, fresh),
        )
        .unwrap();
        std::env::set_var(&preset, "from_env");

        let config_path = dir.join("config.json");
        let used = load_env_files(Some(config_path.clone()));

        assert_eq!(used, config_path);
        assert_eq!(std::env::var(&preset).unwrap(), "from_env");
        assert_eq!(std::env::var(&fresh).unwrap(), "from_file");
        std::env::remove_var(&preset);
        std::env::remove_var(&fresh);
        let _ = std::fs::remove_dir_all(&dir);
    }
}

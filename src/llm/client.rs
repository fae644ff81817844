// src/llm/client.rs

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Transport-level failures are retried this many times with exponential
/// backoff before surfacing as a completion-service error.
const COMPLETION_RETRIES: u32 = 3;

/// One role-tagged turn of a session conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Clone)]
pub struct LlmClient {
    cfg: ProviderConfig,
}

impl LlmClient {
    pub fn from_saved() -> Self {
        let cfg = load_config().unwrap_or_else(default_config);
        Self { cfg }
    }

    pub fn configure(
        provider_name: &str,
        model: String,
        api_key: String,
        base_url: Option<String>,
    ) -> Result<()> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("API key cannot be empty".into()));
        }

        let provider = match provider_name {
            "openai" => Provider::OpenAI,
            "anthropic" => Provider::Anthropic,
            other => return Err(Error::Config(format!("unknown provider: {other}"))),
        };

        let cfg = ProviderConfig {
            provider,
            model,
            api_key,
            base_url,
            timeout_secs: default_timeout_secs(),
        };

        save_config(&cfg).map_err(|e| Error::Config(e.to_string()))
    }

    /// One completion over the full conversation.
    pub fn complete(&self, turns: &[ChatTurn]) -> Result<String> {
        let hash = hash_turns(turns);
        tracing::debug!(conversation = %hash, turns = turns.len(), "requesting completion");

        let mut delay = Duration::from_secs(1);
        let mut last_err = String::new();

        for attempt in 0..COMPLETION_RETRIES {
            if attempt > 0 {
                thread::sleep(delay);
                delay *= 2;
            }

            match self.request(turns) {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "completion attempt failed");
                    last_err = e;
                }
            }
        }

        Err(Error::CompletionService(last_err))
    }

    fn request(&self, turns: &[ChatTurn]) -> std::result::Result<String, String> {
        let cfg = &self.cfg;
        let (url, headers, body) = build_request(cfg, turns);

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| e.to_string())?;

        let mut req = client.post(url).json(&body);
        for (k, v) in headers {
            req = req.header(k, v);
        }

        let resp = req.send().map_err(|e| e.to_string())?;
        let status = resp.status();
        let json: Value = resp.json().map_err(|e| e.to_string())?;

        if !status.is_success() {
            return Err(format!("completion error {}: {}", status, json));
        }

        extract_text(&cfg.provider, &json)
    }
}

/// Sha256 over the ordered turns; logged per call so a misbehaving
/// conversation can be matched against a replay.
fn hash_turns(turns: &[ChatTurn]) -> String {
    let mut h = Sha256::new();
    for turn in turns {
        let tag: u8 = match turn.role {
            Role::System => 0,
            Role::User => 1,
            Role::Assistant => 2,
        };
        h.update([tag]);
        h.update(turn.content.as_bytes());
    }
    hex::encode(h.finalize())
}

fn build_request(
    cfg: &ProviderConfig,
    turns: &[ChatTurn],
) -> (String, Vec<(&'static str, String)>, Value) {
    match cfg.provider {
        Provider::OpenAI => {
            let url = cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".into());

            let messages: Vec<Value> = turns
                .iter()
                .map(|t| serde_json::json!({ "role": t.role, "content": t.content }))
                .collect();

            let body = serde_json::json!({
                "model": cfg.model,
                "messages": messages,
            });

            (
                url,
                vec![("Authorization", format!("Bearer {}", cfg.api_key))],
                body,
            )
        }

        Provider::Anthropic => {
            let url = cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com/v1/messages".into());

            // Anthropic carries the system turn as a top-level field.
            let system: String = turns
                .iter()
                .filter(|t| t.role == Role::System)
                .map(|t| t.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");

            let messages: Vec<Value> = turns
                .iter()
                .filter(|t| t.role != Role::System)
                .map(|t| serde_json::json!({ "role": t.role, "content": t.content }))
                .collect();

            let body = serde_json::json!({
                "model": cfg.model,
                "max_tokens": 1024,
                "system": system,
                "messages": messages,
            });

            (
                url,
                vec![
                    ("x-api-key", cfg.api_key.clone()),
                    ("anthropic-version", "2023-06-01".into()),
                ],
                body,
            )
        }
    }
}

fn extract_text(provider: &Provider, v: &Value) -> std::result::Result<String, String> {
    match provider {
        Provider::OpenAI => v
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| "OpenAI response parse failure".into()),

        Provider::Anthropic => v
            .pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| "Anthropic response parse failure".into()),
    }
}

fn default_config() -> ProviderConfig {
    ProviderConfig {
        provider: Provider::OpenAI,
        model: "gpt-4o-mini".to_string(),
        api_key: String::new(),
        base_url: None,
        timeout_secs: default_timeout_secs(),
    }
}

fn default_timeout_secs() -> u64 {
    60
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autest/llm.json")
}

fn load_config() -> Option<ProviderConfig> {
    fs::read_to_string(config_path())
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
}

fn save_config(cfg: &ProviderConfig) -> std::io::Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(cfg)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(path, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_turns() -> Vec<ChatTurn> {
        vec![
            ChatTurn::system("produce only test code"),
            ChatTurn::user("Function for test:\nint add(int a, int b)"),
        ]
    }

    fn config_for(provider: Provider) -> ProviderConfig {
        ProviderConfig {
            provider,
            model: "test-model".into(),
            api_key: "k".into(),
            base_url: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn openai_request_sends_all_turns_as_messages() {
        let (_url, _headers, body) = build_request(&config_for(Provider::OpenAI), &sample_turns());

        let messages = body["messages"].as_array().expect("messages array");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
    }

    #[test]
    fn anthropic_request_lifts_system_turn_to_top_level() {
        let (_url, _headers, body) =
            build_request(&config_for(Provider::Anthropic), &sample_turns());

        assert_eq!(body["system"], "produce only test code");
        let messages = body["messages"].as_array().expect("messages array");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn conversation_hash_is_deterministic_and_role_sensitive() {
        let turns = sample_turns();
        assert_eq!(hash_turns(&turns), hash_turns(&turns));

        let mut swapped = turns.clone();
        swapped[1].role = Role::Assistant;
        assert_ne!(hash_turns(&turns), hash_turns(&swapped));
    }

    #[test]
    fn openai_text_extraction_reads_first_choice() {
        let v: Value = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "ok" } }]
        });
        assert_eq!(extract_text(&Provider::OpenAI, &v).unwrap(), "ok");
    }

    #[test]
    fn anthropic_text_extraction_reads_first_block() {
        let v: Value = serde_json::json!({
            "content": [{ "type": "text", "text": "ok" }]
        });
        assert_eq!(extract_text(&Provider::Anthropic, &v).unwrap(), "ok");
    }
}

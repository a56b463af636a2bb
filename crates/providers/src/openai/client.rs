use std::sync::Arc;

use aieditor_core::client::{ClientHandle, ClientListener};
use aieditor_core::config::{AiGlobalConfig, ModelConfig, OpenAiModelConfig};
use aieditor_core::message::{AiMessage, MessageStatus};
use aieditor_core::{AiError, AiModel};
use reqwest::Client;
use tracing::warn;

use crate::client::{http_client, SseClient, SseOptions};
use crate::missing_config;

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// OpenAI-style chat completions over SSE.
pub struct OpenAiModel {
    name: String,
    global: Arc<AiGlobalConfig>,
    config: ModelConfig,
    cfg: OpenAiModelConfig,
    http: Client,
}

impl OpenAiModel {
    pub fn new<S: Into<String>>(name: S, global: Arc<AiGlobalConfig>) -> Result<Self, AiError> {
        let name = name.into();
        let cfg = match global.model(&name) {
            Some(ModelConfig::OpenAi(c)) => c.clone(),
            other => return Err(missing_config(&name, "openai", other)),
        };
        if cfg.api_key.is_empty() {
            warn!(target: "providers::openai", model = %name, "api_key is empty");
        }
        Ok(Self {
            config: ModelConfig::OpenAi(cfg.clone()),
            http: http_client()?,
            name,
            global,
            cfg,
        })
    }
}

impl AiModel for OpenAiModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn global_config(&self) -> &AiGlobalConfig {
        &self.global
    }

    fn create_ai_client_url(&self) -> Option<String> {
        let endpoint = self.cfg.endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return None;
        }
        Some(format!("{endpoint}{CHAT_COMPLETIONS_PATH}"))
    }

    fn wrap_payload(&self, prompt: &str) -> Result<String, AiError> {
        let body = serde_json::json!({
            "messages": [{ "role": "user", "content": prompt }],
            "model": self.cfg.model,
            "stream": true,
        });
        Ok(serde_json::to_string(&body)?)
    }

    fn create_ai_client(&self, url: &str, listener: ClientListener) -> Result<ClientHandle, AiError> {
        let options = SseOptions::post(url)
            .with_header("Content-Type", "application/json")
            .with_header("Authorization", format!("Bearer {}", self.cfg.api_key));
        Ok(Arc::new(SseClient::new(self.http.clone(), options, listener)?))
    }

    fn parse_message(&self, chunk: &str) -> Option<AiMessage> {
        parse_chat_frame(chunk)
    }
}

/// Reads one `chat.completion.chunk` frame. Frames without a
/// `choices[0].delta` object yield nothing.
pub fn parse_chat_frame(chunk: &str) -> Option<AiMessage> {
    let v: serde_json::Value = serde_json::from_str(chunk).ok()?;
    let choice = &v["choices"][0];
    let delta = choice.get("delta").filter(|d| d.is_object())?;
    let status = if choice["finish_reason"].is_string() {
        MessageStatus::Done
    } else {
        MessageStatus::Streaming
    };
    Some(AiMessage {
        role: delta["role"].as_str().unwrap_or("assistant").to_string(),
        content: delta["content"].as_str().unwrap_or_default().to_string(),
        index: choice["index"].as_u64().unwrap_or(0) as u32,
        status,
    })
}

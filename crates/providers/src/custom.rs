use std::sync::Arc;

use aieditor_core::client::{ClientHandle, ClientListener};
use aieditor_core::config::{AiGlobalConfig, CustomModelConfig, ModelConfig, Protocol};
use aieditor_core::message::AiMessage;
use aieditor_core::{AiError, AiModel};
use reqwest::{Client, Method};
use tracing::warn;

use crate::client::{http_client, SseClient, SseOptions, WebSocketClient};
use crate::missing_config;

/// A caller-described backend. Everything vendor specific comes from
/// [`CustomModelConfig`]; without closures the prompt goes out as-is and each
/// chunk comes back as assistant text.
pub struct CustomAiModel {
    name: String,
    global: Arc<AiGlobalConfig>,
    config: ModelConfig,
    cfg: CustomModelConfig,
    http: Client,
}

impl CustomAiModel {
    pub fn new<S: Into<String>>(name: S, global: Arc<AiGlobalConfig>) -> Result<Self, AiError> {
        let name = name.into();
        let cfg = match global.model(&name) {
            Some(ModelConfig::Custom(c)) => c.clone(),
            other => return Err(missing_config(&name, "custom", other)),
        };
        if cfg.url.is_none() && cfg.url_factory.is_none() {
            warn!(target: "providers::custom", model = %name, "neither url nor url_factory is set");
        }
        Ok(Self {
            config: ModelConfig::Custom(cfg.clone()),
            http: http_client()?,
            name,
            global,
            cfg,
        })
    }
}

impl AiModel for CustomAiModel {
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
        let url = match &self.cfg.url_factory {
            Some(f) => f(),
            None => self.cfg.url.clone()?,
        };
        Some(url).filter(|u| !u.trim().is_empty())
    }

    fn wrap_payload(&self, prompt: &str) -> Result<String, AiError> {
        match &self.cfg.wrap_payload {
            Some(f) => f(prompt),
            None => Ok(prompt.to_string()),
        }
    }

    fn create_ai_client(&self, url: &str, listener: ClientListener) -> Result<ClientHandle, AiError> {
        match self.cfg.protocol {
            Protocol::WebSocket => Ok(Arc::new(WebSocketClient::new(url, listener))),
            Protocol::Sse => {
                let method = Method::from_bytes(self.cfg.method.to_ascii_uppercase().as_bytes())
                    .map_err(|e| AiError::Config(format!("method `{}`: {e}", self.cfg.method)))?;
                let mut options = SseOptions::post(url)
                    .with_method(method)
                    .with_done_sentinel(self.cfg.sentinel().map(str::to_string));
                for (k, v) in self.cfg.resolved_headers() {
                    options = options.with_header(k, v);
                }
                Ok(Arc::new(SseClient::new(self.http.clone(), options, listener)?))
            }
        }
    }

    fn parse_message(&self, chunk: &str) -> Option<AiMessage> {
        match &self.cfg.parse_message {
            Some(f) => f(chunk),
            None => Some(AiMessage::assistant(chunk)),
        }
    }
}

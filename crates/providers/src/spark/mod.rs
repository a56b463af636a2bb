use std::sync::Arc;

use aieditor_core::client::{ClientHandle, ClientListener};
use aieditor_core::config::{AiGlobalConfig, ModelConfig, SparkModelConfig};
use aieditor_core::message::{AiMessage, MessageStatus};
use aieditor_core::{AiError, AiModel};
use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::client::WebSocketClient;
use crate::missing_config;

pub mod sign;

pub const SPARK_HOST: &str = "spark-api.xf-yun.com";

/// Source of the signing date.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl Clock for DateTime<Utc> {
    fn now(&self) -> DateTime<Utc> {
        *self
    }
}

/// The HMAC-signed socket API.
pub struct SparkAiModel {
    name: String,
    global: Arc<AiGlobalConfig>,
    config: ModelConfig,
    cfg: SparkModelConfig,
    clock: Arc<dyn Clock>,
}

impl SparkAiModel {
    pub fn new<S: Into<String>>(name: S, global: Arc<AiGlobalConfig>) -> Result<Self, AiError> {
        let name = name.into();
        let cfg = match global.model(&name) {
            Some(ModelConfig::Spark(c)) => c.clone(),
            other => return Err(missing_config(&name, "spark", other)),
        };
        if cfg.app_id.is_empty() || cfg.api_key.is_empty() || cfg.api_secret.is_empty() {
            warn!(target: "providers::spark", model = %name, "app_id, api_key or api_secret is empty");
        }
        Ok(Self {
            config: ModelConfig::Spark(cfg.clone()),
            name,
            global,
            cfg,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn domain(&self) -> &'static str {
        domain_for(&self.cfg.version)
    }

    fn base_url(&self) -> String {
        format!("{}://{SPARK_HOST}/{}/chat", self.cfg.protocol, self.cfg.version)
    }
}

pub fn domain_for(version: &str) -> &'static str {
    match version {
        "v1.1" => "general",
        "v2.1" => "generalv2",
        "v3.5" => "generalv3.5",
        _ => "generalv3",
    }
}

impl AiModel for SparkAiModel {
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
        let base = self.base_url();
        match sign::signed_url(&base, &self.cfg.api_key, &self.cfg.api_secret, self.clock.now()) {
            Ok(url) => Some(url),
            Err(e) => {
                error!(target: "providers::spark", error = %e, "cannot sign url");
                None
            }
        }
    }

    fn wrap_payload(&self, prompt: &str) -> Result<String, AiError> {
        let body = serde_json::json!({
            "header": {
                "app_id": self.cfg.app_id,
                "uid": uuid::Uuid::new_v4().simple().to_string(),
            },
            "parameter": {
                "chat": {
                    "domain": self.domain(),
                    "temperature": 0.5,
                    "max_tokens": 2048,
                }
            },
            "payload": {
                "message": {
                    "text": [{ "role": "user", "content": prompt }]
                }
            }
        });
        Ok(serde_json::to_string(&body)?)
    }

    fn create_ai_client(&self, url: &str, listener: ClientListener) -> Result<ClientHandle, AiError> {
        Ok(Arc::new(WebSocketClient::new(url, listener)))
    }

    fn parse_message(&self, chunk: &str) -> Option<AiMessage> {
        parse_spark_frame(chunk)
    }

    fn is_terminal(&self, message: &AiMessage) -> bool {
        message.is_done()
    }
}

/// Reads one inbound frame. Frames with a non-zero `header.code` are
/// rejected by the gateway and yield nothing.
pub fn parse_spark_frame(chunk: &str) -> Option<AiMessage> {
    let v: serde_json::Value = serde_json::from_str(chunk).ok()?;
    let header = &v["header"];
    let code = header["code"].as_i64().unwrap_or(0);
    if code != 0 {
        warn!(
            target: "providers::spark",
            code,
            msg = header["message"].as_str().unwrap_or_default(),
            sid = header["sid"].as_str().unwrap_or_default(),
            "spark returned an error frame"
        );
        return None;
    }
    let choices = &v["payload"]["choices"];
    let text = choices["text"].get(0)?;
    let status = match choices["status"].as_u64().or_else(|| header["status"].as_u64()) {
        Some(2) => MessageStatus::Done,
        Some(0) => MessageStatus::Pending,
        _ => MessageStatus::Streaming,
    };
    Some(AiMessage {
        role: text["role"].as_str().unwrap_or("assistant").to_string(),
        content: text["content"].as_str().unwrap_or_default().to_string(),
        index: text["index"].as_u64().or_else(|| choices["seq"].as_u64()).unwrap_or(0) as u32,
        status,
    })
}

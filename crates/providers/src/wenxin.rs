use std::sync::Arc;

use aieditor_core::client::{ClientHandle, ClientListener};
use aieditor_core::config::{AiGlobalConfig, ModelConfig, WenXinModelConfig};
use aieditor_core::message::{AiMessage, MessageStatus};
use aieditor_core::{AiError, AiModel};
use reqwest::Client;
use tracing::warn;
use url::Url;

use crate::client::{http_client, SseClient, SseOptions};
use crate::missing_config;

pub const WENXIN_HOST: &str = "aip.baidubce.com";
const CHAT_PATH: &str = "/rpc/2.0/ai_custom/v1/wenxinworkshop/chat";

pub struct WenXinAiModel {
    name: String,
    global: Arc<AiGlobalConfig>,
    config: ModelConfig,
    cfg: WenXinModelConfig,
    http: Client,
}

impl WenXinAiModel {
    pub fn new<S: Into<String>>(name: S, global: Arc<AiGlobalConfig>) -> Result<Self, AiError> {
        let name = name.into();
        let cfg = match global.model(&name) {
            Some(ModelConfig::WenXin(c)) => c.clone(),
            other => return Err(missing_config(&name, "wenxin", other)),
        };
        if cfg.access_token.is_empty() {
            warn!(target: "providers::wenxin", model = %name, "access_token is empty");
        }
        Ok(Self {
            config: ModelConfig::WenXin(cfg.clone()),
            http: http_client()?,
            name,
            global,
            cfg,
        })
    }
}

impl AiModel for WenXinAiModel {
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
        let base = format!("{}://{WENXIN_HOST}{CHAT_PATH}/{}", self.cfg.protocol, self.cfg.version);
        match Url::parse_with_params(&base, &[("access_token", self.cfg.access_token.as_str())]) {
            Ok(url) => Some(url.into()),
            Err(e) => {
                warn!(target: "providers::wenxin", url = %base, error = %e, "invalid wenxin url");
                None
            }
        }
    }

    fn wrap_payload(&self, prompt: &str) -> Result<String, AiError> {
        let body = serde_json::json!({
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true,
        });
        Ok(serde_json::to_string(&body)?)
    }

    fn create_ai_client(&self, url: &str, listener: ClientListener) -> Result<ClientHandle, AiError> {
        let options = SseOptions::post(url)
            .with_header("Content-Type", "application/json")
            .with_done_sentinel(None);
        Ok(Arc::new(SseClient::new(self.http.clone(), options, listener)?))
    }

    fn parse_message(&self, chunk: &str) -> Option<AiMessage> {
        parse_wenxin_frame(chunk)
    }
}

pub fn parse_wenxin_frame(chunk: &str) -> Option<AiMessage> {
    let v: serde_json::Value = serde_json::from_str(chunk).ok()?;
    if let Some(code) = v["error_code"].as_i64() {
        warn!(
            target: "providers::wenxin",
            code,
            msg = v["error_msg"].as_str().unwrap_or_default(),
            "wenxin returned an error frame"
        );
        return None;
    }
    let content = v["result"].as_str()?;
    let status = if v["is_end"].as_bool().unwrap_or(false) {
        MessageStatus::Done
    } else {
        MessageStatus::Streaming
    };
    Some(AiMessage {
        role: "assistant".to_string(),
        content: content.to_string(),
        index: v["sentence_id"].as_u64().unwrap_or(0) as u32,
        status,
    })
}

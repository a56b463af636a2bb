use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AiError;
use crate::message::AiMessage;

pub const OPENAI: &str = "openai";
pub const SPARK: &str = "spark";
pub const WENXIN: &str = "wenxin";
pub const CUSTOM: &str = "custom";

/// Per-model configuration. The shape depends on which vendor the model
/// name selects; names without a built-in vendor keep their raw value for
/// the caller's model factory.
#[derive(Clone, Debug)]
pub enum ModelConfig {
    OpenAi(OpenAiModelConfig),
    Spark(SparkModelConfig),
    WenXin(WenXinModelConfig),
    Custom(CustomModelConfig),
    Other(serde_json::Value),
}

impl ModelConfig {
    pub fn from_value(name: &str, value: serde_json::Value) -> Result<Self, AiError> {
        let bad = |e: serde_json::Error| AiError::Config(format!("model `{name}`: {e}"));
        Ok(match name {
            OPENAI => ModelConfig::OpenAi(serde_json::from_value(value).map_err(bad)?),
            SPARK => ModelConfig::Spark(serde_json::from_value(value).map_err(bad)?),
            WENXIN => ModelConfig::WenXin(serde_json::from_value(value).map_err(bad)?),
            CUSTOM => ModelConfig::Custom(serde_json::from_value(value).map_err(bad)?),
            _ => ModelConfig::Other(value),
        })
    }

    pub fn prompt_template(&self) -> Option<&str> {
        match self {
            ModelConfig::OpenAi(c) => c.prompt_template.as_deref(),
            ModelConfig::Spark(c) => c.prompt_template.as_deref(),
            ModelConfig::WenXin(c) => c.prompt_template.as_deref(),
            ModelConfig::Custom(c) => c.prompt_template.as_deref(),
            ModelConfig::Other(v) => v.get("prompt_template").and_then(|t| t.as_str()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenAiModelConfig {
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default)]
    pub prompt_template: Option<String>,
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com".to_string()
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

impl Default for OpenAiModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_openai_endpoint(),
            api_key: String::new(),
            model: default_openai_model(),
            prompt_template: None,
        }
    }
}

impl OpenAiModelConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SparkModelConfig {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_spark_protocol")]
    pub protocol: String,
    #[serde(default = "default_spark_version")]
    pub version: String,
    #[serde(default)]
    pub prompt_template: Option<String>,
}

fn default_spark_protocol() -> String {
    "wss".to_string()
}

fn default_spark_version() -> String {
    "v3.1".to_string()
}

impl Default for SparkModelConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            protocol: default_spark_protocol(),
            version: default_spark_version(),
            prompt_template: None,
        }
    }
}

impl SparkModelConfig {
    pub fn new<S: Into<String>>(app_id: S, api_key: S, api_secret: S) -> Self {
        Self {
            app_id: app_id.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            ..Default::default()
        }
    }

    pub fn with_version<S: Into<String>>(mut self, version: S) -> Self {
        self.version = version.into();
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WenXinModelConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_wenxin_protocol")]
    pub protocol: String,
    #[serde(default = "default_wenxin_version")]
    pub version: String,
    #[serde(default)]
    pub prompt_template: Option<String>,
}

fn default_wenxin_protocol() -> String {
    "https".to_string()
}

fn default_wenxin_version() -> String {
    "completions".to_string()
}

impl Default for WenXinModelConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            protocol: default_wenxin_protocol(),
            version: default_wenxin_version(),
            prompt_template: None,
        }
    }
}

impl WenXinModelConfig {
    pub fn new<S: Into<String>>(access_token: S) -> Self {
        Self {
            access_token: access_token.into(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Sse,
    #[serde(alias = "ws")]
    WebSocket,
}

pub type UrlFactory = Arc<dyn Fn() -> String + Send + Sync>;
pub type HeadersFactory = Arc<dyn Fn() -> Vec<(String, String)> + Send + Sync>;
pub type PayloadWrapper = Arc<dyn Fn(&str) -> Result<String, AiError> + Send + Sync>;
pub type MessageParser = Arc<dyn Fn(&str) -> Option<AiMessage> + Send + Sync>;

/// A user-defined backend. Static parts may come from the config file; the
/// factories and the serializer/deserializer pair are set in code.
#[derive(Clone, Serialize, Deserialize)]
pub struct CustomModelConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(skip)]
    pub url_factory: Option<UrlFactory>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(skip)]
    pub headers_factory: Option<HeadersFactory>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "default_done_sentinel")]
    pub done_sentinel: Option<String>,
    #[serde(skip)]
    pub wrap_payload: Option<PayloadWrapper>,
    #[serde(skip)]
    pub parse_message: Option<MessageParser>,
    #[serde(default)]
    pub prompt_template: Option<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_done_sentinel() -> Option<String> {
    Some("[DONE]".to_string())
}

impl Default for CustomModelConfig {
    fn default() -> Self {
        Self {
            url: None,
            url_factory: None,
            headers: BTreeMap::new(),
            headers_factory: None,
            method: default_method(),
            protocol: Protocol::default(),
            done_sentinel: default_done_sentinel(),
            wrap_payload: None,
            parse_message: None,
            prompt_template: None,
        }
    }
}

impl fmt::Debug for CustomModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomModelConfig")
            .field("url", &self.url)
            .field("url_factory", &self.url_factory.is_some())
            .field("headers", &self.headers)
            .field("headers_factory", &self.headers_factory.is_some())
            .field("method", &self.method)
            .field("protocol", &self.protocol)
            .field("done_sentinel", &self.done_sentinel)
            .field("wrap_payload", &self.wrap_payload.is_some())
            .field("parse_message", &self.parse_message.is_some())
            .finish()
    }
}

impl CustomModelConfig {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_url_factory<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.url_factory = Some(Arc::new(f));
        self
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers_factory<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Vec<(String, String)> + Send + Sync + 'static,
    {
        self.headers_factory = Some(Arc::new(f));
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_done_sentinel(mut self, sentinel: Option<String>) -> Self {
        self.done_sentinel = sentinel;
        self
    }

    pub fn with_wrap_payload<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<String, AiError> + Send + Sync + 'static,
    {
        self.wrap_payload = Some(Arc::new(f));
        self
    }

    pub fn with_parse_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Option<AiMessage> + Send + Sync + 'static,
    {
        self.parse_message = Some(Arc::new(f));
        self
    }

    /// Static headers overlaid with whatever the factory returns.
    pub fn resolved_headers(&self) -> Vec<(String, String)> {
        let mut merged = self.headers.clone();
        if let Some(f) = &self.headers_factory {
            merged.extend(f());
        }
        merged.into_iter().collect()
    }

    /// An empty sentinel in a config file means "no sentinel".
    pub fn sentinel(&self) -> Option<&str> {
        self.done_sentinel.as_deref().filter(|s| !s.is_empty())
    }
}

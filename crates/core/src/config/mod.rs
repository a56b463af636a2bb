use std::collections::BTreeMap;
use std::sync::Arc;
use std::{env, fmt, fs, path::PathBuf};

use directories::BaseDirs;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::warn;

use crate::model::AiModel;

mod models;

pub use models::{
    CustomModelConfig, HeadersFactory, MessageParser, ModelConfig, OpenAiModelConfig,
    PayloadWrapper, Protocol, SparkModelConfig, UrlFactory, WenXinModelConfig, CUSTOM, OPENAI,
    SPARK, WENXIN,
};

/// Builds models for names that have no built-in vendor.
pub trait AiModelFactory: Send + Sync {
    fn create(&self, name: &str, config: &Arc<AiGlobalConfig>) -> Option<Arc<dyn AiModel>>;
}

impl<F> AiModelFactory for F
where
    F: Fn(&str, &Arc<AiGlobalConfig>) -> Option<Arc<dyn AiModel>> + Send + Sync,
{
    fn create(&self, name: &str, config: &Arc<AiGlobalConfig>) -> Option<Arc<dyn AiModel>> {
        self(name, config)
    }
}

/// Called once per finished exchange with the model name, its config and the
/// approximate amount of streamed text (in characters).
pub type TokenConsumeFn = Arc<dyn Fn(&str, &ModelConfig, usize) + Send + Sync>;

/// Resolves the connection URL out of band, e.g. by asking a backend to sign
/// it. `None` means the chat must not start.
pub type ClientUrlFn =
    Arc<dyn Fn(&str, &ModelConfig) -> BoxFuture<'static, Option<String>> + Send + Sync>;

#[derive(Debug, Default, Deserialize)]
pub struct AiFileConfig {
    #[serde(default)]
    pub models: BTreeMap<String, serde_json::Value>,
    pub default_model: Option<String>,
    pub prompt_template: Option<String>,
}

/// Process-wide AI configuration, read-only once handed to the registry.
#[derive(Clone, Default)]
pub struct AiGlobalConfig {
    pub models: BTreeMap<String, ModelConfig>,
    pub default_model: Option<String>,
    pub prompt_template: Option<String>,
    pub model_factory: Option<Arc<dyn AiModelFactory>>,
    pub on_token_consume: Option<TokenConsumeFn>,
    pub on_create_client_url: Option<ClientUrlFn>,
}

impl fmt::Debug for AiGlobalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiGlobalConfig")
            .field("models", &self.models)
            .field("default_model", &self.default_model)
            .field("prompt_template", &self.prompt_template)
            .field("model_factory", &self.model_factory.is_some())
            .field("on_token_consume", &self.on_token_consume.is_some())
            .field("on_create_client_url", &self.on_create_client_url.is_some())
            .finish()
    }
}

impl AiGlobalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model<S: Into<String>>(mut self, name: S, config: ModelConfig) -> Self {
        self.models.insert(name.into(), config);
        self
    }

    pub fn with_default_model<S: Into<String>>(mut self, name: S) -> Self {
        self.default_model = Some(name.into());
        self
    }

    pub fn with_prompt_template<S: Into<String>>(mut self, template: S) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    pub fn with_model_factory<F: AiModelFactory + 'static>(mut self, factory: F) -> Self {
        self.model_factory = Some(Arc::new(factory));
        self
    }

    pub fn on_token_consume<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &ModelConfig, usize) + Send + Sync + 'static,
    {
        self.on_token_consume = Some(Arc::new(f));
        self
    }

    pub fn on_create_client_url<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &ModelConfig) -> BoxFuture<'static, Option<String>> + Send + Sync + 'static,
    {
        self.on_create_client_url = Some(Arc::new(f));
        self
    }

    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let file: AiFileConfig = toml::from_str(s)?;
        Self::from_file_config(file)
    }

    pub fn from_file_config(file: AiFileConfig) -> anyhow::Result<Self> {
        let mut cfg = AiGlobalConfig {
            default_model: file.default_model,
            prompt_template: file.prompt_template,
            ..Default::default()
        };
        for (name, value) in file.models {
            let model = ModelConfig::from_value(&name, value)?;
            cfg.models.insert(name, model);
        }
        Ok(cfg)
    }

    /// Loads `<config_dir>/aieditor/ai.toml` when present, then applies the
    /// credential environment variables on top.
    pub fn from_env_and_file() -> anyhow::Result<Self> {
        let mut cfg = AiGlobalConfig::default();
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match fs::read_to_string(&path) {
                    Ok(text) => match Self::from_toml_str(&text) {
                        Ok(c) => cfg = c,
                        Err(e) => {
                            warn!(target: "core::config", path = %path.display(), error = %e, "ignoring invalid ai config")
                        }
                    },
                    Err(e) => {
                        warn!(target: "core::config", path = %path.display(), error = %e, "cannot read ai config")
                    }
                }
            }
        }
        cfg.apply_env(|key| env::var(key).ok());
        Ok(cfg)
    }

    /// Fill credentials from `lookup` (normally the process environment).
    /// Blank values are ignored.
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let openai_key = var("OPENAI_API_KEY");
        let openai_url = var("OPENAI_BASE_URL");
        if openai_key.is_some() || openai_url.is_some() {
            let entry = self
                .models
                .entry(OPENAI.to_string())
                .or_insert_with(|| ModelConfig::OpenAi(OpenAiModelConfig::default()));
            if let ModelConfig::OpenAi(c) = entry {
                if let Some(k) = openai_key {
                    c.api_key = k;
                }
                if let Some(u) = openai_url {
                    c.endpoint = u;
                }
            }
        }

        let spark = [var("SPARK_APP_ID"), var("SPARK_API_KEY"), var("SPARK_API_SECRET")];
        if spark.iter().any(Option::is_some) {
            let entry = self
                .models
                .entry(SPARK.to_string())
                .or_insert_with(|| ModelConfig::Spark(SparkModelConfig::default()));
            if let ModelConfig::Spark(c) = entry {
                let [app_id, api_key, api_secret] = spark;
                if let Some(v) = app_id {
                    c.app_id = v;
                }
                if let Some(v) = api_key {
                    c.api_key = v;
                }
                if let Some(v) = api_secret {
                    c.api_secret = v;
                }
            }
        }

        if let Some(token) = var("WENXIN_ACCESS_TOKEN") {
            let entry = self
                .models
                .entry(WENXIN.to_string())
                .or_insert_with(|| ModelConfig::WenXin(WenXinModelConfig::default()));
            if let ModelConfig::WenXin(c) = entry {
                c.access_token = token;
            }
        }
    }

    fn config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        let p = if cfg!(target_os = "windows") {
            base.home_dir().join(".aieditor").join("ai.toml")
        } else {
            base.config_dir().join("aieditor").join("ai.toml")
        };
        Some(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
default_model = "spark"
prompt_template = "{prompt}: {content}"

[models.openai]
api_key = "sk-test"
model = "gpt-4o-mini"

[models.spark]
app_id = "app"
api_key = "key"
api_secret = "secret"
version = "v3.5"

[models.custom]
url = "http://localhost:8080/stream"
protocol = "websocket"
done_sentinel = ""

[models.local-llama]
endpoint = "http://127.0.0.1:11434"
"#;

    #[test]
    fn parses_vendor_shapes_by_name() {
        let cfg = AiGlobalConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.default_model.as_deref(), Some("spark"));

        let Some(ModelConfig::OpenAi(openai)) = cfg.model("openai") else {
            panic!("openai config expected");
        };
        assert_eq!(openai.model, "gpt-4o-mini");
        assert_eq!(openai.endpoint, "https://api.openai.com");

        let Some(ModelConfig::Spark(spark)) = cfg.model("spark") else {
            panic!("spark config expected");
        };
        assert_eq!(spark.version, "v3.5");
        assert_eq!(spark.protocol, "wss");

        let Some(ModelConfig::Custom(custom)) = cfg.model("custom") else {
            panic!("custom config expected");
        };
        assert_eq!(custom.protocol, Protocol::WebSocket);
        assert_eq!(custom.sentinel(), None);
        assert_eq!(custom.method, "POST");

        assert!(matches!(cfg.model("local-llama"), Some(ModelConfig::Other(_))));
    }

    #[test]
    fn rejects_malformed_vendor_section() {
        let err = AiGlobalConfig::from_toml_str("[models.openai]\napi_key = 3\n").unwrap_err();
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn env_overrides_fill_credentials() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-env"),
            ("WENXIN_ACCESS_TOKEN", "tok"),
            ("SPARK_API_SECRET", "  "),
        ]
        .into_iter()
        .collect();
        let mut cfg = AiGlobalConfig::from_toml_str(SAMPLE).unwrap();
        cfg.apply_env(|k| vars.get(k).map(|v| v.to_string()));

        let Some(ModelConfig::OpenAi(openai)) = cfg.model("openai") else {
            panic!("openai config expected");
        };
        assert_eq!(openai.api_key, "sk-env");
        assert_eq!(openai.model, "gpt-4o-mini");

        let Some(ModelConfig::WenXin(wenxin)) = cfg.model("wenxin") else {
            panic!("wenxin config expected");
        };
        assert_eq!(wenxin.access_token, "tok");
        assert_eq!(wenxin.version, "completions");

        let Some(ModelConfig::Spark(spark)) = cfg.model("spark") else {
            panic!("spark config expected");
        };
        assert_eq!(spark.api_secret, "secret");
    }

    #[test]
    fn custom_headers_merge_factory_over_static() {
        let c = CustomModelConfig::new("http://x")
            .with_header("x-a", "1")
            .with_header("x-b", "2")
            .with_headers_factory(|| vec![("x-b".to_string(), "3".to_string())]);
        assert_eq!(
            c.resolved_headers(),
            vec![("x-a".to_string(), "1".to_string()), ("x-b".to_string(), "3".to_string())]
        );
    }
}

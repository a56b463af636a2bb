use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use aieditor_core::config::{AiGlobalConfig, ModelConfig, CUSTOM, OPENAI, SPARK, WENXIN};
use aieditor_core::{AiError, AiModel};
use tracing::{debug, error, warn};

use crate::{CustomAiModel, OpenAiModel, SparkAiModel, WenXinAiModel};

/// Name that resolves to the configured default model.
pub const AUTO: &str = "auto";

/// Lazily built, shared model instances keyed by name.
pub struct ModelRegistry {
    config: Arc<AiGlobalConfig>,
    models: RwLock<HashMap<String, Arc<dyn AiModel>>>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("config", &self.config)
            .field("models", &self.names())
            .finish()
    }
}

impl ModelRegistry {
    pub fn new(config: Arc<AiGlobalConfig>) -> Self {
        Self {
            config,
            models: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Arc<AiGlobalConfig> {
        &self.config
    }

    /// The cached model for `name`, building it on first use. `"auto"` and
    /// the empty name stand for the default model unless a model was `set`
    /// under that exact name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn AiModel>> {
        if let Some(m) = self.read().get(name) {
            return Some(m.clone());
        }
        let name = self.resolve(name)?;
        if let Some(m) = self.read().get(name.as_str()) {
            return Some(m.clone());
        }
        let built = self.build(&name)?;
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        Some(models.entry(name).or_insert(built).clone())
    }

    pub fn try_get(&self, name: &str) -> Result<Arc<dyn AiModel>, AiError> {
        self.get(name).ok_or_else(|| AiError::UnknownModel(name.to_string()))
    }

    /// Inject or replace the model served for `name`.
    pub fn set<S: Into<String>>(&self, name: S, model: Arc<dyn AiModel>) {
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        models.insert(name.into(), model);
    }

    /// Build every configured model up front. Returns how many are cached.
    pub fn init(&self) -> usize {
        for name in self.config.models.keys() {
            if self.get(name).is_none() {
                warn!(target: "providers::registry", model = %name, "configured model could not be built");
            }
        }
        self.read().len()
    }

    /// Cached model names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn AiModel>>> {
        self.models.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, name: &str) -> Option<String> {
        let name = name.trim();
        if !name.is_empty() && name != AUTO {
            return Some(name.to_string());
        }
        let resolved = self
            .config
            .default_model
            .clone()
            .filter(|d| !d.is_empty() && d != AUTO)
            .or_else(|| self.config.models.keys().next().cloned());
        if resolved.is_none() {
            error!(target: "providers::registry", "no default model and no configured models");
        }
        resolved
    }

    fn build(&self, name: &str) -> Option<Arc<dyn AiModel>> {
        // Config shape wins over the name.
        let vendor = match self.config.model(name) {
            Some(ModelConfig::OpenAi(_)) => OPENAI,
            Some(ModelConfig::Spark(_)) => SPARK,
            Some(ModelConfig::WenXin(_)) => WENXIN,
            Some(ModelConfig::Custom(_)) => CUSTOM,
            _ => name,
        };
        let config = self.config.clone();
        let built: Result<Option<Arc<dyn AiModel>>, AiError> = match vendor {
            OPENAI => OpenAiModel::new(name, config).map(|m| Some(Arc::new(m) as Arc<dyn AiModel>)),
            SPARK => SparkAiModel::new(name, config).map(|m| Some(Arc::new(m) as Arc<dyn AiModel>)),
            WENXIN => WenXinAiModel::new(name, config).map(|m| Some(Arc::new(m) as Arc<dyn AiModel>)),
            CUSTOM => CustomAiModel::new(name, config).map(|m| Some(Arc::new(m) as Arc<dyn AiModel>)),
            _ => Ok(self
                .config
                .model_factory
                .as_ref()
                .and_then(|f| f.create(name, &self.config))),
        };
        match built {
            Ok(Some(model)) => {
                debug!(target: "providers::registry", model = %name, "model created");
                Some(model)
            }
            Ok(None) => {
                error!(target: "providers::registry", model = %name, "unknown model");
                None
            }
            Err(e) => {
                error!(target: "providers::registry", model = %name, error = %e, "model creation failed");
                None
            }
        }
    }
}

pub mod client;
pub mod custom;
pub mod openai;
pub mod registry;
pub mod spark;
pub mod wenxin;

pub use custom::CustomAiModel;
pub use openai::OpenAiModel;
pub use registry::ModelRegistry;
pub use spark::SparkAiModel;
pub use wenxin::WenXinAiModel;

use aieditor_core::config::ModelConfig;
use aieditor_core::AiError;

fn missing_config(name: &str, expected: &str, found: Option<&ModelConfig>) -> AiError {
    match found {
        Some(_) => AiError::Config(format!("model `{name}` is not configured as a {expected} model")),
        None => AiError::Config(format!("model `{name}` has no configuration")),
    }
}

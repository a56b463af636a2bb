use crate::client::{ClientHandle, ClientListener};
use crate::config::{AiGlobalConfig, ModelConfig};
use crate::error::AiError;
use crate::message::AiMessage;

/// One backend family: how to reach it, how to phrase a prompt for it and
/// how to read what it streams back.
///
/// The chat entry points live in [`crate::chat`]; they drive any
/// implementation of this trait the same way.
pub trait AiModel: Send + Sync {
    fn name(&self) -> &str;

    fn config(&self) -> &ModelConfig;

    fn global_config(&self) -> &AiGlobalConfig;

    /// Connection target, or `None` when the configuration cannot produce one.
    fn create_ai_client_url(&self) -> Option<String>;

    /// Serialize a prompt into the vendor's request body.
    fn wrap_payload(&self, prompt: &str) -> Result<String, AiError>;

    /// Build the transport for this vendor, reporting raw events to `listener`.
    fn create_ai_client(&self, url: &str, listener: ClientListener)
        -> Result<ClientHandle, AiError>;

    /// Decode one raw chunk. `None` drops the chunk.
    fn parse_message(&self, chunk: &str) -> Option<AiMessage>;

    /// Whether `message` ends the exchange on the vendor's side.
    fn is_terminal(&self, _message: &AiMessage) -> bool {
        false
    }

    fn prompt_template(&self) -> Option<&str> {
        self.config().prompt_template()
    }
}

pub mod chat;
pub mod client;
pub mod config;
pub mod editor;
pub mod error;
pub mod logging;
pub mod message;
pub mod model;
pub mod template;

pub use chat::{chat, chat_with_payload, ChatEvents};
pub use client::{AiClient, ChatEvent, ClientEvent, ClientHandle, ClientListener, ClientState};
pub use config::{AiGlobalConfig, AiModelFactory, ModelConfig};
pub use error::AiError;
pub use message::{AiMessage, MessageStatus};
pub use model::AiModel;

mod client;

pub use client::{parse_chat_frame, OpenAiModel, CHAT_COMPLETIONS_PATH};

pub mod decoder;
pub mod sse;
pub mod ws;

pub use decoder::{FrameDecoder, SseFrame};
pub use sse::{SseClient, SseOptions};
pub use ws::WebSocketClient;

use aieditor_core::AiError;
use reqwest::Client;
use std::time::Duration;

/// HTTP client shared by every SSE exchange of one model. No overall timeout:
/// streams stay open as long as the vendor keeps talking.
pub fn http_client() -> Result<Client, AiError> {
    Client::builder()
        .use_rustls_tls()
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(2)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| AiError::Transport(e.to_string()))
}

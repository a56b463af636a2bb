use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{ChatEvent, ClientEvent, ClientHandle};
use crate::error::AiError;
use crate::model::AiModel;
use crate::template::render_prompt;

/// Ask `model` about `selected_text`.
///
/// When the model or the global config carries a prompt template, `{content}`
/// and `{prompt}` are filled in; otherwise `prompt` is sent as is. Payload
/// errors are returned here, before any connection is opened.
///
/// Must be called from within a Tokio runtime.
pub fn chat(
    model: Arc<dyn AiModel>,
    selected_text: &str,
    prompt: &str,
) -> Result<ChatEvents, AiError> {
    let template = model
        .prompt_template()
        .or(model.global_config().prompt_template.as_deref());
    let prompt = match template {
        Some(t) => render_prompt(t, selected_text, prompt),
        None => prompt.to_string(),
    };
    let payload = model.wrap_payload(&prompt)?;
    Ok(chat_with_payload(model, payload))
}

/// Start one exchange with an already serialized payload.
///
/// Must be called from within a Tokio runtime.
pub fn chat_with_payload(model: Arc<dyn AiModel>, payload: String) -> ChatEvents {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let exchange = Exchange {
        model,
        tx,
        cancel: cancel.clone(),
    };
    tokio::spawn(exchange.run(payload));
    ChatEvents { rx, cancel }
}

/// Receiving side of one exchange: `Started` (at most once), any number of
/// `Message`s, then exactly one `Stopped`.
#[derive(Debug)]
pub struct ChatEvents {
    rx: mpsc::UnboundedReceiver<ChatEvent>,
    cancel: CancellationToken,
}

impl ChatEvents {
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        self.rx.recv().await
    }

    /// End the exchange, whether or not the connection is up yet.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Concatenate streamed content until the exchange stops.
    pub async fn collect_text(mut self) -> String {
        let mut text = String::new();
        while let Some(ev) = self.recv().await {
            match ev {
                ChatEvent::Message(m) => text.push_str(&m.content),
                ChatEvent::Stopped => break,
                ChatEvent::Started(_) => {}
            }
        }
        text
    }
}

impl Stream for ChatEvents {
    type Item = ChatEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ChatEvent>> {
        self.rx.poll_recv(cx)
    }
}

struct Exchange {
    model: Arc<dyn AiModel>,
    tx: mpsc::UnboundedSender<ChatEvent>,
    cancel: CancellationToken,
}

impl Exchange {
    async fn run(self, payload: String) {
        let name = self.model.name().to_string();

        let url = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            url = self.resolve_url() => url,
        };
        let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
            if !self.cancel.is_cancelled() {
                warn!(target: "core::chat", model = %name, "no client url; chat not started");
            }
            let _ = self.tx.send(ChatEvent::Stopped);
            return;
        };

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
        let client = match self.model.create_ai_client(&url, raw_tx) {
            Ok(c) => c,
            Err(e) => {
                error!(target: "core::chat", model = %name, error = %e, "cannot create ai client");
                let _ = self.tx.send(ChatEvent::Stopped);
                return;
            }
        };
        info!(target: "core::chat", model = %name, "start chat stream");
        client.start(payload);

        let mut started = false;
        let mut stopping = false;
        let mut consumed = 0usize;
        let mut dropped = 0usize;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled(), if !stopping => {
                    stopping = true;
                    client.stop();
                }
                _ = self.tx.closed(), if !stopping => {
                    debug!(target: "core::chat", model = %name, "listener gone; stopping client");
                    stopping = true;
                    client.stop();
                }
                event = raw_rx.recv() => match event {
                    Some(ClientEvent::Started) => self.announce(&client, &mut started),
                    Some(ClientEvent::Chunk(raw)) => {
                        if stopping {
                            continue;
                        }
                        let Some(message) = self.model.parse_message(&raw) else {
                            dropped += 1;
                            debug!(target: "core::chat", model = %name, chunk = %raw, "dropping unparseable chunk");
                            continue;
                        };
                        self.announce(&client, &mut started);
                        consumed += message.content.chars().count();
                        let terminal = self.model.is_terminal(&message);
                        let _ = self.tx.send(ChatEvent::Message(message));
                        if terminal {
                            stopping = true;
                            client.stop();
                        }
                    }
                    Some(ClientEvent::Stopped) | None => break,
                }
            }
        }

        if dropped > 0 {
            warn!(target: "core::chat", model = %name, dropped, "chunks did not match the vendor frame shape");
        }
        if consumed > 0 {
            if let Some(cb) = &self.model.global_config().on_token_consume {
                cb(&name, self.model.config(), consumed);
            }
        }
        let _ = self.tx.send(ChatEvent::Stopped);
    }

    async fn resolve_url(&self) -> Option<String> {
        match &self.model.global_config().on_create_client_url {
            Some(hook) => hook(self.model.name(), self.model.config()).await,
            None => self.model.create_ai_client_url(),
        }
    }

    fn announce(&self, client: &ClientHandle, started: &mut bool) {
        if !*started {
            *started = true;
            let _ = self.tx.send(ChatEvent::Started(client.clone()));
        }
    }
}

use std::sync::{Arc, Mutex};

use aieditor_core::client::{AiClient, ClientListener, ClientState, EventSink, StateCell};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Persistent socket exchange. Payloads passed to `start` are queued and
/// written as text messages once the socket is open; every inbound message
/// becomes one raw chunk.
pub struct WebSocketClient {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    state: StateCell,
    cancel: CancellationToken,
    sink: EventSink,
    outbox: mpsc::UnboundedSender<String>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl WebSocketClient {
    pub fn new<S: Into<String>>(url: S, listener: ClientListener) -> Self {
        let (outbox, pending) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                state: StateCell::new(ClientState::Idle),
                cancel: CancellationToken::new(),
                sink: EventSink::new(listener),
                outbox,
                pending: Mutex::new(Some(pending)),
            }),
        }
    }
}

impl AiClient for WebSocketClient {
    fn start(&self, payload: String) {
        if matches!(self.inner.state.get(), ClientState::Closing | ClientState::Closed) {
            warn!(target: "providers::ws", "start ignored; socket closed");
            return;
        }
        let _ = self.inner.outbox.send(payload);
        if self.inner.state.transition(ClientState::Idle, ClientState::Connecting) {
            let pending = self.inner.pending.lock().ok().and_then(|mut p| p.take());
            if let Some(outbox) = pending {
                let inner = self.inner.clone();
                tokio::spawn(inner.run(outbox));
            }
        }
    }

    fn stop(&self) {
        let state = &self.inner.state;
        if state.transition(ClientState::Idle, ClientState::Closed) {
            self.inner.sink.stopped();
            return;
        }
        if state.transition(ClientState::Connecting, ClientState::Closing)
            || state.transition(ClientState::Open, ClientState::Closing)
        {
            self.inner.cancel.cancel();
        }
    }

    fn state(&self) -> ClientState {
        self.inner.state.get()
    }
}

impl Inner {
    async fn run(self: Arc<Self>, mut outbox: mpsc::UnboundedReceiver<String>) {
        info!(target: "providers::ws", url = %redact(&self.url), "open socket");
        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.finish(),
            res = tokio_tungstenite::connect_async(self.url.as_str()) => res,
        };
        let mut ws = match connected {
            Ok((ws, _resp)) => ws,
            Err(e) => {
                error!(target: "providers::ws", error = %e, "socket connect failed");
                return self.finish();
            }
        };
        if self.state.transition(ClientState::Connecting, ClientState::Open) {
            self.sink.started();
        }

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let frame = CloseFrame { code: CloseCode::Normal, reason: "client stop".into() };
                    if let Err(e) = ws.close(Some(frame)).await {
                        debug!(target: "providers::ws", error = %e, "close handshake failed");
                    }
                    break;
                }
                Some(payload) = outbox.recv() => {
                    if let Err(e) = ws.send(Message::Text(payload.into())).await {
                        error!(target: "providers::ws", error = %e, "send failed");
                        break;
                    }
                }
                inbound = ws.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if self.cancel.is_cancelled() || !self.sink.chunk(text.as_str().to_owned()) {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => {
                            if self.cancel.is_cancelled() || !self.sink.chunk(text) {
                                break;
                            }
                        }
                        Err(_) => debug!(target: "providers::ws", len = bytes.len(), "dropping non utf-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        match frame {
                            Some(f) if f.code != CloseCode::Normal => {
                                warn!(target: "providers::ws", code = u16::from(f.code), reason = %f.reason.as_str(), "socket closed abnormally")
                            }
                            _ => debug!(target: "providers::ws", "socket closed"),
                        }
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(target: "providers::ws", error = %e, "socket error");
                        break;
                    }
                    None => {
                        warn!(target: "providers::ws", "socket ended without close frame");
                        break;
                    }
                }
            }
        }
        self.finish();
    }

    fn finish(&self) {
        self.state.set(ClientState::Closed);
        self.sink.stopped();
    }
}

/// Signed URLs carry credentials in the query string.
fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

use std::sync::Arc;

use aieditor_core::client::{AiClient, ClientListener, ClientState, EventSink, StateCell};
use aieditor_core::AiError;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, Method};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::decoder::frame_stream;

#[derive(Clone, Debug)]
pub struct SseOptions {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    /// Data value that ends the stream; never forwarded as a chunk.
    pub done_sentinel: Option<String>,
}

impl SseOptions {
    pub fn post<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            method: Method::POST,
            headers: Vec::new(),
            done_sentinel: Some("[DONE]".to_string()),
        }
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_done_sentinel(mut self, sentinel: Option<String>) -> Self {
        self.done_sentinel = sentinel;
        self
    }
}

/// Streams one HTTP request whose response is `text/event-stream`, forwarding
/// each data frame as a raw chunk.
pub struct SseClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    url: String,
    method: Method,
    headers: HeaderMap,
    done_sentinel: Option<String>,
    state: StateCell,
    cancel: CancellationToken,
    sink: EventSink,
}

impl SseClient {
    pub fn new(http: Client, options: SseOptions, listener: ClientListener) -> Result<Self, AiError> {
        let mut headers = HeaderMap::new();
        for (k, v) in &options.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| AiError::Config(format!("header name `{k}`: {e}")))?;
            let value = HeaderValue::from_str(v)
                .map_err(|e| AiError::Config(format!("header `{k}`: {e}")))?;
            headers.insert(name, value);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                url: options.url,
                method: options.method,
                headers,
                done_sentinel: options.done_sentinel,
                state: StateCell::new(ClientState::Idle),
                cancel: CancellationToken::new(),
                sink: EventSink::new(listener),
            }),
        })
    }
}

impl AiClient for SseClient {
    fn start(&self, payload: String) {
        if !self.inner.state.transition(ClientState::Idle, ClientState::Connecting) {
            warn!(target: "providers::sse", state = ?self.inner.state.get(), "start ignored; client already used");
            return;
        }
        self.inner.sink.started();
        let inner = self.inner.clone();
        tokio::spawn(inner.run(payload));
    }

    fn stop(&self) {
        match self.inner.state.swap(ClientState::Closed) {
            ClientState::Closed => {}
            ClientState::Idle => self.inner.sink.stopped(),
            _ => self.inner.cancel.cancel(),
        }
    }

    fn state(&self) -> ClientState {
        self.inner.state.get()
    }
}

impl Inner {
    async fn run(self: Arc<Self>, payload: String) {
        info!(target: "providers::sse", url = %self.url, method = %self.method, "open event stream");
        let request = self
            .http
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, "text/event-stream")
            .body(payload);

        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.finish(),
            res = request.send() => res,
        };
        let resp = match sent {
            Ok(r) => r,
            Err(e) => {
                error!(target: "providers::sse", url = %self.url, error = %e, "request failed");
                return self.finish();
            }
        };
        if !resp.status().is_success() {
            let status = resp.status();
            let body = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                text = resp.text() => text.ok(),
            };
            error!(target: "providers::sse", status = %status, body = ?body, "non-success status");
            return self.finish();
        }
        self.state.transition(ClientState::Connecting, ClientState::Open);

        let mut frames = Box::pin(frame_stream(resp));
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                f = frames.next() => f,
            };
            match next {
                Some(Ok(frame)) => {
                    let Some(data) = frame.data else { continue };
                    if self.done_sentinel.as_deref() == Some(data.as_str()) {
                        debug!(target: "providers::sse", "done sentinel received");
                        break;
                    }
                    if self.cancel.is_cancelled() || !self.sink.chunk(data) {
                        break;
                    }
                }
                Some(Err(e)) => {
                    error!(target: "providers::sse", error = %e, "stream interrupted");
                    break;
                }
                None => break,
            }
        }
        self.finish();
    }

    fn finish(&self) {
        self.state.set(ClientState::Closed);
        self.sink.stopped();
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use aieditor_core::chat;
use aieditor_core::client::{AiClient, ClientEvent, ClientState};
use aieditor_core::config::{AiGlobalConfig, CustomModelConfig, ModelConfig, Protocol};
use aieditor_providers::client::WebSocketClient;
use aieditor_providers::ModelRegistry;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{accept_async, WebSocketStream};

type ServerSocket = WebSocketStream<TcpStream>;

/// Accepts one socket on a random port and hands it to `handler`.
async fn serve<F, Fut>(handler: F) -> String
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        handler(ws).await;
    });
    format!("ws://{addr}/chat")
}

async fn next_text(ws: &mut ServerSocket) -> Option<String> {
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(t)) => return Some(t.as_str().to_owned()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("socket went silent")
        .expect("listener closed")
}

async fn drain(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut out = Vec::new();
    loop {
        let ev = recv(rx).await;
        let done = ev == ClientEvent::Stopped;
        out.push(ev);
        if done {
            return out;
        }
    }
}

#[tokio::test]
async fn echoes_payload_and_stops_on_normal_close() {
    let url = serve(|mut ws| async move {
        if let Some(text) = next_text(&mut ws).await {
            ws.send(Message::Text(format!("echo:{text}").into())).await.unwrap();
            ws.send(Message::Binary(b"bytes".to_vec().into())).await.unwrap();
        }
        let _ = ws.close(None).await;
    })
    .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket = WebSocketClient::new(url, tx);
    socket.start("hi".into());

    assert_eq!(
        drain(&mut rx).await,
        vec![
            ClientEvent::Started,
            ClientEvent::Chunk("echo:hi".into()),
            ClientEvent::Chunk("bytes".into()),
            ClientEvent::Stopped,
        ]
    );
    assert_eq!(socket.state(), ClientState::Closed);
}

#[tokio::test]
async fn payloads_queued_before_open_are_sent_in_order() {
    let url = serve(|mut ws| async move {
        for _ in 0..2 {
            match next_text(&mut ws).await {
                Some(text) => ws.send(Message::Text(text.into())).await.unwrap(),
                None => return,
            }
        }
        let _ = ws.close(None).await;
    })
    .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket = WebSocketClient::new(url, tx);
    socket.start("one".into());
    socket.start("two".into());

    let chunks: Vec<ClientEvent> = drain(&mut rx)
        .await
        .into_iter()
        .filter(|e| matches!(e, ClientEvent::Chunk(_)))
        .collect();
    assert_eq!(chunks, vec![ClientEvent::Chunk("one".into()), ClientEvent::Chunk("two".into())]);
}

#[tokio::test]
async fn abnormal_close_still_stops() {
    let url = serve(|mut ws| async move {
        let _ = next_text(&mut ws).await;
        let frame = CloseFrame {
            code: CloseCode::Error,
            reason: "overloaded".into(),
        };
        let _ = ws.close(Some(frame)).await;
    })
    .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket = WebSocketClient::new(url, tx);
    socket.start("hi".into());
    assert_eq!(drain(&mut rx).await, vec![ClientEvent::Started, ClientEvent::Stopped]);
}

#[tokio::test]
async fn messages_after_stop_never_arrive() {
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let url = serve(move |mut ws| async move {
        let _ = next_text(&mut ws).await;
        ws.send(Message::Text("first".into())).await.unwrap();
        let _ = go_rx.await;
        let _ = ws.send(Message::Text("late".into())).await;
    })
    .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket = WebSocketClient::new(url, tx);
    socket.start("hi".into());
    assert_eq!(recv(&mut rx).await, ClientEvent::Started);
    assert_eq!(recv(&mut rx).await, ClientEvent::Chunk("first".into()));

    socket.stop();
    let _ = go_tx.send(());
    socket.stop();

    assert_eq!(recv(&mut rx).await, ClientEvent::Stopped);
    assert!(timeout(Duration::from_millis(200), rx.recv()).await.ok().flatten().is_none());
    assert_eq!(socket.state(), ClientState::Closed);
}

#[tokio::test]
async fn stop_sends_a_normal_close_frame() {
    let (closed_tx, closed_rx) = oneshot::channel::<Option<CloseCode>>();
    let url = serve(move |mut ws| async move {
        let _ = next_text(&mut ws).await;
        ws.send(Message::Text("first".into())).await.unwrap();
        let mut code = None;
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Close(frame) = msg {
                code = frame.map(|f| f.code);
                break;
            }
        }
        let _ = closed_tx.send(code);
    })
    .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket = WebSocketClient::new(url, tx);
    socket.start("hi".into());
    assert_eq!(recv(&mut rx).await, ClientEvent::Started);
    assert_eq!(recv(&mut rx).await, ClientEvent::Chunk("first".into()));
    socket.stop();
    assert_eq!(recv(&mut rx).await, ClientEvent::Stopped);

    let code = timeout(Duration::from_secs(5), closed_rx).await.unwrap().unwrap();
    assert_eq!(code, Some(CloseCode::Normal));
}

#[tokio::test]
async fn stop_before_start_and_start_after_stop() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket = WebSocketClient::new("ws://127.0.0.1:9/never", tx);
    socket.stop();
    socket.start("ignored".into());
    assert_eq!(drain(&mut rx).await, vec![ClientEvent::Stopped]);
    assert_eq!(socket.state(), ClientState::Closed);
}

#[tokio::test]
async fn failed_handshake_stops() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket = WebSocketClient::new(format!("ws://127.0.0.1:{port}/"), tx);
    socket.start("hi".into());
    assert_eq!(drain(&mut rx).await, vec![ClientEvent::Stopped]);
}

#[tokio::test]
async fn custom_model_over_websocket() {
    let url = serve(|mut ws| async move {
        if let Some(text) = next_text(&mut ws).await {
            for word in text.split(' ') {
                ws.send(Message::Text(format!("{} ", word.to_uppercase()).into()))
                    .await
                    .unwrap();
            }
        }
        let _ = ws.close(None).await;
    })
    .await;

    let cfg = AiGlobalConfig::new().with_model(
        "custom",
        ModelConfig::Custom(CustomModelConfig::new(url).with_protocol(Protocol::WebSocket)),
    );
    let registry = ModelRegistry::new(Arc::new(cfg));
    let events = chat(registry.get("custom").unwrap(), "", "make it loud").unwrap();
    let text = timeout(Duration::from_secs(5), events.collect_text()).await.unwrap();
    assert_eq!(text, "MAKE IT LOUD ");
}

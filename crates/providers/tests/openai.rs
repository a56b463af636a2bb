use std::sync::{Arc, Mutex};
use std::time::Duration;

use aieditor_core::config::{AiGlobalConfig, ModelConfig, OpenAiModelConfig};
use aieditor_core::editor::{apply_stream, EditorCommands, Placement};
use aieditor_core::{chat, ChatEvent};
use aieditor_providers::ModelRegistry;
use futures::StreamExt;
use serde_json::json;
use tokio::time::timeout;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM: &str = concat!(
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Bon\"}}]}\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"jour\"}}]}\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[]}\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
);

async fn mock_openai() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "stream": true,
            "messages": [{ "role": "user", "content": "Translate: hello" }],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(STREAM, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn openai_config(server: &MockServer) -> AiGlobalConfig {
    AiGlobalConfig::new()
        .with_model(
            "openai",
            ModelConfig::OpenAi(
                OpenAiModelConfig::new("sk-test")
                    .with_endpoint(format!("{}/", server.uri()))
                    .with_model("gpt-4o-mini"),
            ),
        )
        .with_prompt_template("{prompt}: {content}")
}

#[tokio::test]
async fn streams_a_completion_through_the_registry() {
    let server = mock_openai().await;
    let consumed = Arc::new(Mutex::new(Vec::new()));
    let seen = consumed.clone();
    let cfg = openai_config(&server).on_token_consume(move |name, _cfg, count| {
        seen.lock().unwrap().push((name.to_string(), count));
    });
    let registry = ModelRegistry::new(Arc::new(cfg));
    let model = registry.get("openai").unwrap();

    let events = chat(model, "hello", "Translate").unwrap();
    let all: Vec<ChatEvent> = timeout(Duration::from_secs(5), events.collect()).await.unwrap();

    assert!(matches!(all.first(), Some(ChatEvent::Started(_))));
    assert!(matches!(all.last(), Some(ChatEvent::Stopped)));
    let contents: Vec<String> = all
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Message(m) => Some(m.content.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(contents, vec!["", "Bon", "jour", ""]);
    assert!(matches!(all.get(all.len() - 2), Some(ChatEvent::Message(m)) if m.is_done()));

    assert_eq!(*consumed.lock().unwrap(), vec![("openai".to_string(), 7)]);
}

#[tokio::test]
async fn collects_text_into_the_editor() {
    struct Line(String);

    impl EditorCommands for Line {
        fn selected_text(&self) -> String {
            "hello".to_string()
        }
        fn insert_text(&mut self, text: &str, position: usize) {
            let at: usize = self.0.chars().take(position).map(char::len_utf8).sum();
            self.0.insert_str(at, text);
        }
        fn replace_range(&mut self, from: usize, to: usize, text: &str) {
            let mut chars: Vec<char> = self.0.chars().collect();
            chars.splice(from..to, text.chars());
            self.0 = chars.into_iter().collect();
        }
    }

    let server = mock_openai().await;
    let registry = ModelRegistry::new(Arc::new(openai_config(&server)));
    let model = registry.get("auto").unwrap();

    let mut line = Line("say hello!".to_string());
    let selected = line.selected_text();
    let mut events = chat(model, &selected, "Translate").unwrap();
    let written = timeout(
        Duration::from_secs(5),
        apply_stream(&mut events, &mut line, Placement::ReplaceRange { from: 4, to: 9 }),
    )
    .await
    .unwrap();

    assert_eq!(written, 7);
    assert_eq!(line.0, "say Bonjour!");
}

#[tokio::test]
async fn unreachable_endpoint_yields_only_stopped() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let cfg = AiGlobalConfig::new().with_model(
        "openai",
        ModelConfig::OpenAi(OpenAiModelConfig::new("sk").with_endpoint(format!("http://127.0.0.1:{port}"))),
    );
    let registry = ModelRegistry::new(Arc::new(cfg));
    let events = chat(registry.get("openai").unwrap(), "", "hi").unwrap();
    let text = timeout(Duration::from_secs(5), events.collect_text()).await.unwrap();
    assert_eq!(text, "");
}

//! Local-model provider (Ollama chat wire format)
//!
//! No credential and no SSE envelope: a `stream` flag selects between one
//! JSON object and newline-delimited JSON objects, the last of which carries
//! `"done": true`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::transport::{self, HttpTransport, StreamStep};
use super::{ChatProvider, FragmentStream, ResolvedOptions};
use crate::config::AiConfig;
use crate::error::{AiError, Result};
use crate::session::{ChatMessage, Role};

/// Default local chat endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/chat";

const NAME: &str = "local";

#[derive(Debug, Serialize)]
struct LocalRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<WireMessage<'a>>,
    options: SamplingOptions,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct LocalResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Stream chunks may omit `content` (e.g. the final `done` line).
#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct LocalChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
}

/// Adapter for a local model server.
pub struct LocalProvider {
    transport: HttpTransport,
}

impl LocalProvider {
    /// Create an adapter.
    ///
    /// # Arguments
    /// * `endpoint` - Full chat URL
    /// * `timeout` - Per-request timeout
    /// * `client` - Shared client to borrow, or `None` to own a new one
    pub fn new(endpoint: &str, timeout: Duration, client: Option<Client>) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(NAME, endpoint, timeout, client)?,
        })
    }

    /// Create an adapter from the gateway configuration. The credential is
    /// ignored.
    pub fn from_config(config: &AiConfig, client: Option<Client>) -> Result<Self> {
        Self::new(
            config.endpoint().unwrap_or(DEFAULT_ENDPOINT),
            config.timeout(),
            client,
        )
    }

    /// The URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }
}

/// The system prompt is prepended only when the conversation has no system
/// message of its own.
fn build_messages<'a>(messages: &'a [ChatMessage], system_prompt: &'a str) -> Vec<WireMessage<'a>> {
    let mut wire: Vec<WireMessage<'a>> = messages
        .iter()
        .map(|m| WireMessage {
            role: m.role,
            content: &m.content,
        })
        .collect();
    let has_system = messages.iter().any(|m| m.role == Role::System);
    if !system_prompt.is_empty() && !has_system {
        wire.insert(
            0,
            WireMessage {
                role: Role::System,
                content: system_prompt,
            },
        );
    }
    wire
}

fn build_request<'a>(
    messages: &'a [ChatMessage],
    system_prompt: &'a str,
    options: &'a ResolvedOptions,
    stream: bool,
) -> LocalRequest<'a> {
    LocalRequest {
        model: &options.model,
        stream,
        messages: build_messages(messages, system_prompt),
        options: SamplingOptions {
            temperature: options.temperature,
            num_predict: options.max_tokens,
        },
    }
}

/// Parse one NDJSON line of a streamed reply.
fn parse_stream_line(line: &str) -> Result<StreamStep> {
    let chunk: LocalChunk = serde_json::from_str(line)
        .map_err(|e| AiError::ResponseParse(format!("{}: bad stream line: {}", NAME, e)))?;
    let mut step = StreamStep::text(chunk.message.map(|m| m.content));
    step.done = chunk.done;
    Ok(step)
}

#[async_trait]
impl ChatProvider for LocalProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
        options: &ResolvedOptions,
    ) -> Result<String> {
        let request = build_request(messages, system_prompt, options, false);
        let response: LocalResponse = self.transport.post_json(&Vec::new(), &request).await?;
        Ok(response.message.content)
    }

    fn stream_chat(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
        options: &ResolvedOptions,
    ) -> FragmentStream {
        let request = build_request(messages, system_prompt, options, true);
        let lines = self.transport.post_lines(&Vec::new(), &request);
        transport::fragments(lines, parse_stream_line)
    }

    fn close(&self) {
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use futures::StreamExt;
    use mockito::Matcher;
    use serde_json::json;

    fn options() -> ResolvedOptions {
        ResolvedOptions {
            model: "llama3".into(),
            temperature: 0.25,
            max_tokens: 64,
        }
    }

    fn provider(url: &str) -> LocalProvider {
        LocalProvider::new(url, Duration::from_secs(5), None).unwrap()
    }

    #[test]
    fn test_default_endpoint_without_credential() {
        let p = LocalProvider::from_config(&AiConfig::default(), None).unwrap();
        assert_eq!(p.endpoint(), DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_request_serialization() {
        let messages = vec![ChatMessage::user("hi")];
        let opts = options();
        let value = serde_json::to_value(build_request(&messages, "sys", &opts, false)).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "llama3",
                "stream": false,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hi"}
                ],
                "options": {"temperature": 0.25, "num_predict": 64}
            })
        );
    }

    #[test]
    fn test_existing_system_message_wins() {
        let messages = vec![ChatMessage::system("own rules"), ChatMessage::user("hi")];
        let wire = build_messages(&messages, "ignored");
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].content, "own rules");
    }

    #[test]
    fn test_parse_stream_line() {
        let step = parse_stream_line(r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#)
            .unwrap();
        assert_eq!(step.text.as_deref(), Some("Hi"));
        assert!(!step.done);

        let step =
            parse_stream_line(r#"{"message":{"role":"assistant","content":"!"},"done":true}"#).unwrap();
        assert_eq!(step.text.as_deref(), Some("!"));
        assert!(step.done);

        let err = parse_stream_line("not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResponseParse);
    }

    #[tokio::test]
    async fn test_chat_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({"stream": false, "model": "llama3"})))
            .with_status(200)
            .with_body(r#"{"model":"llama3","message":{"role":"assistant","content":"Local hi"},"done":true}"#)
            .create_async()
            .await;

        let p = provider(&format!("{}/api/chat", server.url()));
        let text = p.chat(&[ChatMessage::user("hi")], "", &options()).await.unwrap();
        assert_eq!(text, "Local hi");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_missing_message_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"model":"llama3","done":true}"#)
            .create_async()
            .await;

        let p = provider(&format!("{}/api/chat", server.url()));
        let err = p.chat(&[ChatMessage::user("hi")], "", &options()).await;
        assert_eq!(err.unwrap_err().kind(), ErrorKind::ResponseParse);
    }

    #[tokio::test]
    async fn test_chat_missing_content_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"message":{"role":"assistant"},"done":true}"#)
            .create_async()
            .await;

        let p = provider(&format!("{}/api/chat", server.url()));
        let err = p.chat(&[ChatMessage::user("hi")], "", &options()).await;
        assert_eq!(err.unwrap_err().kind(), ErrorKind::ResponseParse);
    }

    #[test]
    fn test_stream_line_without_content_is_empty() {
        let step = parse_stream_line(r#"{"message":{"role":"assistant"},"done":true}"#).unwrap();
        assert_eq!(step.text, None);
        assert!(step.done);
    }

    #[tokio::test]
    async fn test_stream_chat_stops_at_done() {
        let body = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Shard \"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"online\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"late\"},\"done\":false}\n",
        );
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({"stream": true})))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let p = provider(&format!("{}/api/chat", server.url()));
        let fragments: Vec<String> = p
            .stream_chat(&[ChatMessage::user("status?")], "", &options())
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Shard ", "online"]);
    }

    #[tokio::test]
    async fn test_stream_bad_line_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body("{\"message\":{\"content\":\"ok\"},\"done\":false}\n<html>\n")
            .create_async()
            .await;

        let p = provider(&format!("{}/api/chat", server.url()));
        let items: Vec<Result<String>> = p
            .stream_chat(&[ChatMessage::user("status?")], "", &options())
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "ok");
        assert_eq!(items[1].as_ref().unwrap_err().kind(), ErrorKind::ResponseParse);
    }
}

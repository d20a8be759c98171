//! Completion-style provider (OpenAI Chat Completions wire format)
//!
//! The system prompt travels as a leading `system` message. Streaming uses
//! server-sent events: `data: {json}` lines carrying `choices[0].delta`,
//! terminated by `data: [DONE]`.
//!
//! # Example
//!
//! ```rust,ignore
//! use dst_ai_gateway::providers::{ChatOptions, ChatProvider, CompletionProvider};
//! use dst_ai_gateway::session::ChatMessage;
//!
//! async fn example(config: dst_ai_gateway::config::AiConfig) {
//!     let provider = CompletionProvider::from_config(&config, None).unwrap();
//!     let options = ChatOptions::new().resolve(&config);
//!     let text = provider
//!         .chat(&[ChatMessage::user("Hello!")], "You are a helpful assistant.", &options)
//!         .await
//!         .unwrap();
//!     println!("{}", text);
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::transport::{self, Headers, HttpTransport, StreamStep};
use super::{require_credential, ChatProvider, FragmentStream, ResolvedOptions};
use crate::config::AiConfig;
use crate::error::{AiError, Result};
use crate::session::{ChatMessage, Role};

/// Default Chat Completions endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

const NAME: &str = "completion";

const DONE_SENTINEL: &str = "[DONE]";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, PartialEq)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// Provider
// ============================================================================

/// Adapter for chat-completions style APIs.
pub struct CompletionProvider {
    credential: String,
    transport: HttpTransport,
}

impl CompletionProvider {
    /// Create an adapter.
    ///
    /// # Arguments
    /// * `credential` - API key, sent as a bearer token
    /// * `endpoint` - Full chat completions URL
    /// * `timeout` - Per-request timeout
    /// * `client` - Shared client to borrow, or `None` to own a new one
    pub fn new(
        credential: &str,
        endpoint: &str,
        timeout: Duration,
        client: Option<Client>,
    ) -> Result<Self> {
        Ok(Self {
            credential: credential.to_string(),
            transport: HttpTransport::new(NAME, endpoint, timeout, client)?,
        })
    }

    /// Create an adapter from the gateway configuration.
    pub fn from_config(config: &AiConfig, client: Option<Client>) -> Result<Self> {
        Self::new(
            &config.credential,
            config.endpoint().unwrap_or(DEFAULT_ENDPOINT),
            config.timeout(),
            client,
        )
    }

    /// The URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    fn headers(&self) -> Headers {
        vec![("Authorization", format!("Bearer {}", self.credential))]
    }
}

/// System prompt first, then the conversation unchanged.
fn build_messages<'a>(messages: &'a [ChatMessage], system_prompt: &'a str) -> Vec<WireMessage<'a>> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    if !system_prompt.is_empty() {
        wire.push(WireMessage {
            role: Role::System,
            content: system_prompt,
        });
    }
    wire.extend(messages.iter().map(|m| WireMessage {
        role: m.role,
        content: &m.content,
    }));
    wire
}

fn build_request<'a>(
    messages: &'a [ChatMessage],
    system_prompt: &'a str,
    options: &'a ResolvedOptions,
    stream: bool,
) -> CompletionRequest<'a> {
    CompletionRequest {
        model: &options.model,
        messages: build_messages(messages, system_prompt),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        stream: stream.then_some(true),
    }
}

/// Parse one SSE line of a streamed completion.
fn parse_stream_line(line: &str) -> Result<StreamStep> {
    let data = match transport::sse_data(line) {
        Some(data) if !data.is_empty() => data,
        _ => return Ok(StreamStep::skip()),
    };
    if data == DONE_SENTINEL {
        return Ok(StreamStep::done());
    }

    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| AiError::ResponseParse(format!("{}: bad stream chunk: {}", NAME, e)))?;
    // Usage-only chunks carry an empty choices list
    match chunk.choices.into_iter().next() {
        Some(choice) => Ok(StreamStep::text(choice.delta.content)),
        None => Ok(StreamStep::skip()),
    }
}

#[async_trait]
impl ChatProvider for CompletionProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
        options: &ResolvedOptions,
    ) -> Result<String> {
        require_credential(NAME, &self.credential)?;

        let request = build_request(messages, system_prompt, options, false);
        let response: CompletionResponse =
            self.transport.post_json(&self.headers(), &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AiError::ResponseParse(format!("{}: response has no choices", NAME)))
    }

    fn stream_chat(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
        options: &ResolvedOptions,
    ) -> FragmentStream {
        if let Err(err) = require_credential(NAME, &self.credential) {
            return transport::failed(err);
        }

        let request = build_request(messages, system_prompt, options, true);
        let lines = self.transport.post_lines(&self.headers(), &request);
        transport::fragments(lines, parse_stream_line)
    }

    fn close(&self) {
        self.transport.close();
    }
}

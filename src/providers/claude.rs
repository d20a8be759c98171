//! Message-style provider (Anthropic Messages wire format)
//!
//! The system prompt is a separate top-level field and never part of the
//! message list; only `user` and `assistant` messages are sent. Streaming
//! frames are typed events (`content_block_start`, `content_block_delta`,
//! `message_stop`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::transport::{self, Headers, HttpTransport, StreamStep};
use super::{require_credential, ChatProvider, FragmentStream, ResolvedOptions};
use crate::config::AiConfig;
use crate::error::{AiError, Result};
use crate::session::{ChatMessage, Role};

/// Default Messages API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// The Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

const NAME: &str = "message";

// ============================================================================
// Wire Types
// ============================================================================

/// Messages API request body. `temperature` is not part of this shape.
#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    /// Omitted when the system prompt is empty
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: [TextBlock<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextBlock<'a> {
    #[serde(rename = "type")]
    block_type: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    text: String,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<EventText>,
    #[serde(default)]
    content_block: Option<EventText>,
    #[serde(default)]
    error: Option<EventError>,
}

#[derive(Debug, Deserialize)]
struct EventText {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventError {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

// ============================================================================
// Provider
// ============================================================================

/// Adapter for messages-style APIs.
pub struct MessageProvider {
    credential: String,
    transport: HttpTransport,
}

impl MessageProvider {
    /// Create an adapter.
    ///
    /// # Arguments
    /// * `credential` - API key, sent as `x-api-key`
    /// * `endpoint` - Full messages URL
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
        vec![
            ("x-api-key", self.credential.clone()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ]
    }
}

/// Keep only user and assistant turns, each as a single text block.
fn build_messages(messages: &[ChatMessage]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .map(|m| WireMessage {
            role: m.role,
            content: [TextBlock {
                block_type: "text",
                text: &m.content,
            }],
        })
        .collect()
}

fn build_request<'a>(
    messages: &'a [ChatMessage],
    system_prompt: &'a str,
    options: &'a ResolvedOptions,
    stream: bool,
) -> MessageRequest<'a> {
    MessageRequest {
        model: &options.model,
        max_tokens: options.max_tokens,
        messages: build_messages(messages),
        system: (!system_prompt.is_empty()).then_some(system_prompt),
        stream: stream.then_some(true),
    }
}

/// Map a mid-stream `error` event to a classified error.
fn stream_error(error: Option<EventError>) -> AiError {
    let error = error.unwrap_or(EventError {
        error_type: String::new(),
        message: "unknown stream error".to_string(),
    });
    let message = format!("{}: {} {}", NAME, error.error_type, error.message);
    match error.error_type.as_str() {
        "overloaded_error" | "api_error" => AiError::Transient(message),
        "rate_limit_error" => AiError::RateLimit(message),
        _ => AiError::Gateway(message),
    }
}

/// Parse one SSE line of a streamed message.
fn parse_stream_line(line: &str) -> Result<StreamStep> {
    let data = match transport::sse_data(line) {
        Some(data) if !data.is_empty() => data,
        _ => return Ok(StreamStep::skip()),
    };

    let event: StreamEvent = serde_json::from_str(data)
        .map_err(|e| AiError::ResponseParse(format!("{}: bad stream event: {}", NAME, e)))?;

    match event.event_type.as_str() {
        "content_block_delta" => Ok(StreamStep::text(event.delta.and_then(|d| d.text))),
        "content_block_start" => Ok(StreamStep::text(event.content_block.and_then(|b| b.text))),
        "message_stop" => Ok(StreamStep::done()),
        "error" => Err(stream_error(event.error)),
        _ => Ok(StreamStep::skip()),
    }
}

#[async_trait]
impl ChatProvider for MessageProvider {
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
        let response: MessageResponse =
            self.transport.post_json(&self.headers(), &request).await?;

        response
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| AiError::ResponseParse(format!("{}: response has no content", NAME)))
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

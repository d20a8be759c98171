//! Deterministic test double.
//!
//! Returns a fixed response or a fixed error without touching the network,
//! and counts how often it was invoked so gateway tests can assert on
//! cache hits and retry counts.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{transport, ChatProvider, FragmentStream, ResolvedOptions};
use crate::error::{AiError, Result};
use crate::session::ChatMessage;

/// Response of a mock built from configuration.
pub const DEFAULT_RESPONSE: &str = "mock";

/// Provider that answers without a backend.
///
/// # Example
/// ```
/// use dst_ai_gateway::providers::MockProvider;
///
/// let mock = MockProvider::new("fixed answer").with_fragments(&["fixed ", "answer"]);
/// assert_eq!(mock.calls(), 0);
/// ```
#[derive(Debug, Default)]
pub struct MockProvider {
    response: String,
    error: Option<AiError>,
    /// Results for the first calls, consumed in order before falling back to
    /// `response` / `error`
    scripted: Mutex<VecDeque<Result<String>>>,
    /// Stream fragments; `None` streams `response` as one fragment
    fragments: Option<Vec<String>>,
    /// Error yielded after all fragments
    stream_error: Option<AiError>,
    streaming: bool,
    calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

impl MockProvider {
    /// A mock that always answers `response`.
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            streaming: true,
            ..Self::default()
        }
    }

    /// A mock that always fails with `error`.
    pub fn failing(error: AiError) -> Self {
        Self {
            error: Some(error),
            streaming: true,
            ..Self::default()
        }
    }

    /// Queue results for the next whole-response calls.
    pub fn with_script(self, results: Vec<Result<String>>) -> Self {
        *self.scripted.lock().unwrap_or_else(PoisonError::into_inner) = results.into();
        self
    }

    /// Stream these fragments instead of the whole response.
    pub fn with_fragments(mut self, fragments: &[&str]) -> Self {
        self.fragments = Some(fragments.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Fail the stream with `error` after the fragments were delivered.
    pub fn with_stream_error(mut self, error: AiError) -> Self {
        self.stream_error = Some(error);
        self
    }

    /// Behave like a backend without a streaming endpoint.
    pub fn without_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    /// Number of `chat` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `stream_chat` invocations so far.
    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _system_prompt: &str,
        _options: &ResolvedOptions,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(result) = scripted {
            return result;
        }
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(self.response.clone()),
        }
    }

    fn stream_chat(
        &self,
        _messages: &[ChatMessage],
        _system_prompt: &str,
        _options: &ResolvedOptions,
    ) -> FragmentStream {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        if !self.streaming {
            return transport::failed(AiError::StreamingUnsupported(self.name().to_string()));
        }
        if let Some(err) = &self.error {
            return transport::failed(err.clone());
        }

        let mut items: Vec<Result<String>> = match &self.fragments {
            Some(fragments) => fragments.iter().cloned().map(Ok).collect(),
            None if self.response.is_empty() => Vec::new(),
            None => vec![Ok(self.response.clone())],
        };
        if let Some(err) = &self.stream_error {
            items.push(Err(err.clone()));
        }
        Box::pin(futures::stream::iter(items))
    }
}

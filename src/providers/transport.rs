//! HTTP plumbing shared by the remote adapters.
//!
//! Owns the client-ownership flag, per-request timeout, masked request
//! logging and status classification. Adapters only build bodies and parse
//! responses.

use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use super::{parse_provider_error, FragmentStream};
use crate::error::{AiError, Result};
use crate::utils::sanitize::mask_headers;

/// Header list as sent; values may be credentials.
pub(crate) type Headers = Vec<(&'static str, String)>;

pub(crate) struct HttpTransport {
    provider: &'static str,
    endpoint: String,
    timeout: Duration,
    /// `None` once an owned client has been closed
    client: Mutex<Option<Client>>,
    /// Whether `close()` may release the client
    owns_client: bool,
}

impl HttpTransport {
    /// # Arguments
    /// * `provider` - Name used in logs and errors
    /// * `endpoint` - Full URL requests are posted to
    /// * `timeout` - Applied to every request
    /// * `client` - Caller-supplied client (borrowed) or `None` to build one
    pub(crate) fn new(
        provider: &'static str,
        endpoint: &str,
        timeout: Duration,
        client: Option<Client>,
    ) -> Result<Self> {
        let (client, owns_client) = match client {
            Some(client) => (client, false),
            None => {
                let client = Client::builder()
                    .build()
                    .map_err(|e| AiError::Config(format!("cannot build HTTP client: {}", e)))?;
                (client, true)
            }
        };
        Ok(Self {
            provider,
            endpoint: endpoint.to_string(),
            timeout,
            client: Mutex::new(Some(client)),
            owns_client,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Client>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn owns_client(&self) -> bool {
        self.owns_client
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    /// Drop the client if this transport built it. A borrowed client is left
    /// untouched.
    pub(crate) fn close(&self) {
        if !self.owns_client {
            return;
        }
        if self.lock().take().is_some() {
            debug!(component = "provider", provider = self.provider, "HTTP client closed");
        }
    }

    /// Build a request without sending it.
    pub(crate) fn prepare<B: Serialize>(&self, headers: &Headers, body: &B) -> Result<Prepared> {
        let client = self.lock().clone().ok_or_else(|| {
            AiError::Gateway(format!("{}: HTTP client is closed", self.provider))
        })?;

        let mut builder = client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(body);
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }

        Ok(Prepared {
            provider: self.provider,
            url: self.endpoint.clone(),
            masked_headers: mask_headers(headers),
            builder,
        })
    }

    /// Post `body` and deserialize the success body.
    ///
    /// A success status whose body does not match `T` is a
    /// [`AiError::ResponseParse`].
    pub(crate) async fn post_json<B, T>(&self, headers: &Headers, body: &B) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let response = self.prepare(headers, body)?.send().await?;
        let text = response.text().await.map_err(|e| AiError::from_transport(&e))?;
        serde_json::from_str(&text).map_err(|e| {
            AiError::ResponseParse(format!("{}: unexpected response body: {}", self.provider, e))
        })
    }

    /// Post `body` and stream the response as trimmed, non-empty lines.
    ///
    /// Lazy: nothing is sent until the stream is first polled.
    pub(crate) fn post_lines<B: Serialize>(&self, headers: &Headers, body: &B) -> FragmentStream {
        let prepared = self.prepare(headers, body);
        Box::pin(async_stream::stream! {
            let response = match prepared {
                Ok(prepared) => prepared.send().await,
                Err(err) => Err(err),
            };
            let response = match response {
                Ok(response) => response,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(AiError::from_transport(&e));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw).trim().to_string();
                    if !line.is_empty() {
                        yield Ok(line);
                    }
                }
            }
            let rest = String::from_utf8_lossy(&buffer).trim().to_string();
            if !rest.is_empty() {
                yield Ok(rest);
            }
        })
    }
}

/// Outcome of parsing one streamed line.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct StreamStep {
    /// Fragment to forward, if the line carried non-empty text
    pub text: Option<String>,
    /// The line marks the end of the stream
    pub done: bool,
}

impl StreamStep {
    pub(crate) fn skip() -> Self {
        Self::default()
    }

    pub(crate) fn done() -> Self {
        Self {
            text: None,
            done: true,
        }
    }

    /// Forward `text` unless it is empty.
    pub(crate) fn text(text: Option<String>) -> Self {
        Self {
            text: text.filter(|t| !t.is_empty()),
            done: false,
        }
    }
}

/// Turn a line stream into a fragment stream using an adapter's line parser.
///
/// Ends at the first `done` step or the first error.
pub(crate) fn fragments<F>(mut lines: FragmentStream, parse: F) -> FragmentStream
where
    F: Fn(&str) -> Result<StreamStep> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        while let Some(line) = lines.next().await {
            let step = match line.and_then(|line| parse(&line)) {
                Ok(step) => step,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            if let Some(text) = step.text {
                yield Ok(text);
            }
            if step.done {
                return;
            }
        }
    })
}

/// A stream whose only item is `err`.
pub(crate) fn failed(err: AiError) -> FragmentStream {
    Box::pin(futures::stream::once(async move { Err(err) }))
}

/// Strip the SSE `data:` marker. Other lines (`event:`, comments) yield `None`.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// A built request plus what is needed to log it safely.
pub(crate) struct Prepared {
    provider: &'static str,
    url: String,
    masked_headers: Vec<(String, String)>,
    builder: RequestBuilder,
}

impl Prepared {
    /// Send and classify: transport failures and non-success statuses become
    /// classified errors.
    pub(crate) async fn send(self) -> Result<Response> {
        debug!(
            component = "provider",
            provider = self.provider,
            url = %self.url,
            headers = ?self.masked_headers,
            "Sending request"
        );

        let response = self.builder.send().await.map_err(|e| {
            let err = AiError::from_transport(&e);
            warn!(component = "provider", provider = self.provider, error = %err, "Request failed");
            err
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = parse_provider_error(status.as_u16(), &body);
            warn!(
                component = "provider",
                provider = self.provider,
                status = status.as_u16(),
                error = %err,
                "Provider returned error status"
            );
            return Err(err);
        }

        debug!(
            component = "provider",
            provider = self.provider,
            status = status.as_u16(),
            "Received response"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transport(url: &str, client: Option<Client>) -> HttpTransport {
        HttpTransport::new("test", url, Duration::from_secs(5), client).unwrap()
    }

    #[test]
    fn test_owned_client_closes_once() {
        let t = transport("http://localhost:1/x", None);
        assert!(t.owns_client());
        t.close();
        assert!(t.is_closed());
        t.close();
        assert!(t.is_closed());

        let err = t.prepare(&Vec::new(), &json!({})).err().unwrap();
        assert!(matches!(err, AiError::Gateway(_)));
    }

    #[test]
    fn test_borrowed_client_never_closed() {
        let t = transport("http://localhost:1/x", Some(Client::new()));
        assert!(!t.owns_client());
        t.close();
        assert!(!t.is_closed());
        assert!(t.prepare(&Vec::new(), &json!({})).is_ok());
    }

    #[test]
    fn test_sse_data() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data("event: message_stop"), None);
        assert_eq!(sse_data(": keep-alive"), None);
    }

    #[test]
    fn test_stream_step_drops_empty_text() {
        assert_eq!(StreamStep::text(Some(String::new())), StreamStep::skip());
        assert_eq!(StreamStep::text(Some("a".into())).text.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_fragments_stops_at_done_and_error() {
        let lines: FragmentStream = Box::pin(futures::stream::iter(vec![
            Ok("a".to_string()),
            Ok("skip".to_string()),
            Ok("b!".to_string()),
            Ok("never".to_string()),
        ]));
        let out: Vec<String> = fragments(lines, |line| {
            Ok(match line {
                "skip" => StreamStep::skip(),
                "b!" => StreamStep {
                    text: Some("b".into()),
                    done: true,
                },
                other => StreamStep::text(Some(other.to_string())),
            })
        })
        .map(|r| r.unwrap())
        .collect()
        .await;
        assert_eq!(out, vec!["a", "b"]);

        let lines: FragmentStream = Box::pin(futures::stream::iter(vec![
            Ok("bad".to_string()),
            Ok("never".to_string()),
        ]));
        let out: Vec<Result<String>> = fragments(lines, |_| {
            Err(AiError::ResponseParse("bad line".into()))
        })
        .collect()
        .await;
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
    }

    #[tokio::test]
    async fn test_post_json_classifies_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat")
            .with_status(429)
            .with_body("too many requests")
            .create_async()
            .await;

        let t = transport(&format!("{}/chat", server.url()), None);
        let err = t
            .post_json::<_, serde_json::Value>(&Vec::new(), &json!({"a": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::RateLimit(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_json_invalid_body_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let t = transport(&format!("{}/chat", server.url()), None);
        let err = t
            .post_json::<_, serde_json::Value>(&Vec::new(), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::ResponseParse(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // port 1 is reserved and not listening
        let t = transport("http://127.0.0.1:1/chat", None);
        let err = t
            .post_json::<_, serde_json::Value>(&Vec::new(), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Transient(_)));
    }

    #[tokio::test]
    async fn test_post_lines_splits_and_flushes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/stream")
            .with_status(200)
            .with_body("first\n\n  second  \r\nlast-without-newline")
            .create_async()
            .await;

        let t = transport(&format!("{}/stream", server.url()), None);
        let lines: Vec<String> = t
            .post_lines(&Vec::new(), &json!({}))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["first", "second", "last-without-newline"]);
    }

    #[tokio::test]
    async fn test_post_lines_sends_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/stream")
            .match_header("x-api-key", "secret-value-123")
            .with_status(200)
            .with_body("ok\n")
            .create_async()
            .await;

        let t = transport(&format!("{}/stream", server.url()), None);
        let headers: Headers = vec![("x-api-key", "secret-value-123".to_string())];
        let lines: Vec<_> = t.post_lines(&headers, &json!({})).collect().await;
        assert_eq!(lines.len(), 1);
        mock.assert_async().await;
    }
}

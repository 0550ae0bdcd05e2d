//! Streaming client for an OpenAI-compatible chat completions endpoint.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Serialize;

use super::sse::SseDecoder;
use super::{CompletionError, CompletionRequest, CompletionService, CompletionStream};
use crate::config::{self, UpstreamConfig};
use crate::session::ConversationMessage;

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Chat completions client (Groq by default).
pub struct GroqClient {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl GroqClient {
    /// Build a client. Only the connect phase is bounded by a timeout;
    /// a streaming body may legitimately take a long time.
    pub fn new(config: UpstreamConfig) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base)
    }
}

#[async_trait]
impl CompletionService for GroqClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    fn has_valid_credential(&self) -> bool {
        config::is_api_key_valid(self.config.api_key.as_deref())
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, CompletionError> {
        let key = match self.config.api_key.as_deref() {
            Some(key) if self.has_valid_credential() => key,
            _ => {
                return Err(CompletionError::Authentication(
                    "credential not configured".into(),
                ))
            }
        };

        let body = WireRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        };

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Opening completion stream"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let text = response.text().await.unwrap_or_default();
            let message = upstream_error_message(&text);
            tracing::warn!(status = code, "Completion request rejected");
            return Err(match code {
                401 => CompletionError::Authentication(message),
                429 => CompletionError::RateLimited,
                _ => CompletionError::Upstream {
                    status: code,
                    message,
                },
            });
        }

        Ok(decode_sse_body(response.bytes_stream()))
    }
}

/// Pull `error.message` out of a JSON error body, else use the raw text.
fn upstream_error_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct Envelope {
        error: Inner,
    }
    #[derive(serde::Deserialize)]
    struct Inner {
        message: String,
    }

    match serde_json::from_str::<Envelope>(body) {
        Ok(env) => env.error.message,
        Err(_) => {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no response body".to_string()
            } else {
                trimmed.chars().take(300).collect()
            }
        }
    }
}

struct BodyState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, CompletionError>>,
    finished: bool,
}

/// Turn a raw SSE byte stream into a fragment stream.
///
/// A transport error ends the stream after being yielded once.
pub fn decode_sse_body<S, B, E>(body: S) -> CompletionStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<CompletionError> + Send + 'static,
{
    let state = BodyState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished || st.decoder.is_done() {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let decoded = st.decoder.feed(chunk.as_ref());
                    st.pending.extend(decoded);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.finished = true;
                    let decoded = st.decoder.finish();
                    st.pending.extend(decoded);
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn chunks(parts: &[&str]) -> Vec<Result<Vec<u8>, CompletionError>> {
        parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect()
    }

    #[tokio::test]
    async fn test_decode_body_across_chunks() {
        let body = futures::stream::iter(chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choi",
            "ces\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]));
        let out: Vec<_> = decode_sse_body(body).collect().await;
        let text: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(text, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_decode_body_transport_error_terminates() {
        let mut parts = chunks(&["data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n"]);
        parts.push(Err(CompletionError::Transport("connection reset".into())));
        parts.extend(chunks(&["data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n"]));

        let out: Vec<_> = decode_sse_body(futures::stream::iter(parts)).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok("a".to_string()));
        assert!(matches!(out[1], Err(CompletionError::Transport(_))));
    }

    #[test]
    fn test_upstream_error_message() {
        let body = r#"{"error":{"message":"Invalid API Key","type":"invalid_request_error"}}"#;
        assert_eq!(upstream_error_message(body), "Invalid API Key");
        assert_eq!(upstream_error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(upstream_error_message(""), "no response body");
    }

    #[test]
    fn test_credential_and_endpoint() {
        let client = GroqClient::new(UpstreamConfig {
            api_key: Some("gsk_your_key".into()),
            api_base: "http://127.0.0.1:9/v1".into(),
            model: "m".into(),
            connect_timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert!(!client.has_valid_credential());
        assert_eq!(client.endpoint(), "http://127.0.0.1:9/v1/chat/completions");
        assert_eq!(client.model(), "m");
    }

    #[tokio::test]
    async fn test_stream_without_credential_fails_before_network() {
        let client = GroqClient::new(UpstreamConfig::default()).unwrap();
        let request = CompletionRequest {
            model: "m".into(),
            messages: vec![],
            temperature: 0.2,
            max_tokens: 16,
        };
        let result = client.stream(request).await;
        assert!(matches!(result, Err(CompletionError::Authentication(_))));
    }
}

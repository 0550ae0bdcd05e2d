//! Completion-service boundary.
//!
//! The orchestrator only sees the [`CompletionService`] trait: an ordered
//! list of role-tagged messages goes in, a stream of text fragments comes
//! out. Dropping the stream releases the underlying connection.

mod error;
pub mod groq;
pub mod sse;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

pub use error::CompletionError;
pub use groq::GroqClient;
pub use sse::SseDecoder;

use crate::session::ConversationMessage;

/// Fragments of one streamed completion, terminated by end-of-stream.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

/// A single streaming completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ConversationMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// An opaque streaming text-completion service.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Model identifier recorded in audit entries.
    fn model(&self) -> &str;

    /// Whether a usable credential is configured. Checked before any call.
    fn has_valid_credential(&self) -> bool;

    /// Start a streaming completion.
    ///
    /// Errors returned here happen before the first fragment (connection,
    /// authentication, rate limiting). Later failures arrive in-stream.
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, CompletionError>;
}

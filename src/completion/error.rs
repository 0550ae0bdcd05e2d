//! Completion-service error types.

use thiserror::Error;

use crate::config::API_KEY_SETUP_MESSAGE;

/// Failures from the upstream completion service.
///
/// None of these are retried automatically; the caller may resubmit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl CompletionError {
    /// Returns true for rejected or missing credentials.
    ///
    /// Also catches providers that report a bad key with a generic status.
    pub fn is_authentication(&self) -> bool {
        match self {
            Self::Authentication(_) => true,
            Self::Upstream { status, message } => {
                let lower = message.to_ascii_lowercase();
                *status == 401
                    || lower.contains("invalid api key")
                    || lower.contains("invalid_api_key")
            }
            _ => false,
        }
    }

    /// Returns true if this error should be logged as a warning.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Text shown to the end user in the terminal `error` event.
    pub fn user_message(&self) -> String {
        if self.is_authentication() {
            API_KEY_SETUP_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 401 => Self::Authentication(err.to_string()),
            Some(status) if status.as_u16() == 429 => Self::RateLimited,
            Some(status) => Self::Upstream {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_decode() => Self::Protocol(err.to_string()),
            None => Self::Transport(err.to_string()),
        }
    }
}

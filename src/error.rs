//! Orchestrator error types.
//!
//! These are returned synchronously, before any turn stream exists. Upstream
//! failures during a turn are reported as the stream's terminal `error` event
//! instead.

use thiserror::Error;

/// Errors from the session and audit boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardrailError {
    /// Credential missing or placeholder; carries the setup message.
    #[error("{0}")]
    Configuration(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),
}

impl GuardrailError {
    /// Returns true for unknown session or scenario ids.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound(_) | Self::ScenarioNotFound(_))
    }

    /// Returns true if the caller can fix the request and resubmit.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, GuardrailError>;

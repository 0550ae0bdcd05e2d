//! Typed turn events and the stream that carries them.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::security::{Category, DataClassification};
use crate::session::SessionMode;

/// Guardrail outcome of a turn, sent before any content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailMetadata {
    pub mode: SessionMode,
    pub guardrails_triggered: Vec<String>,
    pub injection_detected: bool,
    pub deflected: bool,
    pub destructive_warning: bool,
    pub pii_redacted: bool,
    pub pii_categories: Vec<Category>,
    /// Text actually forwarded, when a guardrail rewrote the input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<DataClassification>,
}

impl GuardrailMetadata {
    /// Metadata for a turn that ran no checks.
    pub fn unchecked(mode: SessionMode) -> Self {
        Self {
            mode,
            guardrails_triggered: Vec::new(),
            injection_detected: false,
            deflected: false,
            destructive_warning: false,
            pii_redacted: false,
            pii_categories: Vec::new(),
            processed_input: None,
            classification: None,
        }
    }
}

/// One event of a turn.
///
/// A turn emits at most one `Metadata` first, then zero or more `Delta`,
/// then exactly one of `Done` or `Error`. A cancelled turn stops without a
/// terminal event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TurnEvent {
    Metadata(GuardrailMetadata),
    Delta {
        content: String,
    },
    Done {
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        /// Absent for one-shot scenario runs
        #[serde(rename = "turnCount", skip_serializing_if = "Option::is_none")]
        turn_count: Option<u32>,
    },
    Error {
        message: String,
    },
}

impl TurnEvent {
    pub fn delta(content: impl Into<String>) -> Self {
        Self::Delta {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Encode as a Server-Sent-Events frame.
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

/// Receiving half of a turn.
///
/// Dropping the stream cancels the turn: the relay stops, releases the
/// upstream connection and leaves the session untouched.
pub struct TurnStream {
    receiver: mpsc::Receiver<TurnEvent>,
    cancel: CancellationToken,
}

impl TurnStream {
    /// Create a new turn stream with sender/receiver pair.
    pub(crate) fn new(buffer_size: usize, cancel: CancellationToken) -> (TurnSender, Self) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        (
            TurnSender {
                sender,
                cancel: cancel.clone(),
            },
            Self { receiver, cancel },
        )
    }

    /// Receive the next event. `None` once the turn has ended.
    pub async fn next(&mut self) -> Option<TurnEvent> {
        self.receiver.recv().await
    }

    /// Stop the turn. Events already queued can still be read.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this turn, for handing to another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Collect all remaining events into a vector.
    pub async fn collect(mut self) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}

impl Stream for TurnStream {
    type Item = TurnEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for TurnStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Sending half, owned by the relay.
pub(crate) struct TurnSender {
    sender: mpsc::Sender<TurnEvent>,
    cancel: CancellationToken,
}

impl TurnSender {
    /// Send an event. Returns false if the turn was cancelled or the
    /// receiver is gone.
    pub(crate) async fn send(&self, event: TurnEvent) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.sender.send(event) => sent.is_ok(),
        }
    }

    /// Queue an event without waiting. Used for replies that fit the buffer.
    pub(crate) fn try_send(&self, event: TurnEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }

    #[cfg(test)]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

//! Turn spans.
//!
//! Every turn runs inside a `guardrail_turn` span. The outcome fields are
//! empty at creation and filled once the turn ends, whichever way it ends.

use std::fmt::Display;

use tracing::{field::Empty, info_span, Span};

use super::metrics::TurnOutcome;

/// Session label used for one-shot scenario runs.
const ONE_SHOT_SESSION: &str = "-";

/// Outcome recording on a turn span.
pub trait SpanExt {
    /// Record how a turn ended. `deltas` is the number of relayed fragments.
    fn record_turn(&self, outcome: TurnOutcome, latency_ms: u64, deltas: u64);

    /// Record a failed turn together with the upstream error.
    fn record_failure<E: Display>(&self, error: &E, latency_ms: u64);
}

impl SpanExt for Span {
    fn record_turn(&self, outcome: TurnOutcome, latency_ms: u64, deltas: u64) {
        self.record("status", outcome.as_str());
        self.record("latency_ms", latency_ms);
        self.record("deltas", deltas);
    }

    fn record_failure<E: Display>(&self, error: &E, latency_ms: u64) {
        self.record("status", TurnOutcome::Failed.as_str());
        self.record("latency_ms", latency_ms);
        self.record("error.message", error.to_string().as_str());
    }
}

/// Factory for `guardrail_turn` spans.
pub struct TurnSpan;

impl TurnSpan {
    /// Span for a turn on a session.
    pub fn new(session: &str, scenario: &str, mode: &str) -> Span {
        info_span!(
            "guardrail_turn",
            session = %session,
            scenario = %scenario,
            mode = %mode,
            status = Empty,
            error.message = Empty,
            latency_ms = Empty,
            deltas = Empty,
        )
    }

    /// Span for a one-shot scenario run, which has no session.
    pub fn one_shot(scenario: &str, mode: &str) -> Span {
        Self::new(ONE_SHOT_SESSION, scenario, mode)
    }
}

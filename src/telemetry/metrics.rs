//! Guardrail and turn metrics via the `metrics` facade.
//!
//! Recording is a no-op until the host installs a recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram};

pub const GUARDRAIL_TRIGGERED: &str = "guardrail_triggered_total";
pub const TURNS: &str = "turns_total";
pub const TURN_DURATION: &str = "turn_duration_ms";

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Deflected,
    Failed,
    Cancelled,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Deflected => "deflected",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Register metric descriptions with the installed recorder.
pub fn init_metrics() {
    describe_counter!(GUARDRAIL_TRIGGERED, "Guardrails triggered, by label");
    describe_counter!(TURNS, "Turns finished, by outcome");
    describe_histogram!(TURN_DURATION, "Turn duration in milliseconds");
}

pub fn record_guardrail(label: &str) {
    counter!(GUARDRAIL_TRIGGERED, "label" => label.to_string()).increment(1);
}

pub fn record_turn(outcome: TurnOutcome, duration_ms: u64) {
    counter!(TURNS, "outcome" => outcome.as_str()).increment(1);
    histogram!(TURN_DURATION).record(duration_ms as f64);
}

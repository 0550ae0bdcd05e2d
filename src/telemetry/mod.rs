//! Telemetry for the guardrail runtime.
//!
//! Provides structured logging, security event logging, turn spans, and
//! metrics recording.

mod logging;
mod metrics;
pub mod security_log;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{init_metrics, record_guardrail, record_turn, TurnOutcome};
pub use security_log::{log_security_event, SecurityEvent, SecuritySeverity};
pub use spans::{SpanExt, TurnSpan};

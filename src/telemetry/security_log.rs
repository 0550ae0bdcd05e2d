//! Security event logging for the guardrail pipeline.
//!
//! Structured log lines for guardrail decisions and session lifecycle, kept
//! separate from the audit log so operators can alert on them. Callers pass
//! labels and ids only; raw user text never goes through here.

use std::time::{SystemTime, UNIX_EPOCH};

/// Security event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    /// Injection blocked with a deflection reply.
    InjectionDeflected,
    /// Injection replaced with the sanitized placeholder.
    InjectionSanitized,
    /// PII or secrets redacted before an upstream call.
    PiiRedacted,
    /// Destructive command flagged for review.
    DestructiveFlagged,
    /// Completion credential missing or a placeholder.
    CredentialMissing,
    /// Completion service failed mid-turn.
    UpstreamFailure,
    /// Caller cancelled an in-flight turn.
    TurnCancelled,
    SessionCreated,
    SessionCleared,
    /// Session removed by capacity or TTL.
    SessionEvicted,
    AuditCleared,
}

impl SecurityEvent {
    /// Get the severity level for this event.
    pub fn severity(&self) -> SecuritySeverity {
        match self {
            Self::InjectionDeflected => SecuritySeverity::Warning,
            Self::InjectionSanitized => SecuritySeverity::Warning,
            Self::PiiRedacted => SecuritySeverity::Info,
            Self::DestructiveFlagged => SecuritySeverity::Warning,
            Self::CredentialMissing => SecuritySeverity::Error,
            Self::UpstreamFailure => SecuritySeverity::Error,
            Self::TurnCancelled => SecuritySeverity::Info,
            Self::SessionCreated => SecuritySeverity::Debug,
            Self::SessionCleared => SecuritySeverity::Info,
            Self::SessionEvicted => SecuritySeverity::Info,
            Self::AuditCleared => SecuritySeverity::Warning,
        }
    }

    /// Get a string representation of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InjectionDeflected => "injection_deflected",
            Self::InjectionSanitized => "injection_sanitized",
            Self::PiiRedacted => "pii_redacted",
            Self::DestructiveFlagged => "destructive_flagged",
            Self::CredentialMissing => "credential_missing",
            Self::UpstreamFailure => "upstream_failure",
            Self::TurnCancelled => "turn_cancelled",
            Self::SessionCreated => "session_created",
            Self::SessionCleared => "session_cleared",
            Self::SessionEvicted => "session_evicted",
            Self::AuditCleared => "audit_cleared",
        }
    }
}

/// Severity levels for security events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecuritySeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl SecuritySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Build the structured line without emitting it.
pub fn format_security_event(event: SecurityEvent, message: &str, details: &[(&str, &str)]) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let details_str = details
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ");

    if details_str.is_empty() {
        format!(
            "[{}] SECURITY {} {}: {}",
            timestamp,
            event.severity().as_str(),
            event.as_str(),
            message
        )
    } else {
        format!(
            "[{}] SECURITY {} {}: {} | {}",
            timestamp,
            event.severity().as_str(),
            event.as_str(),
            message,
            details_str
        )
    }
}

/// Log a security event with structured data.
///
/// # Example
/// ```
/// use guardrail_core::telemetry::{log_security_event, SecurityEvent};
///
/// log_security_event(
///     SecurityEvent::InjectionDeflected,
///     "Request blocked",
///     &[("session", "7d3c"), ("confidence", "HIGH")]
/// );
/// ```
pub fn log_security_event(event: SecurityEvent, message: &str, details: &[(&str, &str)]) {
    let log_line = format_security_event(event, message, details);

    match event.severity() {
        SecuritySeverity::Debug => tracing::debug!(event = event.as_str(), "{}", log_line),
        SecuritySeverity::Info => tracing::info!(event = event.as_str(), "{}", log_line),
        SecuritySeverity::Warning => tracing::warn!(event = event.as_str(), "{}", log_line),
        SecuritySeverity::Error | SecuritySeverity::Critical => {
            tracing::error!(event = event.as_str(), "{}", log_line)
        }
    }
}

/// Convenience macro for logging security events.
#[macro_export]
macro_rules! security_log {
    ($event:expr, $message:expr) => {
        $crate::telemetry::security_log::log_security_event($event, $message, &[])
    };
    ($event:expr, $message:expr, $($key:expr => $value:expr),+) => {
        $crate::telemetry::security_log::log_security_event(
            $event,
            $message,
            &[$(($key, $value)),+]
        )
    };
}

//! Guardrail checks and interaction audit
//!
//! This module provides the synchronous, pure text checks that run before any
//! completion call:
//! - Prompt injection detection
//! - PII and secret scrubbing
//! - Data sensitivity classification
//! - Destructive-action advisory flagging
//!
//! plus the bounded audit log the orchestrator writes to.

pub mod audit;
pub mod classifier;
pub mod destructive;
pub mod pii_scrubber;
pub mod prompt_injection;

pub use audit::{AuditConfig, AuditEntry, AuditLog, AuditStats, NewAuditEntry, Verdict};
pub use classifier::{classify_data, classify_redaction, Classification, DataClassification};
pub use destructive::{check_destructive, is_destructive_command, DestructiveCheck};
pub use pii_scrubber::{contains_email_shape, scrub_pii, Category, PiiScrubber, RedactionResult};
pub use prompt_injection::{
    deflection_message, detect_injection, Confidence, InjectionDetector, InjectionFinding,
    SANITIZED_PLACEHOLDER,
};

/// Guardrail labels recorded in metadata and audit entries.
pub mod labels {
    /// Injection blocked outright with a deflection reply
    pub const INJECTION_DEFENSE: &str = "injection-defense";
    /// Injection replaced with the sanitized placeholder and forwarded
    pub const INJECTION_GUARD: &str = "injection-guard";
    pub const DESTRUCTIVE_GATE: &str = "destructive-gate";
    pub const PII_SCRUBBER: &str = "pii-scrubber";
}

//! Interaction Audit Log
//!
//! Records every completed or deflected turn for compliance review:
//! - Newest-first, size-bounded ring of entries
//! - Aggregate statistics for dashboards
//! - JSON export
//!
//! State lives only in memory and resets with the process.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::pii_scrubber::Category;

/// Maximum characters kept in prompt and response summaries.
pub const SUMMARY_MAX_CHARS: usize = 120;

/// Which guardrail mode produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Guarded,
    Unguarded,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Guarded => write!(f, "GUARDED"),
            Verdict::Unguarded => write!(f, "UNGUARDED"),
        }
    }
}

/// A recorded interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Unique entry identifier (32 hex chars)
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub scenario_id: String,
    pub scenario_title: String,
    pub verdict: Verdict,
    /// At most 120 chars plus an ellipsis marker
    pub prompt_summary: String,
    /// At most 120 chars plus an ellipsis marker
    pub response_summary: String,
    pub guardrails_triggered: Vec<String>,
    pub injection_detected: bool,
    pub pii_redacted: bool,
    pub pii_categories: Vec<Category>,
    pub human_review_required: bool,
    pub duration_ms: u64,
    pub model_used: String,
}

impl AuditEntry {
    /// Create a new entry builder
    pub fn builder() -> AuditEntryBuilder {
        AuditEntryBuilder::default()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Convert to log-friendly string
    pub fn to_log_string(&self) -> String {
        format!(
            "[{}] {} {} guardrails={:?} injection={} pii={} review={} ({}ms, model={})",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.verdict,
            self.scenario_id,
            self.guardrails_triggered,
            self.injection_detected,
            self.pii_redacted,
            self.human_review_required,
            self.duration_ms,
            self.model_used
        )
    }
}

/// Entry content before the log assigns an id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub scenario_id: String,
    pub scenario_title: String,
    pub verdict: Verdict,
    pub prompt_summary: String,
    pub response_summary: String,
    pub guardrails_triggered: Vec<String>,
    pub injection_detected: bool,
    pub pii_redacted: bool,
    pub pii_categories: Vec<Category>,
    pub human_review_required: bool,
    pub duration_ms: u64,
    pub model_used: String,
}

/// Builder for audit entries
#[derive(Debug, Default)]
pub struct AuditEntryBuilder {
    scenario_id: Option<String>,
    scenario_title: Option<String>,
    verdict: Option<Verdict>,
    prompt_summary: Option<String>,
    response_summary: Option<String>,
    guardrails_triggered: Vec<String>,
    injection_detected: bool,
    pii_categories: Vec<Category>,
    human_review_required: bool,
    duration_ms: u64,
    model_used: Option<String>,
}

impl AuditEntryBuilder {
    pub fn scenario(mut self, id: impl Into<String>, title: impl Into<String>) -> Self {
        self.scenario_id = Some(id.into());
        self.scenario_title = Some(title.into());
        self
    }

    pub fn verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = Some(verdict);
        self
    }

    /// Summarize and store the prompt text.
    pub fn prompt(mut self, text: &str) -> Self {
        self.prompt_summary = Some(summarize(text, SUMMARY_MAX_CHARS));
        self
    }

    /// Store an already-formatted prompt summary verbatim.
    pub fn prompt_summary(mut self, summary: impl Into<String>) -> Self {
        self.prompt_summary = Some(summary.into());
        self
    }

    /// Summarize and store the response text.
    pub fn response(mut self, text: &str) -> Self {
        self.response_summary = Some(summarize(text, SUMMARY_MAX_CHARS));
        self
    }

    pub fn guardrails(mut self, labels: &[String]) -> Self {
        self.guardrails_triggered = labels.to_vec();
        self
    }

    pub fn injection_detected(mut self, detected: bool) -> Self {
        self.injection_detected = detected;
        self
    }

    pub fn pii_categories(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.pii_categories = categories.into_iter().collect();
        self
    }

    pub fn human_review(mut self, required: bool) -> Self {
        self.human_review_required = required;
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model_used = Some(model.into());
        self
    }

    /// Build the entry content
    pub fn build(self) -> Result<NewAuditEntry, &'static str> {
        Ok(NewAuditEntry {
            scenario_id: self.scenario_id.ok_or("scenario is required")?,
            scenario_title: self.scenario_title.unwrap_or_default(),
            verdict: self.verdict.ok_or("verdict is required")?,
            prompt_summary: self.prompt_summary.ok_or("prompt is required")?,
            response_summary: self.response_summary.ok_or("response is required")?,
            guardrails_triggered: self.guardrails_triggered,
            injection_detected: self.injection_detected,
            pii_redacted: !self.pii_categories.is_empty(),
            pii_categories: self.pii_categories,
            human_review_required: self.human_review_required,
            duration_ms: self.duration_ms,
            model_used: self.model_used.ok_or("model is required")?,
        })
    }
}

/// Truncate to `max_chars` characters, appending `...` when shortened.
pub fn summarize(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Generate a unique entry ID
fn generate_entry_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes[..]);
    hex::encode(bytes)
}

/// Aggregate counts over the retained entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total: usize,
    pub guarded: usize,
    pub unguarded: usize,
    pub injection_attempts: usize,
    pub pii_redactions: usize,
    pub human_review_required: usize,
    /// Rounded mean; 0 for an empty log
    pub avg_duration_ms: u64,
}

/// Audit log configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Maximum entries to keep in memory (floor 1)
    pub max_entries: usize,
    /// Emit a debug log line per entry
    pub log_entries: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            log_entries: true,
        }
    }
}

/// Bounded, newest-first interaction log.
///
/// Clones share the same underlying buffer.
#[derive(Clone)]
pub struct AuditLog {
    config: AuditConfig,
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
}

impl AuditLog {
    pub fn new(config: AuditConfig) -> Self {
        let config = AuditConfig {
            max_entries: config.max_entries.max(1),
            ..config
        };
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(config.max_entries))),
            config,
        }
    }

    pub fn capacity(&self) -> usize {
        self.config.max_entries
    }

    /// Assign id and timestamp, prepend, and trim to capacity.
    ///
    /// Prepend and trim happen under one write guard.
    pub async fn add(&self, entry: NewAuditEntry) -> AuditEntry {
        let full = AuditEntry {
            id: generate_entry_id(),
            timestamp: Utc::now(),
            scenario_id: entry.scenario_id,
            scenario_title: entry.scenario_title,
            verdict: entry.verdict,
            prompt_summary: entry.prompt_summary,
            response_summary: entry.response_summary,
            guardrails_triggered: entry.guardrails_triggered,
            injection_detected: entry.injection_detected,
            pii_redacted: entry.pii_redacted,
            pii_categories: entry.pii_categories,
            human_review_required: entry.human_review_required,
            duration_ms: entry.duration_ms,
            model_used: entry.model_used,
        };

        if self.config.log_entries {
            tracing::debug!(audit = %full.to_log_string(), "Audit entry recorded");
        }

        let mut entries = self.entries.write().await;
        entries.push_front(full.clone());
        entries.truncate(self.config.max_entries);

        full
    }

    /// All entries, newest first.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    /// Entries for one scenario, newest first.
    pub async fn by_scenario(&self, scenario_id: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.scenario_id == scenario_id)
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> AuditStats {
        let entries = self.entries.read().await;
        let total = entries.len();
        if total == 0 {
            return AuditStats::default();
        }

        let mut stats = AuditStats {
            total,
            ..AuditStats::default()
        };
        let mut duration_sum: u128 = 0;

        for e in entries.iter() {
            match e.verdict {
                Verdict::Guarded => stats.guarded += 1,
                Verdict::Unguarded => stats.unguarded += 1,
            }
            stats.injection_attempts += e.injection_detected as usize;
            stats.pii_redactions += e.pii_redacted as usize;
            stats.human_review_required += e.human_review_required as usize;
            duration_sum += e.duration_ms as u128;
        }

        let total = total as u128;
        stats.avg_duration_ms = ((duration_sum + total / 2) / total) as u64;
        stats
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Export entries newest-first as pretty JSON.
    pub async fn export_json(&self) -> Result<String, serde_json::Error> {
        let entries = self.entries.read().await;
        serde_json::to_string_pretty(&*entries)
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}

//! Synchronous guardrail checks for one turn.
//!
//! These are pure text operations. The orchestrator calls them in two
//! stages around the credential preflight: injection first, content second.

use crate::scenario::{InjectionPolicy, Scenario};
use crate::security::{
    check_destructive, classify_redaction, contains_email_shape, detect_injection, labels,
    scrub_pii, Category, DataClassification, InjectionFinding, RedactionResult,
};
use crate::session::SessionMode;

use super::events::GuardrailMetadata;

/// Result of the injection stage.
#[derive(Debug, Clone)]
pub(crate) enum InjectionScreen {
    Clean,
    /// Refuse the turn; nothing is forwarded.
    Deflect(InjectionFinding),
    /// Continue with the finding's sanitized text.
    Sanitize(InjectionFinding),
}

pub(crate) fn screen_injection(scenario: &Scenario, text: &str) -> InjectionScreen {
    let finding = detect_injection(text);
    if !finding.is_injection {
        return InjectionScreen::Clean;
    }
    match scenario.injection_policy {
        InjectionPolicy::Deflect => InjectionScreen::Deflect(finding),
        InjectionPolicy::Sanitize => InjectionScreen::Sanitize(finding),
    }
}

/// Everything the guarded checks decided about a turn.
#[derive(Debug, Clone)]
pub(crate) struct GuardReport {
    pub mode: SessionMode,
    pub labels: Vec<String>,
    pub injection: Option<InjectionFinding>,
    pub deflected: bool,
    pub destructive: Vec<&'static str>,
    pub redaction: Option<RedactionResult>,
    pub classification: Option<DataClassification>,
    /// Text forwarded to the completion service
    pub outbound: String,
    pub human_review: bool,
}

impl GuardReport {
    /// Report for a turn that bypasses every check.
    pub fn unguarded(text: &str) -> Self {
        Self {
            mode: SessionMode::Unguarded,
            labels: Vec::new(),
            injection: None,
            deflected: false,
            destructive: Vec::new(),
            redaction: None,
            classification: None,
            outbound: text.to_string(),
            human_review: false,
        }
    }

    /// Report for a guarded turn after the injection stage.
    pub fn guarded(scenario: &Scenario, text: &str, screen: InjectionScreen) -> Self {
        let mut report = Self {
            mode: SessionMode::Guarded,
            labels: Vec::new(),
            injection: None,
            deflected: false,
            destructive: Vec::new(),
            redaction: None,
            classification: None,
            outbound: text.to_string(),
            human_review: scenario.requires_human_review,
        };
        match screen {
            InjectionScreen::Clean => {}
            InjectionScreen::Deflect(finding) => {
                report.labels.push(labels::INJECTION_DEFENSE.to_string());
                report.deflected = true;
                report.injection = Some(finding);
            }
            InjectionScreen::Sanitize(finding) => {
                report.labels.push(labels::INJECTION_GUARD.to_string());
                report.outbound = finding.sanitized_text.clone();
                report.human_review = true;
                report.injection = Some(finding);
            }
        }
        report
    }

    /// Run the destructive-action and PII checks against the outbound text.
    pub fn screen_content(&mut self, scenario: &Scenario) {
        let destructive = check_destructive(&self.outbound);
        if destructive.flagged {
            self.labels.push(labels::DESTRUCTIVE_GATE.to_string());
            self.destructive = destructive.matched;
            self.human_review = true;
        }

        if scenario.handles_sensitive_data || contains_email_shape(&self.outbound) {
            let redaction = scrub_pii(&self.outbound);
            self.classification = Some(classify_redaction(&redaction));
            if !redaction.is_clean() {
                self.labels.push(labels::PII_SCRUBBER.to_string());
                self.outbound = redaction.redacted_text.clone();
            }
            self.redaction = Some(redaction);
        }
    }

    pub fn injection_detected(&self) -> bool {
        self.injection.is_some()
    }

    pub fn pii_categories(&self) -> Vec<Category> {
        self.redaction
            .as_ref()
            .map(|r| r.categories.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Metadata event for this report. `input` is the caller's original text.
    pub fn metadata(&self, input: &str) -> GuardrailMetadata {
        let pii_categories = self.pii_categories();
        GuardrailMetadata {
            mode: self.mode,
            guardrails_triggered: self.labels.clone(),
            injection_detected: self.injection_detected(),
            deflected: self.deflected,
            destructive_warning: !self.destructive.is_empty(),
            pii_redacted: !pii_categories.is_empty(),
            pii_categories,
            processed_input: (!self.deflected && self.outbound != input)
                .then(|| self.outbound.clone()),
            classification: self.classification.clone(),
        }
    }
}

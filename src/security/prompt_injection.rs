//! Prompt Injection Detection
//!
//! Classifies user text against a declarative table of labeled patterns.
//! Every matching rule contributes its label; the finding's confidence is the
//! highest severity among the rules that fired.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Replacement for the whole input once any rule matches.
///
/// Partial repair of an adversarial string is not attempted.
pub const SANITIZED_PLACEHOLDER: &str =
    "[USER INPUT CONTAINED POTENTIALLY MALICIOUS INSTRUCTIONS - REDACTED]";

const DEFLECTION_MESSAGE: &str = "I'm not able to follow instructions embedded in the conversation \
that override my purpose. Is there a technical question I can help you with?";

/// Severity of a single rule, and confidence of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "LOW"),
            Confidence::Medium => write!(f, "MEDIUM"),
            Confidence::High => write!(f, "HIGH"),
        }
    }
}

/// One row of the injection rule table.
#[derive(Debug, Clone, Copy)]
pub struct InjectionRule {
    pub label: &'static str,
    pub pattern: &'static str,
    pub severity: Confidence,
}

/// Rule table, evaluated in order. All rules match case-insensitively.
pub const INJECTION_RULES: &[InjectionRule] = &[
    InjectionRule {
        label: "Instruction override attempt",
        pattern: r"ignore\s+(?:all\s+)?(?:previous|prior|above|preceding)\s+(?:instructions?|prompts?|rules?|context)",
        severity: Confidence::High,
    },
    InjectionRule {
        label: "System prompt reveal attempt",
        pattern: r"(?:print|show|reveal|tell me|output|repeat|display)\s+(?:your\s+)?(?:system\s+)?(?:prompt|instructions?|rules?|context)",
        severity: Confidence::High,
    },
    InjectionRule {
        label: "Role jailbreak attempt",
        pattern: r"(?:you are now|act as|pretend to be|roleplay as|behave as|from now on you are)\s+(?:a\s+)?(?:different|unrestricted|evil|bad|harmful|DAN|jailbreak)",
        severity: Confidence::High,
    },
    InjectionRule {
        label: "DAN / jailbreak keyword",
        pattern: r"\b(?:DAN|jailbreak|do anything now|no restrictions?|without limits?)\b",
        severity: Confidence::High,
    },
    InjectionRule {
        label: "New instructions injection",
        pattern: r"(?:new\s+)?instructions?:\s*(?:you\s+must|always|never|from\s+now)",
        severity: Confidence::Medium,
    },
    InjectionRule {
        label: "Forget previous context",
        pattern: r"(?:forget|disregard|ignore)\s+(?:everything|all|what)\s+(?:above|before|i\s+said)",
        severity: Confidence::Medium,
    },
    InjectionRule {
        label: "Developer/admin mode claim",
        pattern: r"(?:developer|admin|debug|maintenance|override|sudo)\s+(?:mode|access|command|key)",
        severity: Confidence::Medium,
    },
    InjectionRule {
        label: "Base64 encoded instruction",
        pattern: r"(?:decode|run|execute)\s+(?:this\s+)?base64",
        severity: Confidence::Medium,
    },
    InjectionRule {
        label: "Token manipulation attempt",
        pattern: r"<\|(?:im_start|im_end|system|user|assistant)\|>",
        severity: Confidence::High,
    },
];

/// Result of a single detection pass. Created fresh per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionFinding {
    pub is_injection: bool,
    pub confidence: Confidence,
    pub matched_patterns: Vec<String>,
    pub sanitized_text: String,
}

impl InjectionFinding {
    fn clean(text: &str) -> Self {
        Self {
            is_injection: false,
            confidence: Confidence::Low,
            matched_patterns: Vec::new(),
            sanitized_text: text.to_string(),
        }
    }
}

/// Prompt injection detector with the rule table compiled once.
pub struct InjectionDetector {
    rules: Vec<(InjectionRule, Regex)>,
}

impl InjectionDetector {
    /// Compile the built-in rule table.
    pub fn new() -> Self {
        let rules = INJECTION_RULES
            .iter()
            .map(|rule| {
                let regex = RegexBuilder::new(rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .expect("built-in injection pattern must compile");
                (*rule, regex)
            })
            .collect();
        Self { rules }
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> impl Iterator<Item = &InjectionRule> {
        self.rules.iter().map(|(rule, _)| rule)
    }

    /// Classify `text`. Pure: no state survives between calls.
    ///
    /// Input is NFKC-normalized before matching so compatibility forms
    /// (full-width letters, ligatures) cannot slip past the table.
    pub fn detect(&self, text: &str) -> InjectionFinding {
        if text.trim().is_empty() {
            return InjectionFinding::clean(text);
        }

        let normalized: String = text.nfkc().collect();
        let mut matched_patterns = Vec::new();
        let mut highest = Confidence::Low;

        for (rule, regex) in &self.rules {
            if regex.is_match(&normalized) {
                matched_patterns.push(rule.label.to_string());
                highest = highest.max(rule.severity);
            }
        }

        if matched_patterns.is_empty() {
            return InjectionFinding::clean(text);
        }

        InjectionFinding {
            is_injection: true,
            confidence: highest,
            matched_patterns,
            sanitized_text: SANITIZED_PLACEHOLDER.to_string(),
        }
    }
}

impl Default for InjectionDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn shared_detector() -> &'static InjectionDetector {
    static DETECTOR: OnceLock<InjectionDetector> = OnceLock::new();
    DETECTOR.get_or_init(InjectionDetector::new)
}

/// Classify `text` with the shared detector.
pub fn detect_injection(text: &str) -> InjectionFinding {
    shared_detector().detect(text)
}

/// Fixed refusal used when a request is blocked. Never echoes user input.
pub fn deflection_message() -> &'static str {
    DEFLECTION_MESSAGE
}

//! PII and secret scrubbing
//!
//! Redacts personally identifiable data and credentials from text before it
//! leaves the process. Rules are applied in table order against the
//! progressively redacted text, so a later rule only ever sees placeholders
//! where an earlier rule fired.
//!
//! Placeholders contain no digits, `@`, `:` or `=`, which keeps them from
//! re-matching any rule and makes redaction idempotent.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Data category of a redaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Pii,
    Secrets,
    Network,
    Pci,
    /// Reserved; no rule currently produces it.
    Phi,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Pii => "PII",
            Category::Secrets => "SECRETS",
            Category::Network => "NETWORK",
            Category::Pci => "PCI",
            Category::Phi => "PHI",
        }
    }

    /// Categories that must stay on private infrastructure.
    pub fn is_sensitive(&self) -> bool {
        matches!(self, Category::Pci | Category::Phi)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the scrub table.
#[derive(Debug, Clone, Copy)]
pub struct ScrubRule {
    pub label: &'static str,
    pub category: Category,
    pub pattern: &'static str,
    pub placeholder: &'static str,
}

/// Scrub table, applied in order.
pub const SCRUB_RULES: &[ScrubRule] = &[
    ScrubRule {
        label: "Private key block",
        category: Category::Secrets,
        pattern: r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |ENCRYPTED )?PRIVATE KEY-----[\s\S]*?-----END (?:RSA |EC |DSA |OPENSSH |ENCRYPTED )?PRIVATE KEY-----",
        placeholder: "[PRIVATE_KEY_REDACTED]",
    },
    ScrubRule {
        label: "Database connection string",
        category: Category::Secrets,
        pattern: r#"(?i)(?:postgres(?:ql)?|mysql|mongodb(?:\+srv)?|redis|mssql)://[^\s"']+"#,
        placeholder: "[DB_CONN_REDACTED]",
    },
    ScrubRule {
        label: "Session token (JWT-style)",
        category: Category::Secrets,
        pattern: r"eyJ[A-Za-z0-9\-_]+\.[A-Za-z0-9\-_]+\.[A-Za-z0-9\-_]*",
        placeholder: "[SESSION_TOKEN_REDACTED]",
    },
    ScrubRule {
        label: "API key or secret assignment",
        category: Category::Secrets,
        pattern: r#"(?i)(?:api[_\-]?key|secret|token|password|passwd|pwd)\s*[:=]\s*['"]?[\w\-\.]{8,}['"]?"#,
        placeholder: "[API_KEY_REDACTED]",
    },
    ScrubRule {
        label: "Provider secret key",
        category: Category::Secrets,
        pattern: r"\b(?:(?:sk|rk)_(?:live|test)_[A-Za-z0-9]{8,}|sk-[A-Za-z0-9_\-]{20,}|gsk_[A-Za-z0-9]{20,}|ghp_[A-Za-z0-9]{36}|xox[baprs]-[A-Za-z0-9\-]{10,})",
        placeholder: "[API_KEY_REDACTED]",
    },
    ScrubRule {
        label: "AWS access key",
        category: Category::Secrets,
        pattern: r"(?:AKIA|AROA|AIDA|AIPA|ANPA|ANVA|ASIA)[A-Z0-9]{16}",
        placeholder: "[AWS_KEY_REDACTED]",
    },
    ScrubRule {
        label: "Email address",
        category: Category::Pii,
        pattern: r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}",
        placeholder: "[EMAIL_REDACTED]",
    },
    ScrubRule {
        label: "Internal IP address",
        category: Category::Network,
        pattern: r"\b(?:10\.\d{1,3}\.\d{1,3}\.\d{1,3}|172\.(?:1[6-9]|2\d|3[01])\.\d{1,3}\.\d{1,3}|192\.168\.\d{1,3}\.\d{1,3})\b",
        placeholder: "[IP_INTERNAL]",
    },
    ScrubRule {
        label: "Credit card number",
        category: Category::Pci,
        pattern: r"\b(?:4[0-9]{12}(?:[0-9]{3})?|5[1-5][0-9]{14}|3[47][0-9]{13}|6(?:011|5[0-9]{2})[0-9]{12})\b",
        placeholder: "[CARD_NUMBER_REDACTED]",
    },
    ScrubRule {
        label: "Credit card number (grouped)",
        category: Category::Pci,
        pattern: r"\b(?:4\d{3}|5[1-5]\d{2}|6011|65\d{2})(?:[- ]\d{4}){3}\b",
        placeholder: "[CARD_NUMBER_REDACTED]",
    },
    ScrubRule {
        label: "Social security number",
        category: Category::Pii,
        pattern: r"\b\d{3}-\d{2}-\d{4}\b",
        placeholder: "[SSN_REDACTED]",
    },
    ScrubRule {
        label: "Phone number",
        category: Category::Pii,
        pattern: r"\b(?:\+?1[-.\s]?)?\(?[2-9]\d{2}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
        placeholder: "[PHONE_REDACTED]",
    },
];

/// Outcome of a scrub pass.
///
/// `redaction_count == 0` iff `categories` is empty iff `redacted_text`
/// equals the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionResult {
    pub redacted_text: String,
    pub redaction_count: usize,
    pub categories: BTreeSet<Category>,
    pub is_sensitive: bool,
}

impl RedactionResult {
    pub fn is_clean(&self) -> bool {
        self.redaction_count == 0
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    /// Category names joined for display, in stable order.
    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.as_str().to_string()).collect()
    }
}

/// Compiled scrub table.
pub struct PiiScrubber {
    rules: Vec<(ScrubRule, Regex)>,
}

impl PiiScrubber {
    pub fn new() -> Self {
        let rules = SCRUB_RULES
            .iter()
            .map(|rule| {
                let regex = Regex::new(rule.pattern).expect("built-in scrub pattern must compile");
                (*rule, regex)
            })
            .collect();
        Self { rules }
    }

    /// Rules in application order.
    pub fn rules(&self) -> impl Iterator<Item = &ScrubRule> {
        self.rules.iter().map(|(rule, _)| rule)
    }

    /// Redact every rule match in `text`.
    ///
    /// Each rule scans from the start of the current text; `regex` keeps no
    /// match cursor between calls, so repeated calls are deterministic.
    pub fn scrub(&self, text: &str) -> RedactionResult {
        let mut current = text.to_string();
        let mut redaction_count = 0usize;
        let mut categories = BTreeSet::new();

        for (rule, regex) in &self.rules {
            let found = regex.find_iter(&current).count();
            if found == 0 {
                continue;
            }
            redaction_count += found;
            categories.insert(rule.category);
            current = regex.replace_all(&current, rule.placeholder).into_owned();
        }

        let is_sensitive = categories.iter().any(Category::is_sensitive);

        RedactionResult {
            redacted_text: current,
            redaction_count,
            categories,
            is_sensitive,
        }
    }
}

impl Default for PiiScrubber {
    fn default() -> Self {
        Self::new()
    }
}

fn shared_scrubber() -> &'static PiiScrubber {
    static SCRUBBER: OnceLock<PiiScrubber> = OnceLock::new();
    SCRUBBER.get_or_init(PiiScrubber::new)
}

/// Scrub `text` with the shared rule table.
pub fn scrub_pii(text: &str) -> RedactionResult {
    shared_scrubber().scrub(text)
}

/// Cheap pre-check used to decide whether a guarded request needs scrubbing.
pub fn contains_email_shape(text: &str) -> bool {
    static EMAIL_SHAPE: OnceLock<Regex> = OnceLock::new();
    EMAIL_SHAPE
        .get_or_init(|| {
            Regex::new(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b")
                .expect("email shape pattern must compile")
        })
        .is_match(text)
}

//! Destructive-action advisory check
//!
//! Flags requests that mention deleting data, force-pushing or opening up
//! file permissions. The result only annotates turn metadata and the audit
//! entry; it never blocks a request.

use std::sync::OnceLock;

use regex::RegexSet;

/// Labeled destructive-command patterns, case-insensitive.
pub const DESTRUCTIVE_PATTERNS: &[(&str, &str)] = &[
    (
        "data removal command",
        r"(?i)\b(?:rm|remove|delete|drop|truncate|destroy|wipe|purge)\b",
    ),
    (
        "force push",
        r"(?i)(?:\bforce.push\b|\bgit.push.*force\b|--force\b)",
    ),
    (
        "world-writable permissions",
        r"(?i)\bchmod\s+(?:-R\s+)?(?:777\b|a\+[wx])",
    ),
];

/// Result of the advisory check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DestructiveCheck {
    pub flagged: bool,
    pub matched: Vec<&'static str>,
}

fn pattern_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new(DESTRUCTIVE_PATTERNS.iter().map(|(_, pattern)| *pattern))
            .expect("destructive pattern table must compile")
    })
}

/// Check `text` against every destructive pattern.
pub fn check_destructive(text: &str) -> DestructiveCheck {
    let matched: Vec<&'static str> = pattern_set()
        .matches(text)
        .into_iter()
        .map(|idx| DESTRUCTIVE_PATTERNS[idx].0)
        .collect();

    DestructiveCheck {
        flagged: !matched.is_empty(),
        matched,
    }
}

/// Shorthand for `check_destructive(text).flagged`.
pub fn is_destructive_command(text: &str) -> bool {
    pattern_set().is_match(text)
}

//! Fuzz target for prompt injection detection.
//!
//! Arbitrary strings must not panic the detector, and a finding must be
//! internally consistent.

#![no_main]

use guardrail_core::security::{detect_injection, Confidence, SANITIZED_PLACEHOLDER};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let finding = detect_injection(data);

    assert_eq!(
        finding.is_injection,
        !finding.matched_patterns.is_empty(),
        "is_injection inconsistent with matched patterns"
    );
    if finding.is_injection {
        assert_eq!(finding.sanitized_text, SANITIZED_PLACEHOLDER);
    } else {
        assert_eq!(finding.confidence, Confidence::Low);
        assert_eq!(finding.sanitized_text, data);
    }

    // Pure: a second pass gives the same answer.
    assert_eq!(detect_injection(data), finding);
});

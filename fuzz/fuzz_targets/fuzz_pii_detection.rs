//! Fuzz target for PII scrubbing.
//!
//! Arbitrary strings must not panic the scrubber, and scrubbing its own
//! output must find nothing further.

#![no_main]

use guardrail_core::security::scrub_pii;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let result = scrub_pii(data);

    assert_eq!(
        result.redaction_count == 0,
        result.categories.is_empty(),
        "count inconsistent with categories"
    );
    if result.redaction_count == 0 {
        assert_eq!(result.redacted_text, data);
    }

    let again = scrub_pii(&result.redacted_text);
    assert!(again.is_clean(), "redacted output re-matched a rule");
});

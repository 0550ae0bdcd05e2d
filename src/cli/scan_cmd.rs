// Copyright 2024-2026 Guardrail CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! `scan` subcommand: run every check on a piece of text and print JSON.
//!
//! Works without a completion credential.

use std::io::Read;

use serde::Serialize;

use super::{CliError, EXIT_OK};
use crate::security::{
    check_destructive, classify_redaction, detect_injection, scrub_pii, DataClassification,
    InjectionFinding, RedactionResult,
};

/// Combined output of the guardrail checks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub injection: InjectionFinding,
    pub redaction: RedactionResult,
    pub classification: DataClassification,
    pub destructive: Vec<&'static str>,
}

/// Run the detector, scrubber, classifier and destructive check.
pub fn scan(text: &str) -> ScanReport {
    let redaction = scrub_pii(text);
    let classification = classify_redaction(&redaction);
    ScanReport {
        injection: detect_injection(text),
        redaction,
        classification,
        destructive: check_destructive(text).matched,
    }
}

/// Scan the argument text, or stdin when no arguments are given.
pub fn run_scan(args: &[String]) -> Result<i32, CliError> {
    let text = if args.is_empty() {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        args.join(" ")
    };

    let report = scan(&text);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(EXIT_OK)
}

// Copyright 2024-2026 Guardrail CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from environment variables
//! and never contact the completion service.

use tracing_subscriber::EnvFilter;

use crate::config::{self, ApiKeyStatus, EffectiveConfig, API_KEY_VAR, DEFAULT_API_BASE, DEFAULT_MODEL};

/// Print effective config as key-value pairs to stdout.
pub fn run_show() {
    let cfg = config::load().effective_config();
    print_config(&cfg);
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    println!("{}=missing", API_KEY_VAR);
    println!("GUARDRAIL_API_BASE={}", DEFAULT_API_BASE);
    println!("GUARDRAIL_MODEL={}", DEFAULT_MODEL);
    println!("GUARDRAIL_MAX_AUDIT_ENTRIES=500");
    println!("GUARDRAIL_MAX_SESSIONS=10000");
    println!("GUARDRAIL_SESSION_TTL=0");
    println!("GUARDRAIL_CONNECT_TIMEOUT=10");
    println!("GUARDRAIL_STREAM_BUFFER=64");
    println!("GUARDRAIL_LOG_LEVEL=info");
    println!("GUARDRAIL_LOG_FORMAT=json");
    println!("GUARDRAIL_LOG_FILE=");
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate() -> i32 {
    let warnings = validate(&config::load().effective_config());
    for warning in &warnings {
        eprintln!("WARNING: {}", warning);
    }

    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

/// Collect warnings for a loaded configuration.
pub fn validate(cfg: &EffectiveConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    match cfg.api_key {
        ApiKeyStatus::Configured => {}
        ApiKeyStatus::Missing => {
            warnings.push(format!("{} is not set; only injection deflection will work", API_KEY_VAR))
        }
        ApiKeyStatus::Placeholder => {
            warnings.push(format!("{} looks like a placeholder value", API_KEY_VAR))
        }
    }

    if !cfg.api_base.starts_with("https://") && !cfg.api_base.starts_with("http://") {
        warnings.push(format!("GUARDRAIL_API_BASE is not an http(s) URL: {}", cfg.api_base));
    }

    if EnvFilter::try_new(&cfg.log_level).is_err() {
        warnings.push(format!("GUARDRAIL_LOG_LEVEL is not a valid filter: {}", cfg.log_level));
    }

    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    println!("{}={}", API_KEY_VAR, cfg.api_key);
    println!("GUARDRAIL_API_BASE={}", cfg.api_base);
    println!("GUARDRAIL_MODEL={}", cfg.model);
    println!("GUARDRAIL_MAX_AUDIT_ENTRIES={}", cfg.max_audit_entries);
    println!("GUARDRAIL_MAX_SESSIONS={}", cfg.max_sessions);
    println!("GUARDRAIL_SESSION_TTL={}", cfg.session_ttl_secs);
    println!("GUARDRAIL_CONNECT_TIMEOUT={}", cfg.connect_timeout_secs);
    println!("GUARDRAIL_STREAM_BUFFER={}", cfg.stream_buffer);
    println!("GUARDRAIL_LOG_LEVEL={}", cfg.log_level);
    println!("GUARDRAIL_LOG_FORMAT={}", cfg.log_format);
    println!("GUARDRAIL_LOG_FILE={}", cfg.log_file.as_deref().unwrap_or(""));
}

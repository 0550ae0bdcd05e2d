//! Runtime configuration loading from environment variables.
//!
//! All values are loaded from environment variables with sensible defaults.
//! Invalid values fall back to defaults without crashing. The binary loads a
//! `.env` file first, so the same variables can live there.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `GROQ_API_KEY` | unset | Completion-service credential |
//! | `GUARDRAIL_API_BASE` | `https://api.groq.com/openai/v1` | OpenAI-compatible base URL |
//! | `GUARDRAIL_MODEL` | `llama-3.3-70b-versatile` | Primary model id |
//! | `GUARDRAIL_MAX_AUDIT_ENTRIES` | 500 | Audit ring size |
//! | `GUARDRAIL_MAX_SESSIONS` | 10000 | Session store capacity |
//! | `GUARDRAIL_SESSION_TTL` | 0 | Session lifetime (secs, 0 = no expiry) |
//! | `GUARDRAIL_CONNECT_TIMEOUT` | 10 | Upstream connect timeout (secs) |
//! | `GUARDRAIL_STREAM_BUFFER` | 64 | Per-turn event channel capacity |
//! | `GUARDRAIL_LOG_LEVEL` | `info` | Log filter directive |
//! | `GUARDRAIL_LOG_FORMAT` | `json` | `json` or `pretty` |

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use serde::Serialize;

use crate::security::AuditConfig;
use crate::session::SessionStoreConfig;

pub const API_KEY_VAR: &str = "GROQ_API_KEY";
pub const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Fragments that mark a credential as an unedited template value.
pub const PLACEHOLDER_FRAGMENTS: &[&str] =
    &["your_key", "gsk_your", "placeholder", "xxx", "test_key", "add_your"];

/// Setup guidance returned whenever the credential is missing or rejected.
pub const API_KEY_SETUP_MESSAGE: &str = "GROQ_API_KEY not configured.\n\n\
Setup steps:\n\
1. Copy .env.example to .env\n\
2. Set GROQ_API_KEY=gsk_... (free key at https://console.groq.com)\n\
3. Restart the process";

/// Credential state as reported by `config show`. Never carries the secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyStatus {
    Configured,
    Missing,
    Placeholder,
}

impl std::fmt::Display for ApiKeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiKeyStatus::Configured => write!(f, "configured"),
            ApiKeyStatus::Missing => write!(f, "missing"),
            ApiKeyStatus::Placeholder => write!(f, "placeholder"),
        }
    }
}

fn placeholder_matcher() -> &'static AhoCorasick {
    static MATCHER: OnceLock<AhoCorasick> = OnceLock::new();
    MATCHER.get_or_init(|| {
        AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(PLACEHOLDER_FRAGMENTS)
            .expect("placeholder fragment matcher must build")
    })
}

/// Classify a credential value.
pub fn api_key_status(key: Option<&str>) -> ApiKeyStatus {
    match key.map(str::trim) {
        None | Some("") => ApiKeyStatus::Missing,
        Some(k) if placeholder_matcher().is_match(k) => ApiKeyStatus::Placeholder,
        Some(_) => ApiKeyStatus::Configured,
    }
}

/// True only if the key is set and not a recognized placeholder.
pub fn is_api_key_valid(key: Option<&str>) -> bool {
    api_key_status(key) == ApiKeyStatus::Configured
}

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub api_key: ApiKeyStatus,
    pub api_base: String,
    pub model: String,
    pub max_audit_entries: usize,
    pub max_sessions: usize,
    pub session_ttl_secs: u64,
    pub connect_timeout_secs: u64,
    pub stream_buffer: usize,
    pub log_level: String,
    pub log_format: String,
    /// Log file path; stderr when unset
    pub log_file: Option<String>,
}

/// Upstream completion-service settings.
#[derive(Clone)]
pub struct UpstreamConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_key", &api_key_status(self.api_key.as_deref()))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// All runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub upstream: UpstreamConfig,
    pub audit: AuditConfig,
    pub sessions: SessionStoreConfig,
    pub stream_buffer: usize,
    pub log_level: String,
    pub log_format: String,
    pub log_file: Option<PathBuf>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            audit: AuditConfig::default(),
            sessions: SessionStoreConfig::default(),
            stream_buffer: 64,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            log_file: None,
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Read a string env var, treating empty as unset.
fn parse_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
        _ => default.to_string(),
    }
}

fn load_upstream_config() -> UpstreamConfig {
    let api_key = std::env::var(API_KEY_VAR)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());
    let api_base = parse_string("GUARDRAIL_API_BASE", DEFAULT_API_BASE);
    let api_base = api_base.trim_end_matches('/').to_string();
    let connect_secs = parse_u64("GUARDRAIL_CONNECT_TIMEOUT", 10).max(1);
    UpstreamConfig {
        api_key,
        api_base,
        model: parse_string("GUARDRAIL_MODEL", DEFAULT_MODEL),
        connect_timeout: Duration::from_secs(connect_secs),
    }
}

fn load_session_config() -> SessionStoreConfig {
    let max_sessions = parse_usize("GUARDRAIL_MAX_SESSIONS", 10_000).max(1);
    let ttl_secs = parse_u64("GUARDRAIL_SESSION_TTL", 0);
    let ttl = (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs));
    SessionStoreConfig { max_sessions, ttl }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let max_entries = parse_usize("GUARDRAIL_MAX_AUDIT_ENTRIES", 500).max(1);
    let stream_buffer = parse_usize("GUARDRAIL_STREAM_BUFFER", 64).max(4);

    let log_format = parse_string("GUARDRAIL_LOG_FORMAT", "json").to_ascii_lowercase();
    let log_format = match log_format.as_str() {
        "json" | "pretty" => log_format,
        _ => "json".to_string(),
    };

    EnvConfig {
        upstream: load_upstream_config(),
        audit: AuditConfig {
            max_entries,
            ..AuditConfig::default()
        },
        sessions: load_session_config(),
        stream_buffer,
        log_level: parse_string("GUARDRAIL_LOG_LEVEL", "info"),
        log_format,
        log_file: std::env::var("GUARDRAIL_LOG_FILE")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(|p| PathBuf::from(p.trim())),
    }
}

impl EnvConfig {
    pub fn api_key_status(&self) -> ApiKeyStatus {
        api_key_status(self.upstream.api_key.as_deref())
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            api_key: self.api_key_status(),
            api_base: self.upstream.api_base.clone(),
            model: self.upstream.model.clone(),
            max_audit_entries: self.audit.max_entries,
            max_sessions: self.sessions.max_sessions,
            session_ttl_secs: self.sessions.ttl.map(|d| d.as_secs()).unwrap_or(0),
            connect_timeout_secs: self.upstream.connect_timeout.as_secs(),
            stream_buffer: self.stream_buffer,
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
            log_file: self.log_file.as_ref().map(|p| p.display().to_string()),
        }
    }
}

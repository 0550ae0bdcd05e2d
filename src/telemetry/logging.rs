//! Subscriber setup for the guardrail binary.
//!
//! One `tracing` subscriber per process: an `EnvFilter` from
//! `GUARDRAIL_LOG_LEVEL`, JSON or pretty lines, written to stderr or appended
//! to `GUARDRAIL_LOG_FILE`.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::EnvConfig;

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(LogError::InvalidFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `info` or `guardrail_core=debug`
    pub level: String,
    /// Append here instead of stderr
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

impl LogConfig {
    pub fn from_env(env: &EnvConfig) -> Self {
        Self {
            format: env.log_format.parse().unwrap_or_default(),
            level: env.log_level.clone(),
            output_path: env.log_file.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let writer = log_writer(config.output_path.as_deref())?;
    let to_terminal = config.output_path.is_none();

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_ansi(to_terminal).with_writer(writer))
            .try_init(),
    };
    installed.map_err(|_| LogError::AlreadyInitialized)
}

fn log_writer(path: Option<&Path>) -> Result<BoxMakeWriter, LogError> {
    let Some(path) = path else {
        return Ok(BoxMakeWriter::new(std::io::stderr));
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LogError::FileOpen(format!("{}: {}", path.display(), e)))?;
    Ok(BoxMakeWriter::new(Mutex::new(file)))
}

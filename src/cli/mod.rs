// Copyright 2024-2026 Guardrail CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for guardrail-cli commands.
//!
//! ## Usage
//!
//! ```bash
//! guardrail-cli scan "text to inspect"    # Run the checks, print JSON
//! guardrail-cli chat                       # Guarded interactive session
//! guardrail-cli run uc02 "log lines..."    # One-shot scenario run
//! guardrail-cli scenarios                  # List the catalog
//! ```

pub mod chat_cmd;
pub mod config_cmd;
pub mod scan_cmd;

use std::io::Write;

use thiserror::Error;

use crate::completion::CompletionError;
use crate::error::GuardrailError;
use crate::orchestrator::{TurnEvent, TurnStream};
use crate::scenario;
use crate::session::SessionMode;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Guardrail(#[from] GuardrailError),

    #[error("Completion client error: {0}")]
    Completion(#[from] CompletionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Guardrail(GuardrailError::Configuration(_)) => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        }
    }
}

/// Arguments of `run <scenario> [--unguarded] <input...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    pub scenario_id: String,
    pub mode: SessionMode,
    /// Empty when the scenario's sample input should be used
    pub input: String,
}

/// Parse the arguments that follow `run`.
pub fn parse_run_args(args: &[String]) -> Result<RunArgs, CliError> {
    let mut mode = SessionMode::Guarded;
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--unguarded" => mode = SessionMode::Unguarded,
            "--guarded" => mode = SessionMode::Guarded,
            flag if flag.starts_with("--") => {
                return Err(CliError::Usage(format!("Unknown argument: {}", flag)));
            }
            _ => positional.push(arg.as_str()),
        }
    }

    let (scenario_id, input) = positional
        .split_first()
        .ok_or_else(|| CliError::Usage("Usage: guardrail-cli run <scenario> [--unguarded] [input...]".into()))?;
    Ok(RunArgs {
        scenario_id: scenario_id.to_string(),
        mode,
        input: input.join(" "),
    })
}

/// Write one event to the terminal. Deltas go to `out`, everything else to
/// `err`. Returns the exit code once a terminal event is seen.
pub fn render_event(
    event: &TurnEvent,
    out: &mut impl Write,
    err: &mut impl Write,
) -> std::io::Result<Option<i32>> {
    match event {
        TurnEvent::Metadata(meta) => {
            if !meta.guardrails_triggered.is_empty() {
                writeln!(err, "[guardrails: {}]", meta.guardrails_triggered.join(", "))?;
            }
            if let Some(classification) = &meta.classification {
                writeln!(err, "[{}: {}]", classification.classification, classification.reason)?;
            }
            Ok(None)
        }
        TurnEvent::Delta { content } => {
            write!(out, "{}", content)?;
            out.flush()?;
            Ok(None)
        }
        TurnEvent::Done {
            duration_ms,
            turn_count,
        } => {
            writeln!(out)?;
            match turn_count {
                Some(turns) => writeln!(err, "[done in {} ms, turn {}]", duration_ms, turns)?,
                None => writeln!(err, "[done in {} ms]", duration_ms)?,
            }
            Ok(Some(EXIT_OK))
        }
        TurnEvent::Error { message } => {
            writeln!(out)?;
            writeln!(err, "Error: {}", message)?;
            Ok(Some(EXIT_FAILURE))
        }
    }
}

/// Relay a turn to stdout/stderr until it ends or Ctrl-C cancels it.
pub async fn print_turn(mut turn: TurnStream) -> Result<i32, CliError> {
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    loop {
        tokio::select! {
            event = turn.next() => {
                let Some(event) = event else {
                    return Ok(EXIT_FAILURE);
                };
                let code = render_event(&event, &mut stdout.lock(), &mut stderr.lock())?;
                if let Some(code) = code {
                    return Ok(code);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                turn.cancel();
                eprintln!("\n[cancelled]");
                return Ok(EXIT_FAILURE);
            }
        }
    }
}

/// Print the scenario catalog.
pub fn run_scenarios() -> i32 {
    for s in scenario::all() {
        let mut flags = Vec::new();
        if s.handles_sensitive_data {
            flags.push("scrubs-input");
        }
        if s.requires_human_review {
            flags.push("human-review");
        }
        println!("{}  {:<36} {:<26} {}", s.id, s.title, s.dimension, flags.join(","));
    }
    EXIT_OK
}

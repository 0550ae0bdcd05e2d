// Copyright 2024-2026 Guardrail CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! `chat` subcommand: interactive session over stdin.
//!
//! Each line is one turn. Ctrl-C cancels the turn in flight without ending
//! the session. Lines starting with `/` are commands:
//!
//! - `/clear` drops the session and starts a fresh one
//! - `/audit` prints the audit log as JSON
//! - `/quit` exits

use tokio::io::{AsyncBufReadExt, BufReader};

use super::{print_turn, CliError, EXIT_OK};
use crate::orchestrator::Orchestrator;
use crate::session::SessionMode;

/// Arguments of `chat [--unguarded] [--scenario <id>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatArgs {
    pub mode: SessionMode,
    pub scenario_id: Option<String>,
}

/// Parse the arguments that follow `chat`.
pub fn parse_chat_args(args: &[String]) -> Result<ChatArgs, CliError> {
    let mut parsed = ChatArgs {
        mode: SessionMode::Guarded,
        scenario_id: None,
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--unguarded" => parsed.mode = SessionMode::Unguarded,
            "--guarded" => parsed.mode = SessionMode::Guarded,
            "--scenario" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| CliError::Usage("Missing value for --scenario".into()))?;
                parsed.scenario_id = Some(value.clone());
                i += 1;
            }
            other => return Err(CliError::Usage(format!("Unknown argument: {}", other))),
        }
        i += 1;
    }
    Ok(parsed)
}

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLine<'a> {
    Empty,
    Quit,
    Clear,
    Audit,
    Unknown(&'a str),
    Message(&'a str),
}

pub fn parse_line(line: &str) -> ChatLine<'_> {
    let trimmed = line.trim();
    match trimmed {
        "" => ChatLine::Empty,
        "/quit" | "/exit" => ChatLine::Quit,
        "/clear" => ChatLine::Clear,
        "/audit" => ChatLine::Audit,
        cmd if cmd.starts_with('/') => ChatLine::Unknown(cmd),
        text => ChatLine::Message(text),
    }
}

/// Run the interactive loop until `/quit` or end of input.
pub async fn run_chat(orchestrator: &Orchestrator, args: ChatArgs) -> Result<i32, CliError> {
    let scenario = args.scenario_id.as_deref();
    let mut session = orchestrator.create_session(args.mode, scenario)?;
    eprintln!("[{} session {}] /clear, /audit, /quit", args.mode, session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            ChatLine::Empty => continue,
            ChatLine::Quit => break,
            ChatLine::Clear => {
                orchestrator.clear_session(&session);
                session = orchestrator.create_session(args.mode, scenario)?;
                eprintln!("[new session {}]", session);
            }
            ChatLine::Audit => {
                let snapshot = orchestrator.audit_snapshot().await;
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
            ChatLine::Unknown(cmd) => eprintln!("Unknown command: {}", cmd),
            ChatLine::Message(text) => match orchestrator.post_turn(&session, text).await {
                Ok(turn) => {
                    print_turn(turn).await?;
                }
                Err(e) => eprintln!("{}", e),
            },
        }
    }

    orchestrator.clear_session(&session);
    Ok(EXIT_OK)
}

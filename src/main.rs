//! guardrail-cli entry point.
//!
//! Bootstraps the guardrail runtime with:
//! - `.env` loading
//! - Configuration loading
//! - Structured logging
//!
//! ## CLI Subcommands
//!
//! - `guardrail-cli scan [text...]` - Run the checks on text or stdin
//! - `guardrail-cli chat` - Interactive guarded session (default)
//! - `guardrail-cli run <scenario> <input...>` - One-shot scenario run
//! - `guardrail-cli scenarios` - List the scenario catalog
//! - `guardrail-cli config show|defaults|validate`

use std::process::ExitCode;

use guardrail_core::cli::chat_cmd::{parse_chat_args, run_chat};
use guardrail_core::cli::scan_cmd::run_scan;
use guardrail_core::cli::{parse_run_args, print_turn, run_scenarios, CliError};
use guardrail_core::scenario;
use guardrail_core::telemetry::{self, LogConfig};
use guardrail_core::{Runtime, RuntimeConfig};

#[tokio::main]
async fn main() -> ExitCode {
    // Missing .env is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("chat");
    let rest = args.get(2..).unwrap_or(&[]);

    match command {
        "scan" => finish(run_scan(rest)),
        "chat" => {
            let config = RuntimeConfig::from_env();
            init_telemetry(&config);
            let result = match parse_chat_args(rest) {
                Ok(chat_args) => match Runtime::new(config) {
                    Ok(runtime) => run_chat(&runtime.orchestrator, chat_args).await,
                    Err(e) => Err(CliError::from(e)),
                },
                Err(e) => Err(e),
            };
            finish(result)
        }
        "run" => {
            let config = RuntimeConfig::from_env();
            init_telemetry(&config);
            finish(run_one_shot(config, rest).await)
        }
        "scenarios" => ExitCode::from(run_scenarios() as u8),
        "config" => {
            let subcommand = rest.first().map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    guardrail_core::cli::config_cmd::run_show();
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    guardrail_core::cli::config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => {
                    let code = guardrail_core::cli::config_cmd::run_validate();
                    ExitCode::from(code as u8)
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = rest.first() {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("guardrail-cli {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn init_telemetry(config: &RuntimeConfig) {
    if let Err(e) = telemetry::init_logging(&LogConfig::from_env(&config.env)) {
        eprintln!("Logging disabled: {}", e);
    }
    telemetry::init_metrics();
}

fn finish(result: Result<i32, CliError>) -> ExitCode {
    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("{}", e);
            if let CliError::Usage(_) = e {
                print_usage();
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Run one scenario and stream the reply.
async fn run_one_shot(config: RuntimeConfig, args: &[String]) -> Result<i32, CliError> {
    let run = parse_run_args(args)?;
    let input = if run.input.is_empty() {
        scenario::get(&run.scenario_id)
            .map(|s| s.sample_input.to_string())
            .unwrap_or_default()
    } else {
        run.input
    };

    let runtime = Runtime::new(config)?;
    let turn = runtime
        .orchestrator
        .run_scenario(&run.scenario_id, &input, run.mode)
        .await?;
    print_turn(turn).await
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "guardrail-cli - Guardrail pipeline and audited LLM sessions v{}

USAGE:
    guardrail-cli [COMMAND] [OPTIONS]

COMMANDS:
    chat         Interactive session (default when no command given)
    run          Run one scenario once
    scan         Run injection, PII and classification checks on text
    scenarios    List the scenario catalog
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    guardrail-cli chat                          # Guarded chat session
    guardrail-cli chat --unguarded              # Same, with no guardrails
    guardrail-cli run uc02                      # Log analyzer on sample input
    guardrail-cli scan \"my key is sk_live_abc12345678\"
    guardrail-cli config validate

ENVIRONMENT:
    GROQ_API_KEY          Completion credential (required for chat and run)
    GUARDRAIL_MODEL       Model id
    GUARDRAIL_LOG_LEVEL   Log filter (default: info)
    GUARDRAIL_LOG_FORMAT  json or pretty
    GUARDRAIL_LOG_FILE    Append logs to this file (default: stderr)

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "chat" => {
            eprintln!(
                "guardrail-cli chat - Interactive session

USAGE:
    guardrail-cli chat [--unguarded] [--scenario <id>]

DESCRIPTION:
    Reads one message per line from stdin and streams each reply.
    Guarded sessions deflect prompt injection, scrub email addresses and
    flag destructive commands. Ctrl-C cancels the reply in progress.

COMMANDS:
    /clear   Start a fresh session
    /audit   Print the audit log
    /quit    Exit
"
            );
        }
        "run" => {
            eprintln!(
                "guardrail-cli run - One-shot scenario run

USAGE:
    guardrail-cli run <scenario> [--unguarded] [input...]

DESCRIPTION:
    Sends the input through the scenario's prompt. Without input the
    scenario's sample input is used. See `guardrail-cli scenarios`.
"
            );
        }
        "scan" => {
            eprintln!(
                "guardrail-cli scan - Inspect text

USAGE:
    guardrail-cli scan [text...]

DESCRIPTION:
    Prints the injection finding, redaction result, classification and
    destructive-command matches as JSON. Reads stdin when no text is
    given. Needs no credential.
"
            );
        }
        "config" => {
            eprintln!(
                "guardrail-cli config - Inspect configuration

USAGE:
    guardrail-cli config <SUBCOMMAND>

SUBCOMMANDS:
    show       Effective values (the credential is shown as a status only)
    defaults   Default values
    validate   Warn about missing credentials and invalid values

EXIT CODES:
    0  Valid
    1  Warnings found
"
            );
        }
        _ => {
            eprintln!("No detailed help available for '{}'", command);
            print_usage();
        }
    }
}

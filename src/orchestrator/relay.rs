//! Streaming relay: forwards completion fragments as turn events and
//! commits the turn once the upstream stream ends.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tracing::Span;

use crate::completion::{CompletionError, CompletionRequest, CompletionService};
use crate::scenario::Scenario;
use crate::security::{AuditEntry, AuditLog, Category};
use crate::session::Session;
use crate::telemetry::{self, log_security_event, SecurityEvent, SpanExt, TurnOutcome};

use super::events::{TurnEvent, TurnSender};
use super::guard::GuardReport;

/// Everything the relay task needs for one forwarded turn.
pub(crate) struct RelayContext {
    pub scenario: &'static Scenario,
    pub report: GuardReport,
    /// Caller's original text
    pub input: String,
    /// User message appended to history on success
    pub user_message: String,
    pub request: CompletionRequest,
    pub completion: Arc<dyn CompletionService>,
    pub audit: AuditLog,
    pub started: Instant,
    /// Session id for log lines, `-` for one-shot runs
    pub label: String,
}

/// Drive one turn to completion, failure or cancellation.
///
/// The session is only mutated after the upstream stream has ended cleanly.
pub(crate) async fn run(
    ctx: RelayContext,
    session: Option<&mut Session>,
    tx: &TurnSender,
) -> TurnOutcome {
    let span = Span::current();

    if !tx.send(TurnEvent::Metadata(ctx.report.metadata(&ctx.input))).await {
        return cancelled(&ctx, &span, 0);
    }

    let opened = tokio::select! {
        biased;
        () = tx.cancel_token().cancelled() => return cancelled(&ctx, &span, 0),
        opened = ctx.completion.stream(ctx.request.clone()) => opened,
    };
    let mut upstream = match opened {
        Ok(upstream) => upstream,
        Err(e) => return failed(&ctx, &span, tx, e).await,
    };

    let mut response = String::new();
    let mut deltas = 0u64;
    loop {
        let item = tokio::select! {
            biased;
            () = tx.cancel_token().cancelled() => None,
            item = upstream.next() => Some(item),
        };
        match item {
            None => {
                drop(upstream);
                return cancelled(&ctx, &span, deltas);
            }
            Some(Some(Ok(fragment))) => {
                if fragment.is_empty() {
                    continue;
                }
                response.push_str(&fragment);
                deltas += 1;
                if !tx.send(TurnEvent::delta(fragment)).await {
                    drop(upstream);
                    return cancelled(&ctx, &span, deltas);
                }
            }
            Some(Some(Err(e))) => {
                drop(upstream);
                return failed(&ctx, &span, tx, e).await;
            }
            Some(None) => break,
        }
    }
    drop(upstream);

    let turn_count = session.map(|session| {
        session.commit_turn(ctx.user_message.clone(), response.clone());
        session.turn_count
    });
    let duration_ms = ctx.started.elapsed().as_millis() as u64;
    record_audit(&ctx, &response, duration_ms).await;

    span.record_turn(TurnOutcome::Completed, duration_ms, deltas);
    telemetry::record_turn(TurnOutcome::Completed, duration_ms);

    tx.send(TurnEvent::Done {
        duration_ms,
        turn_count,
    })
    .await;
    TurnOutcome::Completed
}

async fn record_audit(ctx: &RelayContext, response: &str, duration_ms: u64) {
    let report = &ctx.report;
    let built = AuditEntry::builder()
        .scenario(ctx.scenario.id, ctx.scenario.title)
        .verdict(report.mode.verdict())
        .prompt(&report.outbound)
        .response(response)
        .guardrails(&report.labels)
        .injection_detected(report.injection_detected())
        .pii_categories(report.pii_categories())
        .human_review(report.human_review)
        .duration_ms(duration_ms)
        .model(ctx.request.model.clone())
        .build();

    match built {
        Ok(entry) => {
            ctx.audit.add(entry).await;
        }
        Err(e) => tracing::error!(session = %ctx.label, error = e, "audit entry rejected"),
    }
}

async fn failed(
    ctx: &RelayContext,
    span: &Span,
    tx: &TurnSender,
    error: CompletionError,
) -> TurnOutcome {
    let duration_ms = ctx.started.elapsed().as_millis() as u64;
    let authentication = if error.is_authentication() { "true" } else { "false" };
    log_security_event(
        SecurityEvent::UpstreamFailure,
        "completion failed",
        &[("session", ctx.label.as_str()), ("authentication", authentication)],
    );
    if error.is_warning() {
        tracing::warn!(session = %ctx.label, error = %error, "completion rejected");
    } else {
        tracing::error!(session = %ctx.label, error = %error, "completion failed");
    }

    span.record_failure(&error, duration_ms);
    telemetry::record_turn(TurnOutcome::Failed, duration_ms);

    tx.send(TurnEvent::error(error.user_message())).await;
    TurnOutcome::Failed
}

fn cancelled(ctx: &RelayContext, span: &Span, deltas: u64) -> TurnOutcome {
    let duration_ms = ctx.started.elapsed().as_millis() as u64;
    log_security_event(
        SecurityEvent::TurnCancelled,
        "turn cancelled before completion",
        &[("session", ctx.label.as_str())],
    );
    span.record_turn(TurnOutcome::Cancelled, duration_ms, deltas);
    telemetry::record_turn(TurnOutcome::Cancelled, duration_ms);
    TurnOutcome::Cancelled
}

/// Categories joined for log lines.
pub(crate) fn category_list(categories: &[Category]) -> String {
    categories
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

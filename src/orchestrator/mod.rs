//! Guardrail orchestrator.
//!
//! Runs the guarded state machine for each turn:
//!
//! 1. Injection check. Chat deflects, one-shot scenarios sanitize.
//! 2. Credential preflight. Fails with a configuration error, no audit.
//! 3. Content checks: destructive-action advisory, conditional PII scrub.
//! 4. Completion call, relayed as [`TurnEvent`]s by a spawned task.
//!
//! Unguarded turns skip steps 1 and 3. The session mutex is held from the
//! start of a turn until its relay finishes, so turns on one session are
//! processed in arrival order.

mod events;
mod guard;
mod relay;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

pub use events::{GuardrailMetadata, TurnEvent, TurnStream};

use crate::completion::{CompletionRequest, CompletionService};
use crate::config::API_KEY_SETUP_MESSAGE;
use crate::error::{GuardrailError, Result};
use crate::scenario::{self, Scenario, DEFAULT_CHAT_SCENARIO};
use crate::security::{deflection_message, AuditEntry, AuditLog, AuditStats, Verdict};
use crate::session::{ConversationMessage, Session, SessionId, SessionMode, SessionStore};
use crate::telemetry::{self, log_security_event, SecurityEvent, SpanExt, TurnOutcome, TurnSpan};

use guard::{GuardReport, InjectionScreen};
use relay::RelayContext;

/// Model name recorded for deflected turns.
pub const DEFLECTED_MODEL: &str = "DEFLECTED";
/// Response summary recorded for deflected turns.
pub const DEFLECTED_SUMMARY: &str = "Deflected - prompt injection detected";
const INJECTION_PROMPT_PREFIX: &str = "[INJECTION ATTEMPT] ";
const INJECTION_PROMPT_CHARS: usize = 100;

pub const DEFAULT_STREAM_BUFFER: usize = 64;
const MIN_STREAM_BUFFER: usize = 4;

/// Audit entries plus aggregate statistics.
#[derive(Debug, Clone, Serialize)]
pub struct AuditSnapshot {
    pub entries: Vec<AuditEntry>,
    pub stats: AuditStats,
}

enum Screened {
    Deflected(GuardReport),
    Forward(GuardReport),
}

/// Wraps completion calls with guardrails, session state and auditing.
pub struct Orchestrator {
    completion: Arc<dyn CompletionService>,
    sessions: Arc<SessionStore>,
    audit: AuditLog,
    stream_buffer: usize,
    in_flight: Arc<Mutex<HashMap<SessionId, CancellationToken>>>,
}

impl Orchestrator {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        sessions: Arc<SessionStore>,
        audit: AuditLog,
    ) -> Self {
        Self {
            completion,
            sessions,
            audit,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Per-turn event channel capacity.
    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(MIN_STREAM_BUFFER);
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn completion(&self) -> &dyn CompletionService {
        self.completion.as_ref()
    }

    /// Start a session bound to `scenario_id`, or the chat scenario.
    pub fn create_session(&self, mode: SessionMode, scenario_id: Option<&str>) -> Result<SessionId> {
        let scenario = lookup_scenario(scenario_id.unwrap_or(DEFAULT_CHAT_SCENARIO))?;
        Ok(self.sessions.create(mode, scenario))
    }

    /// Snapshot of a session. Waits for an in-flight turn to finish.
    pub async fn session(&self, id: &SessionId) -> Result<Session> {
        self.sessions
            .get(id)
            .await
            .ok_or_else(|| GuardrailError::SessionNotFound(id.to_string()))
    }

    /// Remove a session, cancelling any turn in flight on it.
    pub fn clear_session(&self, id: &SessionId) -> bool {
        self.cancel_turn(id);
        self.sessions.clear(id)
    }

    /// Cancel the turn in flight on a session. Returns true if one was running.
    pub fn cancel_turn(&self, id: &SessionId) -> bool {
        match self.in_flight.lock().get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Submit one user turn to a session.
    ///
    /// Configuration, validation and lookup failures return `Err` before
    /// any stream exists. Upstream failures arrive as the stream's terminal
    /// `error` event.
    pub async fn post_turn(&self, id: &SessionId, text: &str) -> Result<TurnStream> {
        let started = Instant::now();
        validate_input(text)?;
        let handle = self
            .sessions
            .handle(id)
            .ok_or_else(|| GuardrailError::SessionNotFound(id.to_string()))?;
        let session = Arc::clone(&handle).lock_owned().await;
        // The session may have been cleared or evicted while queued.
        match self.sessions.handle(id) {
            Some(current) if Arc::ptr_eq(&current, &handle) => {}
            _ => return Err(GuardrailError::SessionNotFound(id.to_string())),
        }
        let scenario = lookup_scenario(&session.scenario_id)?;
        let mode = session.mode;
        let span = TurnSpan::new(id.as_str(), scenario.id, mode.as_str());

        let report = match self.screen(scenario, mode, text, id.as_str())? {
            Screened::Deflected(report) => {
                return Ok(self
                    .deflect(scenario, report, text, Some(session), started, span)
                    .await);
            }
            Screened::Forward(report) => report,
        };

        let user_message = scenario.render_prompt(mode, &report.outbound);
        let mut messages = session.messages.clone();
        messages.push(ConversationMessage::user(user_message.clone()));

        let ctx = self.relay_context(scenario, report, text, user_message, messages, started, id.as_str());
        Ok(self.spawn_relay(ctx, Some(session), span))
    }

    /// Run a scenario once, without a session.
    pub async fn run_scenario(
        &self,
        scenario_id: &str,
        input: &str,
        mode: SessionMode,
    ) -> Result<TurnStream> {
        let started = Instant::now();
        validate_input(input)?;
        let scenario = lookup_scenario(scenario_id)?;
        let span = TurnSpan::one_shot(scenario.id, mode.as_str());

        let report = match self.screen(scenario, mode, input, "-")? {
            Screened::Deflected(report) => {
                return Ok(self.deflect(scenario, report, input, None, started, span).await);
            }
            Screened::Forward(report) => report,
        };

        let profile = scenario.profile(mode);
        let user_message = scenario.render_prompt(mode, &report.outbound);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = profile.system_prompt {
            messages.push(ConversationMessage::system(system));
        }
        messages.push(ConversationMessage::user(user_message.clone()));

        let ctx = self.relay_context(scenario, report, input, user_message, messages, started, "-");
        Ok(self.spawn_relay(ctx, None, span))
    }

    /// All audit entries, newest first, with statistics.
    pub async fn audit_snapshot(&self) -> AuditSnapshot {
        AuditSnapshot {
            entries: self.audit.entries().await,
            stats: self.audit.stats().await,
        }
    }

    pub async fn clear_audit_log(&self) {
        self.audit.clear().await;
        log_security_event(SecurityEvent::AuditCleared, "audit log cleared", &[]);
    }

    /// Injection check, credential preflight, then content checks.
    fn screen(
        &self,
        scenario: &Scenario,
        mode: SessionMode,
        text: &str,
        label: &str,
    ) -> Result<Screened> {
        if mode == SessionMode::Unguarded {
            self.preflight(label)?;
            return Ok(Screened::Forward(GuardReport::unguarded(text)));
        }

        let screen = guard::screen_injection(scenario, text);
        let confidence = match &screen {
            InjectionScreen::Clean => None,
            InjectionScreen::Deflect(f) | InjectionScreen::Sanitize(f) => {
                Some(f.confidence.to_string())
            }
        };
        let mut report = GuardReport::guarded(scenario, text, screen);

        if let Some(confidence) = confidence.as_deref() {
            let patterns = report
                .injection
                .as_ref()
                .map(|f| f.matched_patterns.join(","))
                .unwrap_or_default();
            let event = if report.deflected {
                SecurityEvent::InjectionDeflected
            } else {
                SecurityEvent::InjectionSanitized
            };
            log_security_event(
                event,
                "prompt injection detected",
                &[
                    ("session", label),
                    ("scenario", scenario.id),
                    ("confidence", confidence),
                    ("patterns", patterns.as_str()),
                ],
            );
        }
        if report.deflected {
            record_labels(&report);
            return Ok(Screened::Deflected(report));
        }

        self.preflight(label)?;
        report.screen_content(scenario);

        if !report.destructive.is_empty() {
            log_security_event(
                SecurityEvent::DestructiveFlagged,
                "destructive action flagged for review",
                &[("session", label), ("matched", report.destructive.join(",").as_str())],
            );
        }
        if let Some(redaction) = report.redaction.as_ref().filter(|r| !r.is_clean()) {
            let categories = relay::category_list(&report.pii_categories());
            log_security_event(
                SecurityEvent::PiiRedacted,
                "sensitive data redacted before completion",
                &[
                    ("session", label),
                    ("count", redaction.redaction_count.to_string().as_str()),
                    ("categories", categories.as_str()),
                ],
            );
        }
        record_labels(&report);
        Ok(Screened::Forward(report))
    }

    fn preflight(&self, label: &str) -> Result<()> {
        if self.completion.has_valid_credential() {
            return Ok(());
        }
        log_security_event(
            SecurityEvent::CredentialMissing,
            "completion credential missing or placeholder",
            &[("session", label)],
        );
        Err(GuardrailError::Configuration(API_KEY_SETUP_MESSAGE.to_string()))
    }

    /// Answer with the fixed deflection. Nothing is forwarded and the user's
    /// text is not added to history.
    async fn deflect(
        &self,
        scenario: &Scenario,
        report: GuardReport,
        input: &str,
        session: Option<OwnedMutexGuard<Session>>,
        started: Instant,
        span: Span,
    ) -> TurnStream {
        let reply = deflection_message();
        let turn_count = session.map(|mut session| {
            session.append_assistant_turn(reply);
            session.turn_count
        });
        let duration_ms = started.elapsed().as_millis() as u64;

        let prompt: String = input.chars().take(INJECTION_PROMPT_CHARS).collect();
        let built = AuditEntry::builder()
            .scenario(scenario.id, scenario.title)
            .verdict(Verdict::Guarded)
            .prompt_summary(format!("{}{}", INJECTION_PROMPT_PREFIX, prompt))
            .response(DEFLECTED_SUMMARY)
            .guardrails(&report.labels)
            .injection_detected(true)
            .duration_ms(duration_ms)
            .model(DEFLECTED_MODEL)
            .build();
        match built {
            Ok(entry) => {
                self.audit.add(entry).await;
            }
            Err(e) => tracing::error!(error = e, "audit entry rejected"),
        }

        span.record_turn(TurnOutcome::Deflected, duration_ms, 1);
        telemetry::record_turn(TurnOutcome::Deflected, duration_ms);

        let (tx, stream) = TurnStream::new(self.stream_buffer, CancellationToken::new());
        tx.try_send(TurnEvent::Metadata(report.metadata(input)));
        tx.try_send(TurnEvent::delta(reply));
        tx.try_send(TurnEvent::Done {
            duration_ms,
            turn_count,
        });
        stream
    }

    #[allow(clippy::too_many_arguments)]
    fn relay_context(
        &self,
        scenario: &'static Scenario,
        report: GuardReport,
        input: &str,
        user_message: String,
        messages: Vec<ConversationMessage>,
        started: Instant,
        label: &str,
    ) -> RelayContext {
        let profile = scenario.profile(report.mode);
        let request = CompletionRequest {
            model: self.completion.model().to_string(),
            messages,
            temperature: profile.temperature,
            max_tokens: scenario.max_tokens,
        };
        RelayContext {
            scenario,
            report,
            input: input.to_string(),
            user_message,
            request,
            completion: Arc::clone(&self.completion),
            audit: self.audit.clone(),
            started,
            label: label.to_string(),
        }
    }

    fn spawn_relay(
        &self,
        ctx: RelayContext,
        session: Option<OwnedMutexGuard<Session>>,
        span: Span,
    ) -> TurnStream {
        let cancel = CancellationToken::new();
        let (tx, stream) = TurnStream::new(self.stream_buffer, cancel.clone());

        let session_id = session.as_ref().map(|s| s.id.clone());
        if let Some(id) = &session_id {
            self.in_flight.lock().insert(id.clone(), cancel);
        }
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(
            async move {
                let mut session = session;
                relay::run(ctx, session.as_deref_mut(), &tx).await;
                if let Some(id) = session_id {
                    in_flight.lock().remove(&id);
                }
                drop(session);
            }
            .instrument(span),
        );
        stream
    }
}

fn validate_input(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(GuardrailError::Validation("message is required".to_string()));
    }
    Ok(())
}

fn lookup_scenario(id: &str) -> Result<&'static Scenario> {
    scenario::get(id).ok_or_else(|| GuardrailError::ScenarioNotFound(id.to_string()))
}

fn record_labels(report: &GuardReport) {
    for label in &report.labels {
        telemetry::record_guardrail(label);
    }
}

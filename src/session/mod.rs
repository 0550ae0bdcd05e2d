//! Conversation session store.
//!
//! Sessions live in a concurrent map keyed by id. Each session sits behind its
//! own async mutex; the orchestrator holds that mutex for a whole turn, so
//! turns on one session run in arrival order while different sessions never
//! wait on each other.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::scenario::Scenario;
use crate::security::Verdict;
use crate::telemetry::{log_security_event, SecurityEvent};

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Guardrail mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Guarded,
    Unguarded,
}

impl SessionMode {
    pub fn verdict(&self) -> Verdict {
        match self {
            SessionMode::Guarded => Verdict::Guarded,
            SessionMode::Unguarded => Verdict::Unguarded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Guarded => "guarded",
            SessionMode::Unguarded => "unguarded",
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Conversation state. Mutated only while its store mutex is held.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub mode: SessionMode,
    pub scenario_id: String,
    pub messages: Vec<ConversationMessage>,
    pub created_at: DateTime<Utc>,
    pub turn_count: u32,
}

impl Session {
    fn new(id: SessionId, mode: SessionMode, scenario: &Scenario) -> Self {
        let mut messages = Vec::new();
        if mode == SessionMode::Guarded {
            if let Some(prompt) = scenario.guarded.system_prompt {
                messages.push(ConversationMessage::system(prompt));
            }
        }
        Self {
            id,
            mode,
            scenario_id: scenario.id.to_string(),
            messages,
            created_at: Utc::now(),
            turn_count: 0,
        }
    }

    pub fn append_user_turn(&mut self, content: impl Into<String>) {
        self.messages.push(ConversationMessage::user(content));
    }

    /// Append the assistant reply; this completes a turn.
    pub fn append_assistant_turn(&mut self, content: impl Into<String>) {
        self.messages.push(ConversationMessage::assistant(content));
        self.turn_count += 1;
    }

    /// Append a full user/assistant pair in one step.
    pub fn commit_turn(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.append_user_turn(user);
        self.append_assistant_turn(assistant);
    }

    /// Messages without the system prompt.
    pub fn public_messages(&self) -> Vec<ConversationMessage> {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect()
    }
}

/// Session store configuration.
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// Oldest session is evicted when a create would exceed this
    pub max_sessions: usize,
    /// Sessions older than this are dropped on access; `None` never expires
    pub ttl: Option<Duration>,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            ttl: None,
        }
    }
}

/// Shared handle to one session's state.
pub type SessionHandle = Arc<Mutex<Session>>;

struct SessionSlot {
    created_at: Instant,
    session: SessionHandle,
}

/// Keyed, in-memory session state.
pub struct SessionStore {
    sessions: DashMap<SessionId, SessionSlot>,
    config: SessionStoreConfig,
}

impl SessionStore {
    pub fn new(config: SessionStoreConfig) -> Self {
        let config = SessionStoreConfig {
            max_sessions: config.max_sessions.max(1),
            ..config
        };
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    /// Create a session bound to `scenario`. Guarded sessions start with the
    /// scenario's system prompt.
    pub fn create(&self, mode: SessionMode, scenario: &Scenario) -> SessionId {
        self.evict_expired();
        while self.sessions.len() >= self.config.max_sessions {
            if !self.evict_oldest() {
                break;
            }
        }

        let id = SessionId::generate();
        let session = Session::new(id.clone(), mode, scenario);
        self.sessions.insert(
            id.clone(),
            SessionSlot {
                created_at: Instant::now(),
                session: Arc::new(Mutex::new(session)),
            },
        );

        log_security_event(
            SecurityEvent::SessionCreated,
            &format!("mode={} scenario={}", mode, scenario.id),
            &[("session", id.as_str())],
        );
        id
    }

    /// Handle for locking a session, if it exists and has not expired.
    pub fn handle(&self, id: &SessionId) -> Option<SessionHandle> {
        let expired = {
            let slot = self.sessions.get(id)?;
            if !self.is_expired(&slot) {
                return Some(slot.session.clone());
            }
            true
        };
        if expired && self.sessions.remove(id).is_some() {
            log_security_event(SecurityEvent::SessionEvicted, "ttl expired", &[("session", id.as_str())]);
        }
        None
    }

    /// Snapshot of a session. Waits for any in-flight turn on it.
    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        let handle = self.handle(id)?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// Remove a session. Returns true if it existed.
    ///
    /// A turn already holding the session's lock finishes against its
    /// detached state.
    pub fn clear(&self, id: &SessionId) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            log_security_event(SecurityEvent::SessionCleared, "session cleared", &[("session", id.as_str())]);
        }
        removed
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Drop sessions past their TTL. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let Some(ttl) = self.config.ttl else {
            return 0;
        };
        let before = self.sessions.len();
        self.sessions.retain(|_, slot| slot.created_at.elapsed() <= ttl);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            log_security_event(
                SecurityEvent::SessionEvicted,
                "ttl expired",
                &[("count", removed.to_string().as_str())],
            );
        }
        removed
    }

    fn evict_oldest(&self) -> bool {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|e| e.created_at)
            .map(|e| e.key().clone());
        match oldest {
            Some(key) => {
                self.sessions.remove(&key);
                log_security_event(SecurityEvent::SessionEvicted, "capacity", &[("session", key.as_str())]);
                true
            }
            None => false,
        }
    }

    fn is_expired(&self, slot: &SessionSlot) -> bool {
        self.config
            .ttl
            .map(|ttl| slot.created_at.elapsed() > ttl)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionStoreConfig::default())
    }
}

//! Shared fixtures for integration tests.
//!
//! `ScriptedCompletion` stands in for the upstream service: each call pops
//! the next scripted reply (or falls back to the default fragments), and
//! every request is recorded for inspection.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;

use guardrail_core::completion::{
    CompletionError, CompletionRequest, CompletionService, CompletionStream,
};
use guardrail_core::security::{AuditConfig, AuditLog};
use guardrail_core::session::{SessionStore, SessionStoreConfig};
use guardrail_core::Orchestrator;

pub const MODEL: &str = "scripted-model";

/// One scripted upstream behavior.
pub enum Reply {
    /// Stream these fragments, then end.
    Fragments(Vec<&'static str>),
    /// Fail before the first fragment.
    FailToOpen(CompletionError),
    /// Stream these fragments, then fail.
    FailMidStream(Vec<&'static str>, CompletionError),
    /// Stream these fragments, then wait for the gate before ending.
    Gated(Vec<&'static str>, Arc<Notify>),
    /// Stream these fragments, then never end.
    Hang(Vec<&'static str>),
}

pub struct ScriptedCompletion {
    valid_credential: bool,
    replies: Mutex<VecDeque<Reply>>,
    default_fragments: Vec<&'static str>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
    released: Arc<AtomicBool>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            valid_credential: true,
            replies: Mutex::new(VecDeque::new()),
            default_fragments: vec!["Hel", "lo"],
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A service whose credential is missing.
    pub fn unconfigured() -> Self {
        Self {
            valid_credential: false,
            ..Self::new()
        }
    }

    pub fn with_reply(self, reply: Reply) -> Self {
        self.replies.lock().push_back(reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Last user message sent upstream.
    pub fn last_user_message(&self) -> Option<String> {
        self.requests
            .lock()
            .last()
            .and_then(|r| r.messages.last())
            .map(|m| m.content.clone())
    }

    /// True once a hanging or gated stream has been dropped.
    pub fn stream_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn fragments(items: Vec<&'static str>) -> impl futures::Stream<Item = Result<String, CompletionError>> {
    stream::iter(items.into_iter().map(|s| Ok(s.to_string())))
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    fn model(&self) -> &str {
        MODEL
    }

    fn has_valid_credential(&self) -> bool {
        self.valid_credential
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);

        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Reply::Fragments(self.default_fragments.clone()));

        let released = Arc::clone(&self.released);
        let stream: CompletionStream = match reply {
            Reply::Fragments(items) => Box::pin(fragments(items)),
            Reply::FailToOpen(e) => return Err(e),
            Reply::FailMidStream(items, e) => {
                Box::pin(fragments(items).chain(stream::iter(vec![Err(e)])))
            }
            Reply::Gated(items, gate) => {
                let tail = stream::once(async move { gate.notified().await })
                    .filter_map(|()| async { None::<Result<String, CompletionError>> });
                let flag = DropFlag(released);
                Box::pin(fragments(items).chain(tail).map(move |item| {
                    let _ = &flag;
                    item
                }))
            }
            Reply::Hang(items) => {
                let flag = DropFlag(released);
                Box::pin(fragments(items).chain(stream::pending()).map(move |item| {
                    let _ = &flag;
                    item
                }))
            }
        };
        Ok(stream)
    }
}

/// Orchestrator with fresh state around `completion`.
pub fn orchestrator(completion: Arc<ScriptedCompletion>) -> Orchestrator {
    Orchestrator::new(
        completion,
        Arc::new(SessionStore::new(SessionStoreConfig::default())),
        AuditLog::new(AuditConfig::default()),
    )
}

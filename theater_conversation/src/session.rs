//! The per-conversation aggregate.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use theater_core::{Persona, SessionKey, TierCounter, TierStats};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::history::{BoundedBuffer, HistoryRecord};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no API key has been set for this session")]
    CredentialMissing,

    #[error("a conversation is already running for this session")]
    AlreadyActive,

    #[error("no personas configured")]
    NoPersonas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    /// Stop requested; the loop task has not finished yet.
    Stopping,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    Completed,
    Stopped,
    Failed {
        reason: String,
        /// Every tier rejected the credential.
        auth_rejected: bool,
    },
}

/// Sizes of the bounded per-session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub turn_limit: u32,
    pub history_limit: usize,
    pub recent_outputs_limit: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            turn_limit: 100,
            history_limit: 16,
            recent_outputs_limit: 8,
        }
    }
}

/// The running loop of a session.
#[derive(Debug)]
pub(crate) struct LoopHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<LoopOutcome>>,
}

/// Read-only snapshot of a session for status reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub key: SessionKey,
    pub state: LoopState,
    pub active: bool,
    pub has_credential: bool,
    pub turn_count: u32,
    pub turn_limit: u32,
    pub history_len: usize,
    pub recent_outputs_len: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: Option<Duration>,
    pub turns_per_minute: Option<f64>,
    pub last_tier: Option<String>,
    pub last_outcome: Option<LoopOutcome>,
    pub tier_stats: BTreeMap<String, TierCounter>,
}

#[derive(Debug)]
pub struct Session {
    key: SessionKey,
    credential: Option<String>,
    state: LoopState,
    turn_count: u32,
    turn_limit: u32,
    history: BoundedBuffer<HistoryRecord>,
    recent_outputs: BoundedBuffer<String>,
    tier_stats: Arc<TierStats>,
    current_speaker: Option<usize>,
    current_message: String,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    last_tier: Option<String>,
    last_outcome: Option<LoopOutcome>,
    run_id: u64,
    handle: Option<LoopHandle>,
}

impl Session {
    #[must_use]
    pub fn new(key: SessionKey, limits: SessionLimits) -> Self {
        Self {
            key,
            credential: None,
            state: LoopState::Idle,
            turn_count: 0,
            turn_limit: limits.turn_limit.max(1),
            history: BoundedBuffer::new(limits.history_limit),
            recent_outputs: BoundedBuffer::new(limits.recent_outputs_limit),
            tier_stats: Arc::new(TierStats::new()),
            current_speaker: None,
            current_message: String::new(),
            started_at: None,
            finished_at: None,
            last_tier: None,
            last_outcome: None,
            run_id: 0,
            handle: None,
        }
    }

    #[must_use]
    pub const fn key(&self) -> SessionKey {
        self.key
    }

    pub fn set_credential(&mut self, secret: String) {
        self.credential = Some(secret);
    }

    #[must_use]
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref().filter(|c| !c.is_empty())
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == LoopState::Running
    }

    #[must_use]
    pub const fn state(&self) -> LoopState {
        self.state
    }

    #[must_use]
    pub const fn turn_count(&self) -> u32 {
        self.turn_count
    }

    #[must_use]
    pub const fn turn_limit(&self) -> u32 {
        self.turn_limit
    }

    #[must_use]
    pub const fn history(&self) -> &BoundedBuffer<HistoryRecord> {
        &self.history
    }

    #[must_use]
    pub const fn recent_outputs(&self) -> &BoundedBuffer<String> {
        &self.recent_outputs
    }

    #[must_use]
    pub fn tier_stats(&self) -> Arc<TierStats> {
        Arc::clone(&self.tier_stats)
    }

    #[must_use]
    pub const fn current_speaker(&self) -> Option<usize> {
        self.current_speaker
    }

    #[must_use]
    pub fn current_message(&self) -> &str {
        &self.current_message
    }

    #[must_use]
    pub const fn last_outcome(&self) -> Option<&LoopOutcome> {
        self.last_outcome.as_ref()
    }

    #[must_use]
    pub const fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Move to `Running` for a fresh run opening with `opener`.
    ///
    /// Resets the turn counter, history and recent outputs; tier statistics
    /// are kept. Returns the id of the new run.
    pub fn begin_run(&mut self, opener: String, now: DateTime<Utc>) -> Result<u64, SessionError> {
        if self.state != LoopState::Idle {
            return Err(SessionError::AlreadyActive);
        }
        if self.credential().is_none() {
            return Err(SessionError::CredentialMissing);
        }

        self.turn_count = 0;
        self.history.clear();
        self.recent_outputs.clear();
        self.current_speaker = None;
        self.history
            .push(HistoryRecord::system(format!("Opening line: {opener}")));
        self.current_message = opener;
        self.started_at = Some(now);
        self.finished_at = None;
        self.last_outcome = None;
        self.state = LoopState::Running;
        self.run_id += 1;
        Ok(self.run_id)
    }

    pub(crate) fn attach(&mut self, cancel: CancellationToken, task: JoinHandle<LoopOutcome>) {
        self.handle = Some(LoopHandle {
            cancel,
            task: Some(task),
        });
    }

    pub(crate) fn take_task(&mut self) -> Option<JoinHandle<LoopOutcome>> {
        self.handle.as_mut().and_then(|h| h.task.take())
    }

    /// Record a produced turn. `text` is what was delivered, `raw` what the
    /// backend returned. The delivered text becomes the next message.
    ///
    /// Returns the new turn count; a session already at its limit is left
    /// unchanged.
    pub fn record_turn(
        &mut self,
        speaker: usize,
        persona: &Persona,
        text: &str,
        raw: String,
        tier: &str,
    ) -> u32 {
        if self.turn_count >= self.turn_limit {
            return self.turn_count;
        }
        self.history
            .push(HistoryRecord::persona(persona.name.clone(), text));
        self.recent_outputs.push(raw);
        self.current_speaker = Some(speaker);
        self.current_message = text.to_string();
        self.last_tier = Some(tier.to_string());
        self.turn_count += 1;
        self.turn_count
    }

    /// Append `topic` to the next outgoing message.
    pub fn inject_topic(&mut self, topic: &str) {
        self.history
            .push(HistoryRecord::system(format!("Topic change: {topic}")));
        self.current_message = format!("{} {topic}", self.current_message);
    }

    #[must_use]
    pub const fn limit_reached(&self) -> bool {
        self.turn_count >= self.turn_limit
    }

    /// Ask the running loop to stop. Returns false when no loop is running.
    pub fn request_stop(&mut self) -> bool {
        if self.state != LoopState::Running {
            return false;
        }
        self.state = LoopState::Stopping;
        if let Some(handle) = &self.handle {
            handle.cancel.cancel();
        }
        true
    }

    /// Mark run `run_id` as finished. Ignored when a newer run or a reset
    /// has superseded it.
    pub fn finish(&mut self, run_id: u64, outcome: LoopOutcome, now: DateTime<Utc>) -> bool {
        if run_id != self.run_id || self.state == LoopState::Idle {
            return false;
        }
        self.state = LoopState::Idle;
        self.finished_at = Some(now);
        self.last_outcome = Some(outcome);
        true
    }

    /// Drop all conversation state and statistics, keeping the credential.
    /// Any running loop is cancelled and its completion ignored.
    pub fn reset(&mut self) {
        self.request_stop();
        self.state = LoopState::Idle;
        self.turn_count = 0;
        self.history.clear();
        self.recent_outputs.clear();
        self.tier_stats.reset();
        self.current_speaker = None;
        self.current_message.clear();
        self.started_at = None;
        self.finished_at = None;
        self.last_tier = None;
        self.last_outcome = None;
        self.run_id += 1;
    }

    #[must_use]
    pub fn summary(&self, now: DateTime<Utc>) -> SessionSummary {
        let elapsed = self
            .started_at
            .map(|start| self.finished_at.unwrap_or(now) - start);
        let turns_per_minute = elapsed
            .filter(|e| e.num_milliseconds() > 0)
            .map(|e| f64::from(self.turn_count) * 60_000.0 / precise_millis(e));

        SessionSummary {
            key: self.key,
            state: self.state,
            active: self.is_active(),
            has_credential: self.credential().is_some(),
            turn_count: self.turn_count,
            turn_limit: self.turn_limit,
            history_len: self.history.len(),
            recent_outputs_len: self.recent_outputs.len(),
            started_at: self.started_at,
            elapsed,
            turns_per_minute,
            last_tier: self.last_tier.clone(),
            last_outcome: self.last_outcome.clone(),
            tier_stats: self.tier_stats.snapshot(),
        }
    }
}

#[expect(clippy::cast_precision_loss, reason = "durations are far below 2^52 ms")]
fn precise_millis(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64
}

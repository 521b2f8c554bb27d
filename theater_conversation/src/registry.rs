//! Maps external session keys to sessions and their loop tasks.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use theater_core::stats::merge;
use theater_core::{SessionKey, TierCounter};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::ConversationEngine;
use crate::session::{LoopOutcome, LoopState, Session, SessionError, SessionSummary};

/// Aggregate view across every known session.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSummary {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub total_turns: u64,
    pub tier_stats: BTreeMap<String, TierCounter>,
    pub active: Vec<SessionSummary>,
    /// Stop requested, loop task still winding down.
    pub stopping: Vec<SessionSummary>,
}

/// Owns every session and the engine that drives their loops.
///
/// The map itself is behind an `RwLock`; each session has its own mutex that
/// the loop task only holds between suspension points, so status reads never
/// wait on a network call.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionKey, Arc<Mutex<Session>>>>,
    engine: ConversationEngine,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(engine: ConversationEngine) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            engine,
        }
    }

    #[must_use]
    pub const fn engine(&self) -> &ConversationEngine {
        &self.engine
    }

    /// Existing session for `key`, or a fresh idle one.
    pub async fn get_or_create(&self, key: SessionKey) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().await.get(&key) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(key).or_insert_with(|| {
            info!("[{key}] Creating session");
            Arc::new(Mutex::new(Session::new(key, self.engine.config().limits)))
        }))
    }

    pub async fn get(&self, key: SessionKey) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(&key).cloned()
    }

    pub async fn set_credential(&self, key: SessionKey, secret: String) {
        let session = self.get_or_create(key).await;
        session.lock().await.set_credential(secret);
        info!("[{key}] API key set");
    }

    pub async fn has_credential(&self, key: SessionKey) -> bool {
        match self.get(key).await {
            Some(session) => session.lock().await.credential().is_some(),
            None => false,
        }
    }

    /// Start a conversation loop. Returns the opening line.
    pub async fn start(&self, key: SessionKey) -> Result<String, SessionError> {
        let session = self.get_or_create(key).await;
        let mut guard = session.lock().await;

        let opener = self.engine.pick_topic();
        let run_id = guard.begin_run(opener.clone(), Utc::now())?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.engine.clone().run(
            key,
            Arc::clone(&session),
            run_id,
            cancel.clone(),
        ));
        guard.attach(cancel, task);

        info!(
            "[{key}] Conversation started with {} personas, opener: {opener}",
            self.engine.personas().len()
        );
        Ok(opener)
    }

    /// Request the loop of `key` to stop. False when nothing is running.
    pub async fn stop(&self, key: SessionKey) -> bool {
        let Some(session) = self.get(key).await else {
            return false;
        };
        let stopped = session.lock().await.request_stop();
        if stopped {
            info!("[{key}] Stop requested");
        }
        stopped
    }

    /// Stop any loop and wipe the session's conversation state and
    /// statistics. The credential survives. False for an unknown key.
    pub async fn clear(&self, key: SessionKey) -> bool {
        let Some(session) = self.get(key).await else {
            return false;
        };
        session.lock().await.reset();
        info!("[{key}] Session cleared");
        true
    }

    /// Wait for the most recent loop task of `key` to finish.
    pub async fn join(&self, key: SessionKey) -> Option<LoopOutcome> {
        let session = self.get(key).await?;
        let task = session.lock().await.take_task()?;
        task.await.ok()
    }

    pub async fn status(&self, key: SessionKey) -> Option<SessionSummary> {
        let session = self.get(key).await?;
        let summary = session.lock().await.summary(Utc::now());
        Some(summary)
    }

    async fn all_summaries(&self) -> Vec<SessionSummary> {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let now = Utc::now();
        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            summaries.push(session.lock().await.summary(now));
        }
        summaries.sort_by_key(|s| s.key);
        summaries
    }

    pub async fn list_active(&self) -> Vec<SessionSummary> {
        self.all_summaries()
            .await
            .into_iter()
            .filter(|s| s.active)
            .collect()
    }

    pub async fn global_status(&self) -> GlobalSummary {
        let summaries = self.all_summaries().await;
        let tier_stats = merge(summaries.iter().map(|s| &s.tier_stats));
        let total_turns = summaries.iter().map(|s| u64::from(s.turn_count)).sum();
        let active: Vec<SessionSummary> = summaries.iter().filter(|s| s.active).cloned().collect();
        let stopping: Vec<SessionSummary> = summaries
            .iter()
            .filter(|s| s.state == LoopState::Stopping)
            .cloned()
            .collect();

        GlobalSummary {
            total_sessions: summaries.len(),
            active_sessions: active.len(),
            total_turns,
            tier_stats,
            active,
            stopping,
        }
    }

    /// Stop every loop and wait for the tasks to finish.
    pub async fn shutdown(&self) {
        let keys: Vec<SessionKey> = self.sessions.read().await.keys().copied().collect();
        for key in &keys {
            self.stop(*key).await;
        }
        for key in keys {
            self.join(key).await;
        }
        info!("All conversation loops stopped");
    }
}

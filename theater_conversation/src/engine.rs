//! The autonomous conversation loop.
//!
//! One task per running session. Each iteration picks a speaker, asks the
//! completion client for the next line, filters repetition, records the
//! turn and hands it to the delivery sink. Transient failures are absorbed
//! with backoff; the loop ends on stop, on reaching the turn limit, or after
//! `failure_ceiling` consecutive failed turns.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use theater_core::{DeliverySink, Persona, SessionKey};
use theater_providers::{Backoff, Completion, CompletionClient};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::format;
use crate::guard::RepetitionGuard;
use crate::history::PromptBuilder;
use crate::rotator::PersonaRotator;
use crate::session::{LoopOutcome, Session, SessionError, SessionLimits, SessionSummary};

/// Pacing and thresholds for conversation loops.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub limits: SessionLimits,
    pub repetition_window: usize,
    pub similarity_threshold: f64,
    /// Consecutive failed turns that end a run.
    pub failure_ceiling: u32,
    pub turn_delay_min: Duration,
    pub turn_delay_max: Duration,
    pub backoff: Backoff,
    /// Deliver a progress message every this many turns; 0 disables.
    pub report_interval: u32,
    /// Append a fresh topic to the next message every this many turns; 0 disables.
    pub topic_change_interval: u32,
    pub interruption_probability: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: SessionLimits::default(),
            repetition_window: 3,
            similarity_threshold: 0.7,
            failure_ceiling: 3,
            turn_delay_min: Duration::from_secs(2),
            turn_delay_max: Duration::from_secs(6),
            backoff: Backoff::default(),
            report_interval: 20,
            topic_change_interval: 50,
            interruption_probability: 0.3,
        }
    }
}

impl EngineConfig {
    fn draw_turn_delay(&self) -> Duration {
        if self.turn_delay_max <= self.turn_delay_min {
            return self.turn_delay_min;
        }
        rand::thread_rng().gen_range(self.turn_delay_min..=self.turn_delay_max)
    }
}

const fn is_multiple(turn: u32, interval: u32) -> bool {
    interval > 0 && turn % interval == 0
}

/// A turn recorded on the session.
struct Committed {
    text: String,
    limit_reached: bool,
    /// Snapshot taken with the turn when it lands on the report interval.
    progress: Option<SessionSummary>,
}

/// Shared, cheaply cloneable driver of conversation loops.
#[derive(Clone)]
pub struct ConversationEngine {
    client: Arc<CompletionClient>,
    sink: Arc<dyn DeliverySink>,
    personas: Arc<[Persona]>,
    topics: Arc<[String]>,
    config: Arc<EngineConfig>,
    guard: RepetitionGuard,
    rotator: PersonaRotator,
    prompts: PromptBuilder,
}

impl ConversationEngine {
    pub fn new(
        client: Arc<CompletionClient>,
        sink: Arc<dyn DeliverySink>,
        personas: Vec<Persona>,
        topics: Vec<String>,
        config: EngineConfig,
    ) -> Result<Self, SessionError> {
        if personas.is_empty() {
            return Err(SessionError::NoPersonas);
        }
        Ok(Self {
            client,
            sink,
            personas: personas.into(),
            topics: topics.into(),
            guard: RepetitionGuard::new(config.repetition_window, config.similarity_threshold),
            rotator: PersonaRotator::new(config.interruption_probability),
            prompts: PromptBuilder,
            config: Arc::new(config),
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    /// A random topic starter; empty when the pool is empty.
    #[must_use]
    pub fn pick_topic(&self) -> String {
        self.topics
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default()
    }

    async fn deliver_best_effort(&self, key: SessionKey, text: &str) {
        if let Err(e) = self.sink.deliver(key, text).await {
            warn!("[{key}] Delivery failed: {e}");
        }
    }

    /// Sleep for `delay` unless cancelled first. Returns true when cancelled.
    async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => true,
            () = tokio::time::sleep(delay) => false,
        }
    }

    /// Body of a session's loop task.
    pub(crate) async fn run(
        self,
        key: SessionKey,
        session: Arc<Mutex<Session>>,
        run_id: u64,
        cancel: CancellationToken,
    ) -> LoopOutcome {
        info!("[{key}] Conversation loop {run_id} started");
        let outcome = self.drive(key, &session, &cancel).await;

        let (finished, summary) = {
            let mut guard = session.lock().await;
            let now = Utc::now();
            let finished = guard.finish(run_id, outcome.clone(), now);
            (finished, guard.summary(now))
        };

        info!(
            "[{key}] Conversation loop {run_id} ended: {outcome:?} after {} turns",
            summary.turn_count
        );
        if finished {
            self.deliver_best_effort(key, &format::final_summary(&summary, &outcome))
                .await;
        }
        outcome
    }

    async fn drive(
        &self,
        key: SessionKey,
        session: &Mutex<Session>,
        cancel: &CancellationToken,
    ) -> LoopOutcome {
        let failure_ceiling = self.config.failure_ceiling.max(1);
        let mut consecutive_failures = 0_u32;

        loop {
            if cancel.is_cancelled() {
                return LoopOutcome::Stopped;
            }

            let (speaker, messages, credential, stats) = {
                let guard = session.lock().await;
                if guard.limit_reached() {
                    return LoopOutcome::Completed;
                }
                let Some(credential) = guard.credential().map(str::to_string) else {
                    return LoopOutcome::Failed {
                        reason: SessionError::CredentialMissing.to_string(),
                        auth_rejected: false,
                    };
                };
                let speaker = self.rotator.next_speaker(
                    guard.current_speaker(),
                    self.personas.len(),
                    &mut rand::thread_rng(),
                );
                let messages = self.prompts.build_messages(
                    &self.personas[speaker],
                    guard.history(),
                    guard.current_message(),
                );
                (speaker, messages, credential, guard.tier_stats())
            };
            let persona = &self.personas[speaker];
            debug!("[{key}] {} is speaking", persona.name);

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return LoopOutcome::Stopped,
                result = self.client.generate(&credential, &messages, &stats) => result,
            };

            let completion = match result {
                Ok(completion) => {
                    consecutive_failures = 0;
                    completion
                }
                Err(failure) => {
                    consecutive_failures += 1;
                    warn!(
                        "[{key}] Turn attempt failed ({consecutive_failures}/{failure_ceiling}): {failure}"
                    );
                    if consecutive_failures >= failure_ceiling {
                        error!("[{key}] Giving up after {consecutive_failures} consecutive failures");
                        return LoopOutcome::Failed {
                            reason: failure.to_string(),
                            auth_rejected: failure.is_auth_error(),
                        };
                    }
                    if Self::pause(self.config.backoff.delay(consecutive_failures), cancel).await {
                        return LoopOutcome::Stopped;
                    }
                    continue;
                }
            };

            let Some(committed) =
                self.commit(key, session, cancel, speaker, persona, completion)
                    .await
            else {
                return LoopOutcome::Stopped;
            };

            self.deliver_best_effort(
                key,
                &format::turn_line(persona, &committed.text, Local::now().time()),
            )
            .await;

            if let Some(summary) = &committed.progress {
                self.deliver_best_effort(key, &format::progress(summary))
                    .await;
            }

            if committed.limit_reached {
                return LoopOutcome::Completed;
            }

            if Self::pause(self.config.draw_turn_delay(), cancel).await {
                return LoopOutcome::Stopped;
            }
        }
    }

    /// Record a successful completion on the session. Returns `None` when a
    /// stop arrived while the request was in flight; the response is dropped.
    async fn commit(
        &self,
        key: SessionKey,
        session: &Mutex<Session>,
        cancel: &CancellationToken,
        speaker: usize,
        persona: &Persona,
        completion: Completion,
    ) -> Option<Committed> {
        let mut guard = session.lock().await;
        if cancel.is_cancelled() {
            return None;
        }

        let text = if self.guard.is_repetitive(guard.recent_outputs(), &completion.text) {
            let topic = self.pick_topic();
            info!("[{key}] Repetitive output from {}, switching topic", persona.name);
            topic
        } else {
            completion.text.clone()
        };

        let turn = guard.record_turn(speaker, persona, &text, completion.text, &completion.tier);
        let limit_reached = guard.limit_reached();
        info!(
            "[{key}] Turn {turn}/{} by {} via {}",
            guard.turn_limit(),
            persona.name,
            completion.tier
        );

        if !limit_reached && is_multiple(turn, self.config.topic_change_interval) {
            let topic = self.pick_topic();
            debug!("[{key}] Injecting topic change: {topic}");
            guard.inject_topic(&topic);
        }

        let progress = is_multiple(turn, self.config.report_interval)
            .then(|| guard.summary(Utc::now()));

        Some(Committed {
            text,
            limit_reached,
            progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiples_ignore_zero_interval() {
        assert!(is_multiple(20, 20));
        assert!(is_multiple(40, 20));
        assert!(!is_multiple(21, 20));
        assert!(!is_multiple(20, 0));
    }

    #[test]
    fn turn_delay_stays_in_range() {
        let config = EngineConfig {
            turn_delay_min: Duration::from_millis(10),
            turn_delay_max: Duration::from_millis(20),
            ..EngineConfig::default()
        };
        for _ in 0..100 {
            let delay = config.draw_turn_delay();
            assert!(delay >= Duration::from_millis(10) && delay <= Duration::from_millis(20));
        }

        let fixed = EngineConfig {
            turn_delay_min: Duration::from_millis(5),
            turn_delay_max: Duration::from_millis(5),
            ..EngineConfig::default()
        };
        assert_eq!(fixed.draw_turn_delay(), Duration::from_millis(5));
    }
}

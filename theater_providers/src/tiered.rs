//! Tiered completion with one attempt per tier.

use std::sync::Arc;

use rand::Rng;
use theater_core::{
    ChatMessage, CompletionBackend, CompletionFailure, CompletionRequest, TierFailure, TierStats,
};
use tracing::{info, warn};

/// One model configuration in the fallback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTier {
    pub model: String,
    pub max_tokens: u32,
}

impl ModelTier {
    #[must_use]
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            max_tokens,
        }
    }
}

/// Sampling parameters. Temperature is drawn uniformly from
/// `temperature_min..=temperature_max` on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature_min: f32,
    pub temperature_max: f32,
    pub top_p: f32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature_min: 0.8,
            temperature_max: 1.0,
            top_p: 0.95,
        }
    }
}

impl Sampling {
    fn draw_temperature(&self) -> f32 {
        if self.temperature_max <= self.temperature_min {
            return self.temperature_min;
        }
        rand::thread_rng().gen_range(self.temperature_min..=self.temperature_max)
    }
}

/// Successful completion and the tier that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub tier: String,
}

/// Walks the configured tiers in priority order, highest capability first.
///
/// A failing tier is never retried within the same call; the next tier is
/// tried instead. When every tier fails the caller gets a
/// [`CompletionFailure`] listing each tier's failure.
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    tiers: Vec<ModelTier>,
    sampling: Sampling,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, tiers: Vec<ModelTier>) -> Self {
        Self {
            backend,
            tiers,
            sampling: Sampling::default(),
        }
    }

    #[must_use]
    pub const fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    #[must_use]
    pub fn tiers(&self) -> &[ModelTier] {
        &self.tiers
    }

    pub async fn generate(
        &self,
        credential: &str,
        messages: &[ChatMessage],
        stats: &TierStats,
    ) -> Result<Completion, CompletionFailure> {
        let mut failure = CompletionFailure::default();

        for tier in &self.tiers {
            let request = CompletionRequest {
                model: tier.model.clone(),
                messages: messages.to_vec(),
                max_tokens: tier.max_tokens,
                temperature: self.sampling.draw_temperature(),
                top_p: self.sampling.top_p,
            };

            stats.record_attempt(&tier.model);
            match self.backend.complete(credential, &request).await {
                Ok(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        warn!("Tier {} returned empty content", tier.model);
                        failure
                            .attempts
                            .push((tier.model.clone(), TierFailure::EmptyContent));
                        continue;
                    }
                    stats.record_success(&tier.model);
                    if !failure.attempts.is_empty() {
                        info!(
                            "Tier {} succeeded after {} failed tier(s)",
                            tier.model,
                            failure.attempts.len()
                        );
                    }
                    return Ok(Completion {
                        text: text.to_string(),
                        tier: tier.model.clone(),
                    });
                }
                Err(e) => {
                    warn!("Tier {} failed: {e}", tier.model);
                    failure.attempts.push((tier.model.clone(), e));
                }
            }
        }

        Err(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers per model: `Ok(text)` or a failure; records the models it was asked for.
    struct ScriptedBackend {
        answers: Vec<(String, Result<String, TierFailure>)>,
        calls: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        fn new(answers: Vec<(&str, Result<&str, TierFailure>)>) -> Self {
            Self {
                answers: answers
                    .into_iter()
                    .map(|(m, r)| (m.to_string(), r.map(str::to_string)))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn models_called(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.model.clone())
                .collect()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(
            &self,
            _credential: &str,
            request: &CompletionRequest,
        ) -> Result<String, TierFailure> {
            self.calls.lock().unwrap().push(request.clone());
            self.answers
                .iter()
                .find(|(m, _)| *m == request.model)
                .map_or(Err(TierFailure::Transport("unknown model".into())), |(_, r)| {
                    r.clone()
                })
        }
    }

    fn tiers() -> Vec<ModelTier> {
        vec![ModelTier::new("primary", 150), ModelTier::new("secondary", 100)]
    }

    #[tokio::test]
    async fn falls_through_to_secondary_without_retrying_primary() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ("primary", Err(TierFailure::status(500, "internal error"))),
            ("secondary", Ok("  hi from secondary ")),
        ]));
        let client = CompletionClient::new(backend.clone(), tiers());
        let stats = TierStats::new();

        let completion = client
            .generate("sk-test", &[ChatMessage::user("hello")], &stats)
            .await
            .unwrap();

        assert_eq!(completion.tier, "secondary");
        assert_eq!(completion.text, "hi from secondary");
        assert_eq!(backend.models_called(), vec!["primary", "secondary"]);
        assert_eq!(stats.get("primary").attempts, 1);
        assert_eq!(stats.get("primary").successes, 0);
        assert_eq!(stats.get("secondary").attempts, 1);
        assert_eq!(stats.get("secondary").successes, 1);
    }

    #[tokio::test]
    async fn primary_success_skips_secondary() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ("primary", Ok("hello")),
            ("secondary", Ok("unused")),
        ]));
        let client = CompletionClient::new(backend.clone(), tiers());
        let stats = TierStats::new();

        let completion = client.generate("k", &[], &stats).await.unwrap();

        assert_eq!(completion.tier, "primary");
        assert_eq!(backend.models_called(), vec!["primary"]);
        assert_eq!(stats.get("secondary").attempts, 0);
    }

    #[tokio::test]
    async fn exhaustion_reports_every_tier() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ("primary", Err(TierFailure::Timeout)),
            ("secondary", Ok("   ")),
        ]));
        let client = CompletionClient::new(backend, tiers());
        let stats = TierStats::new();

        let failure = client.generate("k", &[], &stats).await.unwrap_err();

        assert_eq!(
            failure.attempts,
            vec![
                ("primary".to_string(), TierFailure::Timeout),
                ("secondary".to_string(), TierFailure::EmptyContent),
            ]
        );
        assert_eq!(stats.get("secondary").attempts, 1);
        assert_eq!(stats.get("secondary").successes, 0);
    }

    #[tokio::test]
    async fn temperature_stays_in_range() {
        let backend = Arc::new(ScriptedBackend::new(vec![("primary", Ok("ok"))]));
        let sampling = Sampling {
            temperature_min: 0.5,
            temperature_max: 0.6,
            top_p: 0.9,
        };
        let client = CompletionClient::new(backend.clone(), vec![ModelTier::new("primary", 10)])
            .with_sampling(sampling);
        let stats = TierStats::new();

        for _ in 0..20 {
            client.generate("k", &[], &stats).await.unwrap();
        }

        let calls = backend.calls.lock().unwrap();
        assert!(calls.iter().all(|r| (0.5..=0.6).contains(&r.temperature)));
        assert!(calls.iter().all(|r| (r.top_p - 0.9).abs() < f32::EPSILON));
        assert!(calls.iter().all(|r| r.max_tokens == 10));
    }
}

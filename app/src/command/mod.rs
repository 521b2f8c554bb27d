//! Static strategy pattern for CLI commands.
//!
//! Each subcommand is its own strategy type with its own input, dispatched
//! statically from `main`.

use std::sync::Arc;
use std::time::Duration;
use theater_config::{Config, ConversationConfig};
use theater_conversation::{ConversationEngine, EngineConfig, SessionLimits};
use theater_core::DeliverySink;
use theater_providers::{Backoff, CompletionClient, ModelTier, OpenAiProvider, Sampling};
use tracing::info;

mod init;
mod telegram;
mod version;
mod watch;

pub use init::InitStrategy;
pub use telegram::{TelegramInput, TelegramStrategy};
pub use version::VersionStrategy;
pub use watch::{WatchInput, WatchStrategy};

/// Core trait defining the contract for all command strategies.
pub trait CommandStrategy: Send + Sync + 'static {
    /// The input type this strategy accepts.
    type Input;

    /// Execute the command with the given input.
    ///
    /// # Errors
    /// Returns an error if command execution fails.
    async fn execute(&self, input: Self::Input) -> anyhow::Result<()>;
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

/// Translate the `conversation` config section into engine settings.
pub fn engine_config(conv: &ConversationConfig) -> EngineConfig {
    EngineConfig {
        limits: SessionLimits {
            turn_limit: conv.turn_limit,
            history_limit: conv.history_limit,
            recent_outputs_limit: conv.recent_outputs_limit,
        },
        repetition_window: conv.repetition_window,
        similarity_threshold: conv.similarity_threshold,
        failure_ceiling: conv.failure_ceiling,
        turn_delay_min: secs(conv.turn_delay_min_secs),
        turn_delay_max: secs(conv.turn_delay_max_secs),
        backoff: Backoff::new(secs(conv.backoff_initial_secs), secs(conv.backoff_max_secs)),
        report_interval: conv.report_interval,
        topic_change_interval: conv.topic_change_interval,
        interruption_probability: conv.interruption_probability,
    }
}

/// Wire the provider, model tiers, cast and topics into one engine.
pub fn build_engine(
    config: &Config,
    sink: Arc<dyn DeliverySink>,
    engine_config: EngineConfig,
) -> anyhow::Result<ConversationEngine> {
    let openai = &config.providers.openai;
    let provider = OpenAiProvider::new()
        .with_base_url(openai.base_url.clone())
        .with_timeout(Duration::from_secs(openai.timeout_secs));

    let tiers: Vec<ModelTier> = config
        .tiers
        .iter()
        .map(|t| ModelTier::new(t.model.clone(), t.max_tokens))
        .collect();
    info!(
        "Model tiers: {}",
        tiers
            .iter()
            .map(|t| t.model.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    let client = CompletionClient::new(Arc::new(provider), tiers).with_sampling(Sampling {
        temperature_min: config.sampling.temperature_min,
        temperature_max: config.sampling.temperature_max,
        top_p: config.sampling.top_p,
    });

    Ok(ConversationEngine::new(
        Arc::new(client),
        sink,
        config.personas.clone(),
        config.topics.clone(),
        engine_config,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_follows_conversation_section() {
        let conv = ConversationConfig {
            turn_limit: 12,
            turn_delay_min_secs: 0.5,
            backoff_max_secs: 4.0,
            ..ConversationConfig::default()
        };
        let engine = engine_config(&conv);
        assert_eq!(engine.limits.turn_limit, 12);
        assert_eq!(engine.turn_delay_min, Duration::from_millis(500));
        assert_eq!(engine.backoff.max, Duration::from_secs(4));
        assert_eq!(engine.failure_ceiling, conv.failure_ceiling);
    }

    #[test]
    fn negative_seconds_become_zero() {
        assert_eq!(secs(-1.0), Duration::ZERO);
    }
}

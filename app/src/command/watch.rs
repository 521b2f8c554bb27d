use super::{CommandStrategy, build_engine, engine_config};
use async_trait::async_trait;
use std::sync::Arc;
use theater_config::Config;
use theater_conversation::{EngineConfig, SessionRegistry, format};
use theater_core::{DeliverySink, SessionKey};
use tracing::info;

const TERMINAL_SESSION: SessionKey = 0;

/// Prints every delivered message to stdout.
struct StdoutSink;

#[async_trait]
impl DeliverySink for StdoutSink {
    async fn deliver(&self, _key: SessionKey, text: &str) -> anyhow::Result<()> {
        println!("{text}\n");
        Ok(())
    }
}

pub struct WatchInput {
    /// Overrides `conversation.turn_limit`
    pub turns: Option<u32>,
}

impl WatchInput {
    /// Apply the turn override; zero keeps the configured limit.
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(turns) = self.turns.filter(|t| *t > 0) {
            config.limits.turn_limit = turns;
        }
    }
}

/// Runs a single conversation in the terminal until it ends or Ctrl+C.
pub struct WatchStrategy;

impl CommandStrategy for WatchStrategy {
    type Input = WatchInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;

        let Some(api_key) = config
            .providers
            .openai
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
        else {
            anyhow::bail!(
                "OpenAI API key not configured. Set \"providers.openai.api_key\" in config or OPENAI_API_KEY"
            );
        };

        let mut engine_config = engine_config(&config.conversation);
        input.apply(&mut engine_config);

        let engine = build_engine(&config, Arc::new(StdoutSink), engine_config)?;
        let registry = SessionRegistry::new(engine);
        registry.set_credential(TERMINAL_SESSION, api_key).await;

        let opener = registry.start(TERMINAL_SESSION).await?;
        println!("{}\n", format::started(&opener));
        info!("Conversation running. Press Ctrl+C to stop.");

        let joined = registry.join(TERMINAL_SESSION);
        tokio::pin!(joined);
        let outcome = tokio::select! {
            outcome = &mut joined => outcome,
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping conversation...");
                registry.stop(TERMINAL_SESSION).await;
                joined.await
            }
        };
        info!("Conversation ended: {outcome:?}");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_override_the_configured_limit() {
        let mut config = EngineConfig::default();
        WatchInput { turns: Some(7) }.apply(&mut config);
        assert_eq!(config.limits.turn_limit, 7);
    }

    #[test]
    fn missing_or_zero_turns_keep_the_limit() {
        let mut config = EngineConfig::default();
        let configured = config.limits.turn_limit;
        WatchInput { turns: None }.apply(&mut config);
        WatchInput { turns: Some(0) }.apply(&mut config);
        assert_eq!(config.limits.turn_limit, configured);
    }

    #[tokio::test]
    async fn stdout_sink_accepts_every_message() {
        let sink: Arc<dyn DeliverySink> = Arc::new(StdoutSink);
        assert!(sink.deliver(TERMINAL_SESSION, "[09:00] Minji: hi").await.is_ok());
    }
}

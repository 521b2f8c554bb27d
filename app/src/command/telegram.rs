use super::{CommandStrategy, build_engine, engine_config};
use std::sync::Arc;
use teloxide::Bot;
use theater_config::Config;
use theater_conversation::SessionRegistry;
use theater_telegram::{TelegramBot, TelegramSink};
use tracing::info;

/// Input for Telegram bot command.
pub struct TelegramInput {
    /// Optional bot token (overrides config)
    pub token: Option<String>,
    /// Optional allowed chat IDs (overrides config)
    pub allow_from: Option<Vec<String>>,
}

/// Strategy for running Telegram bot.
pub struct TelegramStrategy;

impl CommandStrategy for TelegramStrategy {
    type Input = TelegramInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;

        if !config.telegram.enabled {
            anyhow::bail!("Telegram is not enabled in config. Set \"telegram.enabled\": true");
        }

        // Get token from input or config
        let token = if let Some(t) = input.token {
            t
        } else if !config.telegram.token.is_empty() {
            config.telegram.token.clone()
        } else {
            anyhow::bail!(
                "Telegram bot token not configured. Set \"telegram.token\" in config or TELEGRAM_BOT_TOKEN"
            );
        };

        // Get allowed chats from input or config
        let allow_from = input
            .allow_from
            .unwrap_or_else(|| config.telegram.allow_from.clone());

        info!("Starting Telegram bot...");

        let bot = Bot::new(token);
        let sink = Arc::new(TelegramSink::new(bot.clone()));
        let engine = build_engine(&config, sink, engine_config(&config.conversation))?;
        let registry = Arc::new(SessionRegistry::new(engine));

        let bot = TelegramBot::new(bot, registry, &allow_from);

        info!("Telegram bot is running. Press Ctrl+C to stop.");
        bot.run().await?;

        Ok(())
    }
}

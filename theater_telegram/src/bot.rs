use crate::{Command, Result};
use std::collections::HashSet;
use std::sync::Arc;
use teloxide::prelude::*;
use theater_conversation::SessionRegistry;
use theater_providers::Backoff;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

/// Telegram bot driving one conversation per chat.
#[derive(Clone)]
pub struct TelegramBot {
    /// Teloxide bot instance
    pub bot: Bot,
    /// Sessions and their conversation loops
    pub registry: Arc<SessionRegistry>,
    /// Allowed chat IDs
    allowed_chats: Vec<i64>,
    /// Chats whose next plain message is an API key
    awaiting_key: Arc<Mutex<HashSet<i64>>>,
}

impl TelegramBot {
    /// Create a new Telegram bot
    pub fn new(bot: Bot, registry: Arc<SessionRegistry>, allowed_chats: &[String]) -> Self {
        // Parse allowed chat IDs
        let allowed_chats = allowed_chats
            .iter()
            .filter_map(|s| s.parse::<i64>().ok())
            .collect();

        Self {
            bot,
            registry,
            allowed_chats,
            awaiting_key: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Check if a chat is allowed
    #[must_use]
    pub fn is_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.contains(&chat_id)
    }

    pub(crate) async fn expect_key(&self, chat_id: i64) {
        self.awaiting_key.lock().await.insert(chat_id);
    }

    /// Clear the awaiting-key mark, returning whether it was set.
    pub(crate) async fn take_key_expectation(&self, chat_id: i64) -> bool {
        self.awaiting_key.lock().await.remove(&chat_id)
    }

    /// Cast list for the welcome message.
    pub(crate) fn cast(&self) -> String {
        self.registry
            .engine()
            .personas()
            .iter()
            .map(|p| format!("{} {} - {}", p.emoji, p.name, p.personality))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Test connection to Telegram API, backing off between attempts.
    /// Retries indefinitely until connection succeeds.
    async fn test_connection(&self) {
        let backoff = Backoff::default();

        let mut attempt = 1u32;
        loop {
            match self.bot.get_me().await {
                Ok(bot_user) => {
                    info!(
                        "Connected to Telegram API: @{} (id: {})",
                        bot_user
                            .user
                            .username
                            .unwrap_or_else(|| "no username".to_string()),
                        bot_user.user.id
                    );
                    return;
                }
                Err(e) => {
                    let delay = backoff.delay(attempt);

                    warn!(
                        "Connection attempt {attempt} failed: {e}. Retrying in {}s...",
                        delay.as_secs()
                    );

                    // Only show detailed help on first failure
                    if attempt == 1 {
                        warn!("This may be due to:");
                        warn!("  - Network connectivity issues");
                        warn!("  - Firewall blocking api.telegram.org");
                        warn!("  - Invalid bot token");
                        warn!("  - Telegram API being temporarily unavailable");
                    }

                    sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Run the bot until Ctrl+C, then stop every running conversation.
    pub async fn run(self) -> Result<()> {
        use teloxide::dispatching::{Dispatcher, UpdateFilterExt};
        use teloxide::dptree;
        use teloxide::types::Update;

        self.test_connection().await;

        if let Err(e) = self.bot.set_my_commands(Command::bot_commands()).await {
            warn!("Failed to register bot commands: {e}");
        }

        let bot = self.bot.clone();
        let registry = Arc::clone(&self.registry);

        let schema = dptree::entry().branch(Update::filter_message().endpoint({
            let bot_clone = self.clone();
            move |_bot: Bot, msg: teloxide::types::Message| {
                let bot_clone = bot_clone.clone();
                async move { crate::handler::handle_message(bot_clone, msg).await }
            }
        }));

        Dispatcher::builder(bot, schema)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        registry.shutdown().await;
        Ok(())
    }
}

use async_trait::async_trait;
use teloxide::prelude::*;
use theater_core::{DeliverySink, SessionKey};

/// Delivers turns into Telegram chats through one long-lived bot client.
#[derive(Clone)]
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl DeliverySink for TelegramSink {
    async fn deliver(&self, key: SessionKey, text: &str) -> anyhow::Result<()> {
        self.bot.send_message(ChatId(key), text).await?;
        Ok(())
    }
}

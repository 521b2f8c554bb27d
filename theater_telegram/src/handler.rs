use crate::{Command, Error, Result, TelegramBot, is_valid_api_key};
use teloxide::{requests::Requester, types::Message};
use theater_conversation::{SessionError, format};
use tracing::{info, warn};

/// Handle bot commands
pub async fn handle_command(bot: TelegramBot, msg: Message, cmd: Command) -> Result<()> {
    let chat_id = msg.chat.id.0;
    let username = msg
        .from
        .as_ref()
        .and_then(|u| u.username.as_deref())
        .unwrap_or("unknown");

    match cmd {
        Command::Start => {
            info!("[@{username}] Command: /start");
            let has_key = bot.registry.has_credential(chat_id).await;
            bot.bot
                .send_message(msg.chat.id, Command::welcome_text(has_key, &bot.cast()))
                .await?;
        }
        Command::SetKey(Some(key)) => {
            info!("[@{username}] Command: /setkey (inline)");
            accept_key(&bot, &msg, key).await?;
        }
        Command::SetKey(None) => {
            info!("[@{username}] Command: /setkey");
            bot.expect_key(chat_id).await;
            bot.bot
                .send_message(msg.chat.id, Command::setkey_guide())
                .await?;
        }
        Command::Chat => {
            info!("[@{username}] Command: /chat");
            let reply = match bot.registry.start(chat_id).await {
                Ok(opener) => format::started(&opener),
                Err(SessionError::CredentialMissing) => {
                    "❌ No OpenAI API key has been set!\n\n🔑 Set one first with /setkey.".to_string()
                }
                Err(SessionError::AlreadyActive) => {
                    "❌ A conversation is already running! Stop it first with /stop.".to_string()
                }
                Err(e) => return Err(e.into()),
            };
            bot.bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Stop => {
            info!("[@{username}] Command: /stop");
            // The loop itself posts the closing summary.
            if !bot.registry.stop(chat_id).await {
                bot.bot
                    .send_message(msg.chat.id, "❌ No conversation is running right now.")
                    .await?;
            }
        }
        Command::Clear => {
            info!("[@{username}] Command: /clear");
            let reply = if bot.registry.clear(chat_id).await {
                "🧹 Conversation history and statistics cleared."
            } else {
                "Nothing to clear yet."
            };
            bot.bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Status => {
            info!("[@{username}] Command: /status");
            let reply = match bot.registry.status(chat_id).await {
                Some(summary) => format::session_status(&summary),
                None => "No conversation yet. Start with /setkey and /chat.".to_string(),
            };
            bot.bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Global => {
            info!("[@{username}] Command: /global");
            let global = bot.registry.global_status().await;
            bot.bot
                .send_message(msg.chat.id, format::global_status(&global))
                .await?;
        }
        Command::Help => {
            info!("[@{username}] Command: /help");
            bot.bot
                .send_message(msg.chat.id, Command::help_text())
                .await?;
        }
    }

    Ok(())
}

/// Validate and store an API key, then remove the message holding it.
async fn accept_key(bot: &TelegramBot, msg: &Message, key: String) -> Result<()> {
    let key = key.trim().to_string();
    if !is_valid_api_key(&key) {
        bot.bot
            .send_message(
                msg.chat.id,
                "❌ That doesn't look like a valid API key.\n\nCopy the key starting with sk- exactly and try /setkey again.",
            )
            .await?;
        return Ok(());
    }

    bot.registry.set_credential(msg.chat.id.0, key).await;

    if let Err(e) = bot.bot.delete_message(msg.chat.id, msg.id).await {
        warn!("Could not delete message containing API key: {e}");
    }

    bot.bot
        .send_message(
            msg.chat.id,
            "✅ API key saved!\n\n🎬 You can now start the conversation with /chat.",
        )
        .await?;
    Ok(())
}

/// Handle any message (commands or regular text)
pub async fn handle_message(bot: TelegramBot, msg: Message) -> Result<()> {
    let chat_id = msg.chat.id.0;
    let Some(text) = msg.text().map(str::to_string) else {
        return Ok(());
    };

    if !bot.is_allowed(chat_id) {
        warn!("Ignoring message from chat {chat_id}: not in allow list");
        return Err(Error::Unauthorized(chat_id));
    }

    // Check if this is a command
    if let Some(cmd) = Command::parse_from_text(&text) {
        if !matches!(cmd, Command::SetKey(_)) {
            bot.take_key_expectation(chat_id).await;
        }
        return handle_command(bot, msg, cmd).await;
    }

    if bot.take_key_expectation(chat_id).await {
        return accept_key(&bot, &msg, text).await;
    }

    bot.bot
        .send_message(msg.chat.id, "Hello! 😊\n\n/start - Get started\n/help - Help")
        .await?;

    Ok(())
}

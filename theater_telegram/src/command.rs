use teloxide::types::BotCommand;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    /// `/setkey` alone waits for the key in the next message.
    SetKey(Option<String>),
    Chat,
    Stop,
    Clear,
    Status,
    Global,
    Help,
}

/// Minimal shape check for an `OpenAI` secret key.
#[must_use]
pub fn is_valid_api_key(text: &str) -> bool {
    text.starts_with("sk-") && text.len() > 20 && !text.contains(char::is_whitespace)
}

impl Command {
    fn all() -> Vec<BotCommand> {
        [
            ("start", "Enter the theater"),
            ("setkey", "Set your OpenAI API key"),
            ("chat", "Start the automatic conversation"),
            ("stop", "Stop the conversation"),
            ("clear", "Forget the conversation and statistics"),
            ("status", "Show this chat's conversation status"),
            ("global", "Show status across all chats"),
            ("help", "Show help"),
        ]
        .into_iter()
        .map(|(command, description)| BotCommand {
            command: command.to_string(),
            description: description.to_string(),
        })
        .collect()
    }

    #[must_use]
    pub fn bot_commands() -> Vec<BotCommand> {
        Self::all()
    }

    #[must_use]
    pub fn parse_from_text(text: &str) -> Option<Self> {
        let text = text.trim();
        let (head, rest) = text
            .split_once(char::is_whitespace)
            .map_or((text, ""), |(h, r)| (h, r.trim()));

        // Remove bot mention if present (e.g., "/start@my_bot")
        let head = head.split('@').next().unwrap_or(head).to_lowercase();

        match head.as_str() {
            "/start" => Some(Self::Start),
            "/setkey" => Some(Self::SetKey(
                Some(rest.to_string()).filter(|key| !key.is_empty()),
            )),
            "/chat" => Some(Self::Chat),
            "/stop" => Some(Self::Stop),
            "/clear" => Some(Self::Clear),
            "/status" => Some(Self::Status),
            "/global" => Some(Self::Global),
            "/help" => Some(Self::Help),
            _ => None,
        }
    }

    #[must_use]
    pub const fn help_text() -> &'static str {
        r"
🎭 AI Conversation Theater

Commands:
/start   - Enter the theater 🎭
/setkey  - 🔑 Set your OpenAI API key
/chat    - 🎬 Start the conversation
/stop    - ⏹️ Stop the conversation
/clear   - 🧹 Forget history and statistics
/status  - 📋 Status of this chat
/global  - 🌐 Status of all chats
/help    - 📚 This help

Getting started:
1. Set your OpenAI API key with /setkey
2. Start the conversation with /chat
3. Watch the personas talk to each other 🍿
"
    }

    #[must_use]
    pub fn welcome_text(has_key: bool, cast: &str) -> String {
        let status = if has_key {
            "✅ API key set"
        } else {
            "❌ API key required"
        };
        format!(
            "🎭 Welcome to the AI Conversation Theater! 🎭\n\nCurrent status: {status}\n\n👥 Cast:\n{cast}\n{}",
            Self::help_text()
        )
    }

    #[must_use]
    pub const fn setkey_guide() -> &'static str {
        r"
🔑 Please set your OpenAI API key!

📋 How to get one:
1. Go to https://platform.openai.com
2. Sign up or log in
3. Open “API Keys” in the menu
4. Click “Create new secret key” and copy it

💬 Send the key (it starts with sk-) as your next message.
"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_commands() {
        assert_eq!(Command::parse_from_text("/chat"), Some(Command::Chat));
        assert_eq!(Command::parse_from_text("  /STOP  "), Some(Command::Stop));
        assert_eq!(
            Command::parse_from_text("/status@theater_bot"),
            Some(Command::Status)
        );
        assert_eq!(Command::parse_from_text("hello"), None);
        assert_eq!(Command::parse_from_text("/unknown"), None);
    }

    #[test]
    fn setkey_keeps_argument_case() {
        assert_eq!(
            Command::parse_from_text("/setkey sk-AbCdEf"),
            Some(Command::SetKey(Some("sk-AbCdEf".to_string())))
        );
        assert_eq!(
            Command::parse_from_text("/setkey"),
            Some(Command::SetKey(None))
        );
    }

    #[test]
    fn api_key_shape() {
        assert!(is_valid_api_key("sk-abcdefghijklmnopqrstuvwxyz"));
        assert!(!is_valid_api_key("sk-short"));
        assert!(!is_valid_api_key("pk-abcdefghijklmnopqrstuvwxyz"));
        assert!(!is_valid_api_key("sk-abcdefghij klmnopqrstuvwxyz"));
    }

    #[test]
    fn every_command_is_advertised() {
        let names: Vec<String> = Command::bot_commands()
            .into_iter()
            .map(|c| c.command)
            .collect();
        for name in &names {
            assert!(Command::parse_from_text(&format!("/{name}")).is_some());
        }
        assert_eq!(names.len(), 8);
    }
}

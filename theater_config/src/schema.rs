use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use theater_core::Persona;
use tracing::info;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default = "Config::default_tiers")]
    pub tiers: Vec<TierConfig>,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default = "Config::default_personas")]
    pub personas: Vec<Persona>,
    #[serde(default = "Config::default_topics")]
    pub topics: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            providers: ProvidersConfig::default(),
            tiers: Self::default_tiers(),
            sampling: SamplingConfig::default(),
            conversation: ConversationConfig::default(),
            personas: Self::default_personas(),
            topics: Self::default_topics(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub allow_from: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: OpenAiConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    #[serde(default = "OpenAiConfig::default_base_url")]
    pub base_url: String,
    /// Only used by `theater watch`; bot sessions bring their own key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "OpenAiConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            api_key: None,
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

impl OpenAiConfig {
    fn default_base_url() -> String {
        "https://api.openai.com/v1".to_string()
    }

    const fn default_timeout_secs() -> u64 {
        30
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TierConfig {
    pub model: String,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    pub temperature_min: f32,
    pub temperature_max: f32,
    pub top_p: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature_min: 0.8,
            temperature_max: 1.0,
            top_p: 0.95,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ConversationConfig {
    pub turn_limit: u32,
    pub history_limit: usize,
    pub recent_outputs_limit: usize,
    pub repetition_window: usize,
    pub similarity_threshold: f64,
    pub failure_ceiling: u32,
    pub turn_delay_min_secs: f64,
    pub turn_delay_max_secs: f64,
    pub backoff_initial_secs: f64,
    pub backoff_max_secs: f64,
    pub report_interval: u32,
    pub topic_change_interval: u32,
    pub interruption_probability: f64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            turn_limit: 100,
            history_limit: 16,
            recent_outputs_limit: 8,
            repetition_window: 3,
            similarity_threshold: 0.7,
            failure_ceiling: 3,
            turn_delay_min_secs: 2.0,
            turn_delay_max_secs: 6.0,
            backoff_initial_secs: 2.0,
            backoff_max_secs: 10.0,
            report_interval: 20,
            topic_change_interval: 50,
            interruption_probability: 0.3,
        }
    }
}

impl Config {
    fn default_tiers() -> Vec<TierConfig> {
        vec![
            TierConfig {
                model: "gpt-4o-mini".to_string(),
                max_tokens: 150,
            },
            TierConfig {
                model: "gpt-3.5-turbo".to_string(),
                max_tokens: 100,
            },
        ]
    }

    fn default_personas() -> Vec<Persona> {
        vec![
            Persona {
                name: "Minji".to_string(),
                emoji: "😊".to_string(),
                personality: "A lively university student in her twenties who loves the latest trends and K-pop and is always upbeat.".to_string(),
                style: "Casual speech with plenty of emoji.".to_string(),
            },
            Persona {
                name: "Junho".to_string(),
                emoji: "🤔".to_string(),
                personality: "A calm, thoughtful office worker who enjoys books and films and prefers deep conversations.".to_string(),
                style: "Polite and warm.".to_string(),
            },
        ]
    }

    fn default_topics() -> Vec<String> {
        [
            "Hi! How was your day?",
            "Anything fun going on lately?",
            "The weather is really nice today!",
            "Do you have a favourite kind of music?",
            "Could you recommend a film you saw recently?",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }

    fn config_dir() -> anyhow::Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?
            .join("theater"))
    }

    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load `~/theater/config.json`, apply environment overrides and validate.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found at: {}. Please run 'theater init' to create config.",
                config_path.display()
            );
        }

        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        info!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// `TELEGRAM_BOT_TOKEN` and `OPENAI_API_KEY` take precedence over the file.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.is_empty()) {
            self.telegram.token = token;
        }
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.providers.openai.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let conv = &self.conversation;

        if self.tiers.is_empty() {
            anyhow::bail!("At least one model tier must be configured in \"tiers\"");
        }
        if self.personas.is_empty() {
            anyhow::bail!("At least one persona must be configured in \"personas\"");
        }
        if self.topics.is_empty() {
            anyhow::bail!("The topic pool in \"topics\" must not be empty");
        }
        if conv.turn_limit == 0 {
            anyhow::bail!("conversation.turn_limit must be positive");
        }
        if conv.history_limit == 0 || conv.recent_outputs_limit == 0 {
            anyhow::bail!("conversation history and recent-output limits must be positive");
        }
        if self.sampling.temperature_min > self.sampling.temperature_max {
            anyhow::bail!("sampling.temperature_min must not exceed sampling.temperature_max");
        }
        if conv.turn_delay_min_secs < 0.0 || conv.turn_delay_min_secs > conv.turn_delay_max_secs {
            anyhow::bail!("conversation turn delay range is invalid");
        }
        if conv.backoff_initial_secs < 0.0 || conv.backoff_initial_secs > conv.backoff_max_secs {
            anyhow::bail!("conversation backoff range is invalid");
        }
        for (name, p) in [
            ("similarity_threshold", conv.similarity_threshold),
            ("interruption_probability", conv.interruption_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                anyhow::bail!("conversation.{name} must be within 0.0..=1.0, got {p}");
            }
        }

        Ok(())
    }

    pub fn ensure_config_dir() -> anyhow::Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }

    pub fn create_config() -> anyhow::Result<()> {
        let config_dir = Self::ensure_config_dir()?;
        let config_path = config_dir.join("config.json");

        if config_path.exists() {
            anyhow::bail!(
                "Config file already exists at: {}. Please edit it directly.",
                config_path.display()
            );
        }

        let mut template = Self::default();
        template.telegram.enabled = true;
        template.telegram.token = "your-telegram-bot-token-here".to_string();
        std::fs::write(&config_path, serde_json::to_string_pretty(&template)?)?;

        println!("✅ Created config file at: {}", config_path.display());
        println!();
        println!("📝 Next steps:");
        println!("   1. Put your Telegram bot token into \"telegram.token\"");
        println!("   2. Run 'theater telegram' and send /setkey to the bot");
        println!("   3. Send /chat and watch the personas talk");
        println!();
        println!("🔧 Configuration options:");
        println!("   - tiers: models tried in order, highest capability first");
        println!("   - conversation.turn_limit: turns before a conversation ends");
        println!("   - personas / topics: who talks and what they start with");
        println!();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.tiers[0].model, "gpt-4o-mini");
        assert_eq!(config.conversation.failure_ceiling, 3);
        assert!((config.conversation.similarity_threshold - 0.7).abs() < f64::EPSILON);
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_json(
            r#"{
                "conversation": { "turn_limit": 7 },
                "tiers": [{ "model": "local-model", "max_tokens": 64 }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.conversation.turn_limit, 7);
        assert_eq!(config.conversation.history_limit, 16);
        assert_eq!(config.tiers.len(), 1);
        assert_eq!(config.personas.len(), 2);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = Config::default();
        config.telegram.token = "from-file".to_string();
        config.apply_env_overrides(|name| match name {
            "TELEGRAM_BOT_TOKEN" => Some("from-env".to_string()),
            "OPENAI_API_KEY" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.telegram.token, "from-env");
        assert_eq!(config.providers.openai.api_key, None);
    }

    #[test]
    fn validation_rejects_broken_settings() {
        let mut config = Config::default();
        config.tiers.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.conversation.turn_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.conversation.interruption_probability = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.conversation.turn_delay_min_secs = 9.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn template_round_trips_through_json() {
        let json = serde_json::to_string_pretty(&Config::default()).unwrap();
        assert!(!json.contains("api_key"));
        assert_eq!(Config::from_json(&json).unwrap(), Config::default());
    }
}

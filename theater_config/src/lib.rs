//! Configuration for the theater: bot credentials, model tiers, loop pacing,
//! personas and the topic pool. Stored as JSON in `~/theater/config.json`.

mod schema;

pub use schema::{
    Config, ConversationConfig, OpenAiConfig, ProvidersConfig, SamplingConfig,
    TelegramConfig, TierConfig,
};

#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod stats;
pub mod util;

pub use error::{CompletionFailure, TierFailure};
pub use stats::{TierCounter, TierStats};

/// External key of a conversation context (a Telegram chat id).
pub type SessionKey = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A simulated speaker. Loaded once at startup and shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    #[serde(default)]
    pub emoji: String,
    /// Prompt fragment describing who the persona is.
    pub personality: String,
    /// How the persona talks.
    #[serde(default)]
    pub style: String,
}

impl Persona {
    /// System prompt for a turn spoken by this persona.
    #[must_use]
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}. {}", self.name, self.personality);
        if !self.style.is_empty() {
            prompt.push_str("\nSpeaking style: ");
            prompt.push_str(&self.style);
        }
        prompt.push_str(
            "\n\nRules:\n\
             1. Answer naturally in one or two sentences.\n\
             2. React to what the other person just said.\n\
             3. Now and then bring up a new topic.\n\
             4. Use emoji where it fits.",
        );
        prompt
    }
}

/// One request against one model tier.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// Remote text-generation backend. One call is exactly one attempt.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        credential: &str,
        request: &CompletionRequest,
    ) -> Result<String, TierFailure>;
}

/// Outbound channel that receives formatted turns.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, key: SessionKey, text: &str) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let msg = ChatMessage::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn persona_prompt_includes_style_only_when_set() {
        let mut persona = Persona {
            name: "Minji".to_string(),
            emoji: "😊".to_string(),
            personality: "A cheerful student.".to_string(),
            style: String::new(),
        };
        assert!(!persona.system_prompt().contains("Speaking style"));

        persona.style = "casual".to_string();
        let prompt = persona.system_prompt();
        assert!(prompt.starts_with("You are Minji. A cheerful student."));
        assert!(prompt.contains("Speaking style: casual"));
    }
}

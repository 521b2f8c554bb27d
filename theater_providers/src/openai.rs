use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use theater_core::{CompletionBackend, CompletionRequest, TierFailure};
use tracing::{debug, info};

/// Chat-completions backend speaking the OpenAI wire format.
///
/// Holds one long-lived HTTP client; the credential is supplied per call
/// because every session carries its own key.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl OpenAiProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    #[must_use]
    pub fn new() -> Self {
        info!("Creating OpenAiProvider");
        Self {
            client: Client::new(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn classify(err: &reqwest::Error) -> TierFailure {
        if err.is_timeout() {
            TierFailure::Timeout
        } else if err.is_decode() {
            TierFailure::MalformedBody(err.to_string())
        } else {
            TierFailure::Transport(err.to_string())
        }
    }

    /// Pull the trimmed message content out of a chat-completions response.
    fn extract_content(body: &serde_json::Value) -> Result<String, TierFailure> {
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                TierFailure::MalformedBody("missing choices[0].message.content".to_string())
            })?
            .trim();

        if content.is_empty() {
            return Err(TierFailure::EmptyContent);
        }
        Ok(content.to_string())
    }
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionBackend for OpenAiProvider {
    async fn complete(
        &self,
        credential: &str,
        request: &CompletionRequest,
    ) -> Result<String, TierFailure> {
        let body = json!({
            "model": request.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
        });

        debug!(
            "Sending request: model={}, messages={}, temperature={:.2}",
            request.model,
            request.messages.len(),
            request.temperature
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(credential)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TierFailure::status(status.as_u16(), &text));
        }

        let value = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| Self::classify(&e))?;

        Self::extract_content(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_trimmed_content() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": "  hello there \n" } }]
        });
        assert_eq!(
            OpenAiProvider::extract_content(&body).unwrap(),
            "hello there"
        );
    }

    #[test]
    fn missing_content_is_malformed() {
        let body = json!({ "choices": [] });
        assert!(matches!(
            OpenAiProvider::extract_content(&body),
            Err(TierFailure::MalformedBody(_))
        ));
    }

    #[test]
    fn blank_content_is_not_a_success() {
        let body = json!({ "choices": [{ "message": { "content": "   " } }] });
        assert_eq!(
            OpenAiProvider::extract_content(&body),
            Err(TierFailure::EmptyContent)
        );
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let provider = OpenAiProvider::new().with_base_url("http://localhost:8080/v1/".to_string());
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }
}

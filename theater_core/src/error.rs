use std::fmt;

use thiserror::Error;

use crate::util::truncate_chars;

/// Longest error body kept in a [`TierFailure::Status`].
pub const MAX_ERROR_BODY_CHARS: usize = 200;

/// A single model tier rejected the request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TierFailure {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedBody(String),

    #[error("empty response content")]
    EmptyContent,
}

impl TierFailure {
    /// Build a status failure, truncating the body.
    #[must_use]
    pub fn status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            body: truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS),
        }
    }

    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

/// Every tier was tried once and none produced a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionFailure {
    pub attempts: Vec<(String, TierFailure)>,
}

impl CompletionFailure {
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        !self.attempts.is_empty() && self.attempts.iter().all(|(_, f)| f.is_auth_error())
    }
}

impl fmt::Display for CompletionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return write!(f, "no model tiers configured");
        }
        write!(f, "all {} model tiers failed", self.attempts.len())?;
        for (tier, failure) in &self.attempts {
            write!(f, "; {tier}: {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompletionFailure {}

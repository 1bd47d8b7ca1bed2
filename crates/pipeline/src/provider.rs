//! Port for language-model back ends.
//!
//! Nodes depend only on [`LlmProvider`]; concrete HTTP clients live in the
//! `llm` crate. A provider is built once per node with fixed
//! [`ModelSettings`] and is shared by every row of every invocation, so
//! implementations must tolerate concurrent `predict` calls.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ModelName, RetryPolicy};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions framing the whole conversation.
    System,
    /// Text from the human side of the conversation.
    User,
    /// Text previously produced by the model.
    Assistant,
}

/// One role-tagged message in a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who authored the message.
    pub role: ChatRole,
    /// Message text, sent verbatim.
    pub content: String,
}

impl ChatMessage {
    /// A [`ChatRole::System`] message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// A [`ChatRole::User`] message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// A [`ChatRole::Assistant`] message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Fixed configuration a provider is constructed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Back-end model to call.
    pub model: ModelName,

    /// Sampling temperature. `0.0` requests deterministic output.
    #[serde(default)]
    pub temperature: f32,

    /// Whether the provider may answer repeated identical prompts from its
    /// own response cache. The cache policy is entirely the provider's.
    #[serde(default)]
    pub cache: bool,
}

impl ModelSettings {
    /// Deterministic, uncached settings for `model`.
    pub fn new(model: ModelName) -> Self {
        Self {
            model,
            temperature: 0.0,
            cache: false,
        }
    }

    /// Enables or disables the provider's response cache.
    #[must_use]
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by an [`LlmProvider`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    /// The provider cannot be built because required configuration is absent
    /// (e.g. no API key).
    #[error("provider is not configured: {message}")]
    NotConfigured { message: String },

    /// The request never produced an HTTP response.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The request exceeded the provider's timeout.
    #[error("request timed out")]
    Timeout,

    /// The back end asked the client to slow down.
    #[error("rate limited")]
    RateLimited {
        /// Delay requested by the back end, when it sent one.
        retry_after: Option<Duration>,
    },

    /// The back end returned an error status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body could not be interpreted.
    #[error("malformed response: {message}")]
    MalformedResponse { message: String },
}

impl LlmError {
    /// Whether the failed call may be re-issued.
    ///
    /// Transport failures, timeouts, rate limiting and server-side (5xx)
    /// errors are retryable. Client errors, malformed responses and missing
    /// configuration are not.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            LlmError::Transport { .. } | LlmError::Timeout => RetryPolicy::Retryable { after: None },
            LlmError::RateLimited { retry_after } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            LlmError::Api { status, .. } if *status >= 500 => RetryPolicy::Retryable { after: None },
            LlmError::Api { .. } | LlmError::MalformedResponse { .. } | LlmError::NotConfigured { .. } => {
                RetryPolicy::NonRetryable
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// An asynchronous "predict from role-tagged messages" capability.
///
/// Timeouts and retries are the implementation's concern; callers simply
/// await whatever completion or failure it produces.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Settings the provider was built with. Nodes compare these against
    /// their own configuration at construction.
    fn settings(&self) -> &ModelSettings;

    /// The model this provider was built for.
    fn model(&self) -> &ModelName {
        &self.settings().model
    }

    /// Sends `messages` to the model and returns the generated text.
    async fn predict(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_serialise_lowercase() {
        let json = serde_json::to_value(ChatMessage::assistant("ok")).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "assistant", "content": "ok" }));
    }

    #[test]
    fn test_retry_policy_classification() {
        let after = Some(Duration::from_secs(3));
        assert_eq!(
            LlmError::RateLimited { retry_after: after }.retry_policy(),
            RetryPolicy::Retryable { after }
        );
        assert!(LlmError::Timeout.retry_policy().is_retryable());
        assert!(LlmError::Api {
            status: 503,
            message: "overloaded".into()
        }
        .retry_policy()
        .is_retryable());
        assert_eq!(
            LlmError::Api {
                status: 400,
                message: "bad request".into()
            }
            .retry_policy(),
            RetryPolicy::NonRetryable
        );
        assert_eq!(
            LlmError::MalformedResponse {
                message: "no choices".into()
            }
            .retry_policy(),
            RetryPolicy::NonRetryable
        );
    }
}

//! Connection settings for the OpenAI-compatible provider.

use std::num::NonZeroUsize;
use std::time::Duration;

use pipeline::{LlmError, ModelSettings};

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Environment variable overriding the API base URL.
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";

/// Configuration for [`crate::OpenAiProvider`].
#[derive(Clone)]
pub struct OpenAiConfig {
    /// Bearer token sent with every request.
    pub api_key: String,

    /// API root, without the `/chat/completions` suffix.
    pub base_url: String,

    /// Model, temperature and cache flag, fixed for the provider's lifetime.
    pub settings: ModelSettings,

    /// Per-request timeout, covering connect through body read.
    pub timeout: Duration,

    /// Additional attempts after a retryable failure.
    pub max_retries: u32,

    /// Delay before the first retry; doubled on every further attempt.
    pub initial_backoff: Duration,

    /// Upper bound on any single retry delay, including one requested by the
    /// server through `Retry-After`.
    pub max_backoff: Duration,

    /// Most responses kept when caching is enabled. The least recently used
    /// entry is evicted first.
    pub cache_capacity: NonZeroUsize,
}

impl OpenAiConfig {
    /// The public OpenAI API root.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    /// Responses cached per provider unless configured otherwise.
    pub const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
        Some(capacity) => capacity,
        None => panic!("cache capacity must be non-zero"),
    };

    /// Creates a configuration with default endpoint, timeout and retry settings.
    pub fn new(api_key: impl Into<String>, settings: ModelSettings) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_owned(),
            settings,
            timeout: Duration::from_secs(60),
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            cache_capacity: Self::DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Reads the API key (required) and base URL (optional) from the environment.
    pub fn from_env(settings: ModelSettings) -> Result<Self, LlmError> {
        Self::from_lookup(settings, |name| std::env::var(name).ok())
    }

    fn from_lookup(
        settings: ModelSettings,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LlmError> {
        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::NotConfigured {
                message: format!("{API_KEY_VAR} is not set"),
            })?;

        let mut config = Self::new(api_key, settings);
        if let Some(base_url) = lookup(BASE_URL_VAR).filter(|url| !url.is_empty()) {
            config.base_url = base_url;
        }
        Ok(config)
    }

    /// Full URL of the chat completions endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("settings", &self.settings)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff", &self.initial_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("cache_capacity", &self.cache_capacity)
            .finish()
    }
}

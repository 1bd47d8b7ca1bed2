//! Chat completion node.
//!
//! For every row, sends a fixed system message followed by the row's `user`
//! text to the provider and returns the reply as `message`. When configured to
//! include the prior turn, the row's `assistant` text (if non-null) is appended
//! after the user message so the model can continue from it.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    BatchNode, ChatMessage, FieldName, LlmProvider, ModelSettings, NodeError, Row,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fields::{model_settings, optional_str, required_str, require_provider};

const USER: &str = "user";
const ASSISTANT: &str = "assistant";
const MESSAGE: &str = "message";

/// Construction-time configuration for a [`ChatNode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatNodeConfig {
    /// Back-end model identifier.
    pub model: String,

    /// Declare `assistant` as a second input and append it to each prompt.
    pub include_prior_turn: bool,

    /// Let the provider serve repeated prompts from its response cache.
    pub cache: bool,

    /// Text of the system message that opens every prompt.
    pub system_prompt: String,
}

impl Default for ChatNodeConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_owned(),
            include_prior_turn: false,
            cache: false,
            system_prompt: "You are a helpful assistant.".to_owned(),
        }
    }
}

impl ChatNodeConfig {
    /// Provider settings matching this node: deterministic, cache as configured.
    pub fn model_settings(&self) -> Result<ModelSettings, NodeError> {
        model_settings(&self.model, self.cache)
    }
}

/// Builds a [`ChatNode`], checking the injected provider against the
/// configuration.
pub struct ChatNodeBuilder {
    config: ChatNodeConfig,
    provider: Option<Arc<dyn LlmProvider>>,
}

impl ChatNodeBuilder {
    /// Supplies the provider every row will be sent to.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Validates the configuration and builds the node.
    ///
    /// Fails with [`NodeError::MissingCapability`] when no provider was
    /// supplied, and with [`NodeError::Configuration`] when the model
    /// identifier is empty or the provider was built with different settings.
    pub fn build(self) -> Result<ChatNode, NodeError> {
        let settings = self.config.model_settings()?;
        let provider = require_provider(self.provider, "ChatNode", &settings)?;

        Ok(ChatNode {
            provider,
            include_prior_turn: self.config.include_prior_turn,
            system_prompt: self.config.system_prompt,
        })
    }
}

/// Sends each row's user turn to an LLM and returns the reply.
pub struct ChatNode {
    provider: Arc<dyn LlmProvider>,
    include_prior_turn: bool,
    system_prompt: String,
}

impl std::fmt::Debug for ChatNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatNode")
            .field("model", self.provider.model())
            .field("include_prior_turn", &self.include_prior_turn)
            .finish_non_exhaustive()
    }
}

impl ChatNode {
    /// Starts building a node from `config`.
    pub fn builder(config: ChatNodeConfig) -> ChatNodeBuilder {
        ChatNodeBuilder {
            config,
            provider: None,
        }
    }

    fn messages(&self, index: usize, row: &Row) -> Result<Vec<ChatMessage>, NodeError> {
        let mut messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(required_str(row, index, USER)?),
        ];

        if self.include_prior_turn {
            if let Some(prior) = optional_str(row, index, ASSISTANT)? {
                messages.push(ChatMessage::assistant(prior));
            }
        }

        Ok(messages)
    }
}

#[async_trait]
impl BatchNode for ChatNode {
    fn input_names(&self) -> Vec<FieldName> {
        if self.include_prior_turn {
            vec![FieldName::from_static(ASSISTANT), FieldName::from_static(USER)]
        } else {
            vec![FieldName::from_static(USER)]
        }
    }

    fn output_names(&self) -> Vec<FieldName> {
        vec![FieldName::from_static(MESSAGE)]
    }

    async fn process_row(&self, index: usize, row: Row) -> Result<Row, NodeError> {
        let messages = self.messages(index, &row)?;
        tracing::debug!(messages = messages.len(), "sending chat prompt");

        let reply = self
            .provider
            .predict(&messages)
            .await
            .map_err(|source| NodeError::RowFailure { row: index, source })?;

        Ok(Row::new().with(FieldName::from_static(MESSAGE), Value::String(reply)))
    }
}

//! Single-prompt generation node.
//!
//! Sends each row's fully rendered `prompt` to the provider as one user
//! message and returns the completion as `response`. This is the last stage of
//! a retrieval-augmented chain, after retrieval and prompt templating.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{BatchNode, ChatMessage, FieldName, LlmProvider, ModelSettings, NodeError, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fields::{model_settings, require_provider, required_str};

const PROMPT: &str = "prompt";
const RESPONSE: &str = "response";

/// Construction-time configuration for a [`GenerateNode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateNodeConfig {
    /// Back-end model identifier.
    pub model: String,

    /// Let the provider serve repeated prompts from its response cache.
    pub cache: bool,

    /// Optional system message placed before every prompt.
    pub system_prompt: Option<String>,
}

impl Default for GenerateNodeConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_owned(),
            cache: false,
            system_prompt: None,
        }
    }
}

impl GenerateNodeConfig {
    /// Provider settings matching this node: deterministic, cache as configured.
    pub fn model_settings(&self) -> Result<ModelSettings, NodeError> {
        model_settings(&self.model, self.cache)
    }
}

/// Builds a [`GenerateNode`], checking the injected provider against the
/// configuration.
pub struct GenerateNodeBuilder {
    config: GenerateNodeConfig,
    provider: Option<Arc<dyn LlmProvider>>,
}

impl GenerateNodeBuilder {
    /// Supplies the provider every prompt will be sent to.
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
    pub fn build(self) -> Result<GenerateNode, NodeError> {
        let settings = self.config.model_settings()?;
        let provider = require_provider(self.provider, "GenerateNode", &settings)?;

        Ok(GenerateNode {
            provider,
            system_prompt: self.config.system_prompt,
        })
    }
}

/// Completes one rendered prompt per row.
pub struct GenerateNode {
    provider: Arc<dyn LlmProvider>,
    system_prompt: Option<String>,
}

impl std::fmt::Debug for GenerateNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerateNode")
            .field("model", self.provider.model())
            .finish_non_exhaustive()
    }
}

impl GenerateNode {
    /// Starts building a node from `config`.
    pub fn builder(config: GenerateNodeConfig) -> GenerateNodeBuilder {
        GenerateNodeBuilder {
            config,
            provider: None,
        }
    }
}

#[async_trait]
impl BatchNode for GenerateNode {
    fn input_names(&self) -> Vec<FieldName> {
        vec![FieldName::from_static(PROMPT)]
    }

    fn output_names(&self) -> Vec<FieldName> {
        vec![FieldName::from_static(RESPONSE)]
    }

    async fn process_row(&self, index: usize, row: Row) -> Result<Row, NodeError> {
        let prompt = required_str(&row, index, PROMPT)?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::system(system.as_str()));
        }
        messages.push(ChatMessage::user(prompt));

        let completion = self
            .provider
            .predict(&messages)
            .await
            .map_err(|source| NodeError::RowFailure { row: index, source })?;

        Ok(Row::new().with(FieldName::from_static(RESPONSE), Value::String(completion)))
    }
}

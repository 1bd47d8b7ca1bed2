//! Typed access to row cells shared by the node implementations.

use std::sync::Arc;

use pipeline::{LlmProvider, ModelName, ModelSettings, NodeError, Row};
use serde_json::Value;

/// Returns the string in `name`, failing the row if it is absent or not a string.
pub(crate) fn required_str<'r>(row: &'r Row, index: usize, name: &str) -> Result<&'r str, NodeError> {
    match row.get(name) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(NodeError::InvalidRow {
            row: index,
            message: format!("field '{name}' must be a string, found {}", kind(other)),
        }),
        None => Err(NodeError::InvalidRow {
            row: index,
            message: format!("field '{name}' is missing"),
        }),
    }
}

/// Returns the string in `name`, treating an absent field and `null` alike.
pub(crate) fn optional_str<'r>(
    row: &'r Row,
    index: usize,
    name: &str,
) -> Result<Option<&'r str>, NodeError> {
    match row.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(NodeError::InvalidRow {
            row: index,
            message: format!("field '{name}' must be a string or null, found {}", kind(other)),
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Turns a configured model identifier and cache flag into provider settings.
pub(crate) fn model_settings(model: &str, cache: bool) -> Result<ModelSettings, NodeError> {
    let model = ModelName::new(model).ok_or_else(|| NodeError::Configuration {
        message: "model identifier must not be empty".to_owned(),
    })?;
    Ok(ModelSettings::new(model).with_cache(cache))
}

/// Fails construction when no provider was injected, or when the injected
/// provider was built with settings other than the node's configuration.
pub(crate) fn require_provider(
    provider: Option<Arc<dyn LlmProvider>>,
    node: &str,
    expected: &ModelSettings,
) -> Result<Arc<dyn LlmProvider>, NodeError> {
    let provider = provider.ok_or_else(|| NodeError::MissingCapability {
        capability: format!("{node} requires an LLM provider for model '{}'", expected.model),
    })?;

    let actual = provider.settings();
    if actual != expected {
        return Err(NodeError::Configuration {
            message: format!(
                "{node} is configured for model '{}' (temperature {}, cache {}) but its provider \
                 serves model '{}' (temperature {}, cache {})",
                expected.model,
                expected.temperature,
                expected.cache,
                actual.model,
                actual.temperature,
                actual.cache,
            ),
        });
    }
    Ok(provider)
}

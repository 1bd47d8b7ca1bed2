#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    Batch, ChatMessage, ChatRole, FieldName, LlmError, LlmProvider, ModelName, ModelSettings,
};
use serde_json::Value;

/// In-memory provider that replies `"reply to <last user text>"`.
///
/// Per-prompt delays and failures are scripted up front. Every call is
/// recorded, and in-flight calls are tracked so tests can observe concurrency
/// and cancellation.
pub struct ScriptedProvider {
    settings: ModelSettings,
    delays: HashMap<String, Duration>,
    failures: HashMap<String, LlmError>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(model: &'static str) -> Self {
        Self {
            settings: ModelSettings::new(ModelName::from_static(model)),
            delays: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Reports the response cache as enabled, as a provider built for a
    /// caching node would.
    pub fn cached(mut self) -> Self {
        self.settings.cache = true;
        self
    }

    pub fn delay(mut self, prompt: &str, delay: Duration) -> Self {
        self.delays.insert(prompt.to_owned(), delay);
        self
    }

    pub fn fail(mut self, prompt: &str, error: LlmError) -> Self {
        self.failures.insert(prompt.to_owned(), error);
        self
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter when the call finishes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    async fn predict(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if let Some(delay) = self.delays.get(&prompt) {
            tokio::time::sleep(*delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        if let Some(error) = self.failures.get(&prompt) {
            return Err(error.clone());
        }

        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(format!("reply to {prompt}"))
    }
}

pub fn field(name: &'static str) -> FieldName {
    FieldName::from_static(name)
}

pub fn strings(values: &[&str]) -> Vec<Value> {
    values.iter().map(|v| Value::String((*v).to_owned())).collect()
}

pub fn batch(columns: &[(&'static str, Vec<Value>)]) -> Batch {
    columns
        .iter()
        .map(|(name, values)| (field(name), values.clone()))
        .collect()
}

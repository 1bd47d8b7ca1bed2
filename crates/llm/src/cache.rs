//! In-memory response cache.
//!
//! Keyed by everything that determines a deterministic completion: model,
//! temperature and the exact message sequence. Shared by all concurrent
//! `predict` calls on one provider; the lock is never held across an await.
//! Capacity is fixed at construction and the least recently used response is
//! evicted first.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use lru::LruCache;
use pipeline::{ChatMessage, ModelSettings};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    model: String,
    temperature_bits: u32,
    messages: Vec<ChatMessage>,
}

/// Bounded map from a prompt to the completion the back end returned for it.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<LruCache<CacheKey, String>>,
}

impl ResponseCache {
    /// Creates an empty cache holding at most `capacity` responses.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the stored completion for `messages`, marking it recently used.
    pub fn get(&self, settings: &ModelSettings, messages: &[ChatMessage]) -> Option<String> {
        let key = Self::key(settings, messages);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Stores a completion, evicting the least recently used one when full.
    pub fn insert(&self, settings: &ModelSettings, messages: &[ChatMessage], response: String) {
        let key = Self::key(settings, messages);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, response);
    }

    /// Number of cached completions.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(settings: &ModelSettings, messages: &[ChatMessage]) -> CacheKey {
        CacheKey {
            model: settings.model.as_str().to_owned(),
            temperature_bits: settings.temperature.to_bits(),
            messages: messages.to_vec(),
        }
    }
}

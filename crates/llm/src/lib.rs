//! LLM provider infrastructure adapter.
//!
//! Implements the [`pipeline::LlmProvider`] trait for OpenAI-compatible chat
//! completion APIs. Additional providers are added as new `impl` blocks in
//! this crate without any changes to the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport, request formatting, response
//! parsing, capped `Retry-After` handling, exponential back-off and bounded
//! response caching live here. The [`pipeline`] crate sees only [`pipeline::LlmProvider`].

mod cache;
mod config;
mod openai;

pub use cache::ResponseCache;
pub use config::{OpenAiConfig, API_KEY_VAR, BASE_URL_VAR};
pub use openai::OpenAiProvider;

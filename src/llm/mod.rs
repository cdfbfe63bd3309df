//! LLM provider abstraction layer
//!
//! Stage agents talk to a chat-completions backend through the [`LlmProvider`]
//! trait so the pipeline can be driven by a mock in tests.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;

//! Testing utilities and mock implementations
//!
//! Mocks for the LLM provider, tools, stage executor and approval gate, so the
//! pipeline can run end to end without network access or an operator.

pub mod mocks;

pub use mocks::*;

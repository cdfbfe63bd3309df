//! Observability for jobscout
//!
//! Structured logging via `tracing`. Logs go to stderr so that stdout carries
//! only prompts and results.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat, LogSettings};

// Span macros for structured logging
pub use logging::{stage_span, tool_span};

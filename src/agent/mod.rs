//! Stage agents
//!
//! [`AgentExecutor`] is the production [`StageExecutor`](crate::pipeline::StageExecutor):
//! each stage is run as an LLM conversation with access to the stage's tools.

pub mod executor;

pub use executor::{AgentExecutor, AgentSettings};

//! The seam between the pipeline and whatever produces a stage's reply

use crate::criteria::SearchCriteria;
use crate::llm::LlmError;
use crate::pipeline::artifact::ArtifactError;
use crate::pipeline::stage::{PipelineStage, StageKind};
use crate::tools::ToolError;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Everything a stage run gets to see
#[derive(Debug, Clone, Copy)]
pub struct StageRequest<'a> {
    pub run_id: Uuid,
    pub stage: &'a PipelineStage,
    pub criteria: &'a SearchCriteria,
    /// Declared upstream artifacts, as read back from disk
    pub upstream: &'a [(StageKind, Value)],
    /// Operator feedback from earlier revisions, oldest first
    pub feedback: &'a [String],
}

/// Produces the raw text reply for one stage
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, request: StageRequest<'_>) -> Result<String, StageError>;
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("LLM request failed: {0}")]
    Llm(#[from] LlmError),
    #[error("Tool setup failed: {0}")]
    Tool(#[from] ToolError),
    #[error("Tool execution exceeded maximum iterations ({0})")]
    IterationLimit(usize),
    #[error("Agent reply is not valid JSON: {error}")]
    MalformedOutput { error: String, raw: String },
    #[error("Agent reply does not fit the stage output: {0}")]
    Contract(String),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl StageError {
    /// Raw agent text, when the failure was about its shape
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::MalformedOutput { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

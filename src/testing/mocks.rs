//! Mock implementations for testing
//!
//! Scripted LLM provider, tool, stage executor and approval gates so the
//! pipeline can be exercised without network access or a terminal.

use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
    ToolCall,
};
use crate::pipeline::approval::{ApprovalDecision, ApprovalError, ApprovalGate, ApprovalRequest};
use crate::pipeline::executor::{StageError, StageExecutor, StageRequest};
use crate::pipeline::stage::StageKind;
use crate::tools::{Tool, ToolDescription, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mock LLM provider returning scripted responses in order
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    responses: Mutex<VecDeque<CompletionResponse>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    failure: Option<LlmError>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    /// Provider whose every call fails with `error`
    pub fn failing(error: LlmError) -> Self {
        Self {
            failure: Some(error),
            ..Default::default()
        }
    }

    pub fn text_response(content: impl Into<String>) -> CompletionResponse {
        CompletionResponse {
            content: Some(content.into()),
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
            tool_calls: None,
            metadata: HashMap::new(),
        }
    }

    pub fn tool_call_response(calls: Vec<(&str, Value)>) -> CompletionResponse {
        let tool_calls = calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, arguments))| ToolCall {
                id: format!("call_{i}"),
                name: name.to_string(),
                arguments,
            })
            .collect();

        CompletionResponse {
            content: None,
            finish_reason: FinishReason::ToolCalls,
            tool_calls: Some(tool_calls),
            ..Self::text_response("")
        }
    }

    /// Requests received so far
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().await.push(request);

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| LlmError::RequestFailed("Mock LLM has no scripted responses left".to_string()))
    }
}

/// Tool returning a fixed value and recording its calls
#[derive(Debug)]
pub struct MockTool {
    name: String,
    response: Value,
    fail: bool,
    calls: Mutex<Vec<Value>>,
}

impl MockTool {
    pub fn new(name: impl Into<String>, response: Value) -> Self {
        Self {
            name: name.into(),
            response,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            fail: true,
            ..Self::new(name, Value::Null)
        }
    }

    pub async fn calls(&self) -> Vec<Value> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: self.name.clone(),
            description: format!("Mock {} tool", self.name),
            parameters: json!({"type": "object"}),
        }
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        self.calls.lock().await.push(parameters.clone());
        if self.fail {
            return Err(ToolError::ExecutionError("Mock tool failure".to_string()));
        }
        Ok(self.response.clone())
    }
}

/// What a [`MockStageExecutor`] was asked to do
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStageRequest {
    pub stage: StageKind,
    pub upstream: Vec<(StageKind, Value)>,
    pub feedback: Vec<String>,
}

/// Stage executor with a queue of scripted replies per stage
#[derive(Default)]
pub struct MockStageExecutor {
    replies: Mutex<HashMap<StageKind, VecDeque<Result<String, StageError>>>>,
    requests: Mutex<Vec<RecordedStageRequest>>,
}

impl MockStageExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, stage: StageKind, reply: impl Into<String>) -> Self {
        self.push(stage, Ok(reply.into()))
    }

    pub fn with_error(self, stage: StageKind, error: StageError) -> Self {
        self.push(stage, Err(error))
    }

    fn push(mut self, stage: StageKind, reply: Result<String, StageError>) -> Self {
        self.replies
            .get_mut()
            .entry(stage)
            .or_default()
            .push_back(reply);
        self
    }

    pub async fn requests(&self) -> Vec<RecordedStageRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn stages_run(&self) -> Vec<StageKind> {
        self.requests.lock().await.iter().map(|r| r.stage).collect()
    }
}

#[async_trait]
impl StageExecutor for MockStageExecutor {
    async fn execute(&self, request: StageRequest<'_>) -> Result<String, StageError> {
        self.requests.lock().await.push(RecordedStageRequest {
            stage: request.stage.kind,
            upstream: request.upstream.to_vec(),
            feedback: request.feedback.to_vec(),
        });

        self.replies
            .lock()
            .await
            .get_mut(&request.stage.kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(StageError::Contract(format!(
                    "no scripted reply for stage '{}'",
                    request.stage.kind
                )))
            })
    }
}

/// Approval gate answering from a script; approves once the script runs out
#[derive(Debug, Default)]
pub struct ScriptedApproval {
    decisions: Mutex<VecDeque<ApprovalDecision>>,
    reviews: Mutex<Vec<(StageKind, usize)>>,
    edit: Option<Value>,
}

impl ScriptedApproval {
    pub fn new(decisions: Vec<ApprovalDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            ..Default::default()
        }
    }

    /// Overwrite the artifact with `value` before answering, like an operator editing the file
    pub fn with_edit(mut self, value: Value) -> Self {
        self.edit = Some(value);
        self
    }

    /// `(stage, revision)` for every review requested
    pub async fn reviews(&self) -> Vec<(StageKind, usize)> {
        self.reviews.lock().await.clone()
    }
}

#[async_trait]
impl ApprovalGate for ScriptedApproval {
    async fn review(&self, request: &ApprovalRequest<'_>) -> Result<ApprovalDecision, ApprovalError> {
        self.reviews
            .lock()
            .await
            .push((request.stage.kind, request.revision));

        if let Some(edit) = &self.edit {
            let body = serde_json::to_vec_pretty(edit)
                .map_err(|e| ApprovalError::Io(std::io::Error::other(e)))?;
            std::fs::write(request.artifact_path, body)?;
        }

        Ok(self
            .decisions
            .lock()
            .await
            .pop_front()
            .unwrap_or(ApprovalDecision::Approve))
    }
}

/// Approval gate that never answers
#[derive(Debug, Default)]
pub struct PendingApproval;

#[async_trait]
impl ApprovalGate for PendingApproval {
    async fn review(&self, _request: &ApprovalRequest<'_>) -> Result<ApprovalDecision, ApprovalError> {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::Message;

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![Message::user("hi")],
            model: "mock-model".to_string(),
            max_tokens: None,
            temperature: None,
            tools: None,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_llm_replays_in_order_then_errors() {
        let llm = MockLlmProvider::new(vec![
            MockLlmProvider::text_response("one"),
            MockLlmProvider::tool_call_response(vec![("web_search", json!({"query": "q"}))]),
        ]);

        let first = llm.complete(request()).await.unwrap();
        assert_eq!(first.content.as_deref(), Some("one"));

        let second = llm.complete(request()).await.unwrap();
        assert_eq!(second.finish_reason, FinishReason::ToolCalls);
        assert_eq!(second.tool_calls.unwrap()[0].name, "web_search");

        assert!(llm.complete(request()).await.is_err());
        assert_eq!(llm.requests().await.len(), 3);
    }

    #[tokio::test]
    async fn test_mock_tool_records_calls() {
        let tool = MockTool::new("scrape_website", json!({"content": "x"}));
        assert_eq!(tool.execute(&json!({"url": "u"})).await.unwrap()["content"], "x");
        assert_eq!(tool.calls().await, vec![json!({"url": "u"})]);

        let failing = MockTool::failing("scrape_website");
        assert!(failing.execute(&json!({})).await.is_err());
    }
}

//! LLM-backed stage executor
//!
//! Runs one stage as a chat with the model: a system prompt built from the
//! stage's agent role, a task message with the rendered description and the
//! upstream artifacts, then a tool loop until the model answers without tool
//! calls.

use crate::config::JobScoutConfig;
use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider, Message, ToolCall};
use crate::pipeline::executor::{StageError, StageExecutor, StageRequest};
use crate::pipeline::record::{DiscoveryArtifact, ExtractedRecord};
use crate::pipeline::stage::{AgentRole, StageKind};
use crate::tools::{ToolDescription, ToolSystem};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Model settings shared by every stage
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_iterations: usize,
}

impl AgentSettings {
    pub fn from_config(config: &JobScoutConfig) -> Self {
        Self {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            max_iterations: config.pipeline.max_tool_iterations,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&JobScoutConfig::default())
    }
}

pub struct AgentExecutor {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolSystem>,
    settings: AgentSettings,
}

impl AgentExecutor {
    pub fn new(llm: Arc<dyn LlmProvider>, tools: Arc<ToolSystem>, settings: AgentSettings) -> Self {
        Self {
            llm,
            tools,
            settings,
        }
    }

    /// System prompt for an agent role, stamped with the current date
    fn build_system_prompt(agent: &AgentRole, goal: &str, now: chrono::DateTime<chrono::Utc>) -> String {
        format!(
            "You are {}. {}\nYour personal goal is: {}\n\nCurrent date and time: {} UTC",
            agent.role,
            agent.backstory,
            goal,
            now.format("%Y-%m-%d %H:%M:%S")
        )
    }

    /// Output format instructions for a stage (pure function)
    fn output_instructions(kind: StageKind) -> String {
        let schema = match kind {
            StageKind::Discovery => DiscoveryArtifact::json_schema(),
            StageKind::Extraction | StageKind::Validation => serde_json::json!({
                "type": "array",
                "items": ExtractedRecord::json_schema()
            }),
        };
        format!(
            "Reply with JSON only, no commentary. The reply must match this JSON Schema:\n{schema}"
        )
    }

    fn build_initial_messages(request: &StageRequest<'_>) -> Vec<Message> {
        let stage = request.stage;
        let goal = request.criteria.render(&stage.agent.goal);
        let mut messages = vec![Message::system(Self::build_system_prompt(
            &stage.agent,
            &goal,
            chrono::Utc::now(),
        ))];

        messages.push(Message::user(format!(
            "Current task: {}\n\nExpected output: {}\n\n{}",
            request.criteria.render(&stage.description),
            stage.expected_output,
            Self::output_instructions(stage.kind)
        )));

        for (kind, artifact) in request.upstream {
            messages.push(Message::user(format!(
                "Output of the {kind} stage:\n{}",
                serde_json::to_string_pretty(artifact).unwrap_or_else(|_| artifact.to_string())
            )));
        }

        if !request.feedback.is_empty() {
            let notes: Vec<String> = request.feedback.iter().map(|f| format!("- {f}")).collect();
            messages.push(Message::user(format!(
                "A reviewer asked for changes to your previous answer. Redo the task taking this feedback into account:\n{}",
                notes.join("\n")
            )));
        }

        messages
    }

    fn create_completion_request(&self, messages: Vec<Message>, tools: &[ToolDescription]) -> CompletionRequest {
        CompletionRequest {
            messages,
            model: self.settings.model.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.to_vec())
            },
            metadata: HashMap::new(),
        }
    }

    /// Execute one tool call; failures go back to the model as text
    async fn execute_single_tool_call(&self, tool_call: &ToolCall, allowed: &[ToolDescription]) -> String {
        if !allowed.iter().any(|t| t.name == tool_call.name) {
            warn!(tool = %tool_call.name, "Model called a tool not available to this stage");
            return format!("Tool {} is not available for this task", tool_call.name);
        }

        let span = crate::tool_span!(tool = %tool_call.name, call_id = %tool_call.id);
        async {
            debug!(args = %tool_call.arguments, "Executing tool");
            match self
                .tools
                .execute_tool(&tool_call.name, &tool_call.arguments)
                .await
            {
                Ok(result) => format!("Tool {} returned: {}", tool_call.name, result),
                Err(e) => {
                    warn!(error = %e, "Tool failed");
                    format!("Tool {} failed: {}", tool_call.name, e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute_tool_calls(&self, tool_calls: &[ToolCall], allowed: &[ToolDescription]) -> Vec<String> {
        let mut results = Vec::with_capacity(tool_calls.len());
        for tool_call in tool_calls {
            results.push(self.execute_single_tool_call(tool_call, allowed).await);
        }
        results
    }

    fn add_assistant_response(messages: &mut Vec<Message>, response: &CompletionResponse) {
        if let Some(content) = response.content.as_deref().filter(|c| !c.trim().is_empty()) {
            messages.push(Message::assistant(content));
        }
    }

    fn add_tool_results(messages: &mut Vec<Message>, tool_results: &[String]) {
        if !tool_results.is_empty() {
            messages.push(Message::user(format!(
                "Tool results:\n{}",
                tool_results.join("\n")
            )));
        }
    }

    fn check_iteration_limit(iteration: usize, max_iterations: usize) -> Result<(), StageError> {
        if iteration > max_iterations {
            return Err(StageError::IterationLimit(max_iterations));
        }
        Ok(())
    }

    fn pending_tool_calls(response: &CompletionResponse) -> Option<&[ToolCall]> {
        response
            .tool_calls
            .as_deref()
            .filter(|calls| !calls.is_empty())
    }
}

#[async_trait]
impl StageExecutor for AgentExecutor {
    async fn execute(&self, request: StageRequest<'_>) -> Result<String, StageError> {
        let tools = self.tools.describe_tools(&request.stage.tool_names())?;
        let mut messages = Self::build_initial_messages(&request);
        let mut iteration = 0;

        loop {
            iteration += 1;
            Self::check_iteration_limit(iteration, self.settings.max_iterations)?;

            let mut completion = self.create_completion_request(messages.clone(), &tools);
            completion
                .metadata
                .insert("run_id".to_string(), request.run_id.to_string());
            completion
                .metadata
                .insert("stage".to_string(), request.stage.kind.to_string());
            debug!(
                model = %completion.model,
                messages = completion.messages.len(),
                tools = tools.len(),
                iteration,
                "Sending completion request"
            );
            let response = self.llm.complete(completion).await?;
            Self::add_assistant_response(&mut messages, &response);

            if let Some(tool_calls) = Self::pending_tool_calls(&response) {
                debug!(iteration, tool_count = tool_calls.len(), "Processing tool calls");
                let results = self.execute_tool_calls(tool_calls, &tools).await;
                Self::add_tool_results(&mut messages, &results);
                continue;
            }

            info!(
                stage = %request.stage.kind,
                iterations = iteration,
                tokens = response.usage.total_tokens,
                "Agent finished"
            );
            return Ok(response.content.unwrap_or_default());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CriteriaSection;
    use crate::criteria::SearchCriteria;
    use crate::pipeline::stage::standard_stages;
    use crate::testing::mocks::{MockLlmProvider, MockTool};
    use chrono::TimeZone;
    use serde_json::json;
    use std::num::NonZeroU32;
    use uuid::Uuid;

    fn criteria() -> SearchCriteria {
        SearchCriteria::new(
            &CriteriaSection::default(),
            "New York City",
            NonZeroU32::new(3).unwrap(),
            vec!["Banks".to_string()],
        )
        .unwrap()
    }

    fn settings(max_iterations: usize) -> AgentSettings {
        AgentSettings {
            max_iterations,
            ..Default::default()
        }
    }

    #[test]
    fn test_system_prompt_contains_role_and_date() {
        let stage = &standard_stages()[1];
        let now = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let prompt = AgentExecutor::build_system_prompt(&stage.agent, &stage.agent.goal, now);

        assert!(prompt.starts_with("You are Information Extractor."));
        assert!(prompt.contains("Your personal goal is: Extract company websites"));
        assert!(prompt.ends_with("2024-03-01 09:30:00 UTC"));
    }

    #[test]
    fn test_initial_messages_render_criteria_upstream_and_feedback() {
        let stages = standard_stages();
        let criteria = criteria();
        let upstream = vec![(StageKind::Discovery, json!({"candidates": []}))];
        let feedback = vec!["only banks".to_string()];
        let request = StageRequest {
            run_id: Uuid::new_v4(),
            stage: &stages[0],
            criteria: &criteria,
            upstream: &upstream,
            feedback: &feedback,
        };

        let messages = AgentExecutor::build_initial_messages(&request);

        assert_eq!(messages.len(), 4);
        assert!(messages[0].content.contains("located in New York City"));
        assert!(messages[1].content.contains("Search for 3 internship, associate opportunities"));
        assert!(messages[1].content.contains("JSON Schema"));
        assert!(messages[2].content.starts_with("Output of the discovery stage"));
        assert!(messages[3].content.contains("- only banks"));
    }

    #[tokio::test]
    async fn test_tool_loop_runs_tools_then_returns_content() {
        let llm = Arc::new(MockLlmProvider::new(vec![
            MockLlmProvider::tool_call_response(vec![("scrape_website", json!({"url": "https://a.com"}))]),
            MockLlmProvider::text_response("[]"),
        ]));
        let tool = Arc::new(MockTool::new("scrape_website", json!({"content": "Apply by May"})));
        let tools = Arc::new(ToolSystem::new().with_tool(tool.clone()));
        let executor = AgentExecutor::new(llm.clone(), tools, settings(5));

        let stages = standard_stages();
        let criteria = criteria();
        let upstream = vec![(StageKind::Discovery, json!({"candidates": []}))];
        let reply = executor
            .execute(StageRequest {
                run_id: Uuid::new_v4(),
                stage: &stages[1],
                criteria: &criteria,
                upstream: &upstream,
                feedback: &[],
            })
            .await
            .unwrap();

        assert_eq!(reply, "[]");
        assert_eq!(tool.calls().await.len(), 1);

        let requests = llm.requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(1));
        let last = requests[1].messages.last().unwrap();
        assert!(last.content.starts_with("Tool results:"));
        assert!(last.content.contains("Apply by May"));
    }

    #[tokio::test]
    async fn test_undeclared_tool_is_refused() {
        let llm = Arc::new(MockLlmProvider::new(vec![
            MockLlmProvider::tool_call_response(vec![("web_search", json!({"query": "x"}))]),
            MockLlmProvider::text_response("[]"),
        ]));
        let search = Arc::new(MockTool::new("web_search", json!({"results": []})));
        let scrape = Arc::new(MockTool::new("scrape_website", json!({})));
        let tools = Arc::new(ToolSystem::new().with_tool(search.clone()).with_tool(scrape));
        let executor = AgentExecutor::new(llm.clone(), tools, settings(5));

        let stages = standard_stages();
        let criteria = criteria();
        executor
            .execute(StageRequest {
                run_id: Uuid::new_v4(),
                stage: &stages[1],
                criteria: &criteria,
                upstream: &[],
                feedback: &[],
            })
            .await
            .unwrap();

        assert!(search.calls().await.is_empty());
        let last = llm.requests().await[1].messages.last().unwrap().content.clone();
        assert!(last.contains("not available"));
    }

    #[tokio::test]
    async fn test_iteration_limit_fails_stage() {
        let responses = (0..5)
            .map(|_| MockLlmProvider::tool_call_response(vec![("scrape_website", json!({"url": "https://a.com"}))]))
            .collect();
        let llm = Arc::new(MockLlmProvider::new(responses));
        let tools = Arc::new(ToolSystem::new().with_tool(Arc::new(MockTool::new("scrape_website", json!({})))));
        let executor = AgentExecutor::new(llm, tools, settings(2));

        let stages = standard_stages();
        let criteria = criteria();
        let result = executor
            .execute(StageRequest {
                run_id: Uuid::new_v4(),
                stage: &stages[1],
                criteria: &criteria,
                upstream: &[],
                feedback: &[],
            })
            .await;

        assert!(matches!(result, Err(StageError::IterationLimit(2))));
    }

    #[tokio::test]
    async fn test_missing_stage_tool_is_setup_error() {
        let llm = Arc::new(MockLlmProvider::new(vec![]));
        let executor = AgentExecutor::new(llm, Arc::new(ToolSystem::new()), settings(2));

        let stages = standard_stages();
        let criteria = criteria();
        let result = executor
            .execute(StageRequest {
                run_id: Uuid::new_v4(),
                stage: &stages[0],
                criteria: &criteria,
                upstream: &[],
                feedback: &[],
            })
            .await;

        assert!(matches!(result, Err(StageError::Tool(_))));
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let llm = Arc::new(MockLlmProvider::failing(crate::llm::LlmError::RateLimitExceeded(
            "slow down".to_string(),
        )));
        let executor = AgentExecutor::new(llm, Arc::new(ToolSystem::new()), settings(2));

        let stages = standard_stages();
        let criteria = criteria();
        let result = executor
            .execute(StageRequest {
                run_id: Uuid::new_v4(),
                stage: &stages[2],
                criteria: &criteria,
                upstream: &[],
                feedback: &[],
            })
            .await;

        assert!(matches!(result, Err(StageError::Llm(_))));
    }
}

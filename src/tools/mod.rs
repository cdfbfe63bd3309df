//! Tool system for stage agents
//!
//! A tool describes its parameters as a JSON Schema; parameters coming back from
//! the model are validated against that schema before the tool runs. Each stage
//! sees only the tools it declares.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub mod builtin;

/// Tool interface
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and JSON Schema of the parameters
    fn describe(&self) -> ToolDescription;

    /// Run the tool. Parameters have already been validated against `describe()`.
    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError>;
}

/// Tool description handed to the model
#[derive(Debug, Clone)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolSystem {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under the name it describes itself with
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.describe().name;
        self.tools.insert(name, tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Get tool description
    pub fn describe_tool(&self, tool_name: &str) -> Option<ToolDescription> {
        self.tools.get(tool_name).map(|tool| tool.describe())
    }

    /// Descriptions for the named tools; names that are not registered are an error
    pub fn describe_tools(&self, names: &[&str]) -> Result<Vec<ToolDescription>, ToolError> {
        names
            .iter()
            .map(|name| {
                self.describe_tool(name)
                    .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
            })
            .collect()
    }

    /// Execute tool with validated parameters
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: &Value,
    ) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        Self::validate_parameters(&tool.describe(), parameters)?;

        tool.execute(parameters).await
    }

    fn validate_parameters(description: &ToolDescription, parameters: &Value) -> Result<(), ToolError> {
        let validator = jsonschema::validator_for(&description.parameters)
            .map_err(|e| ToolError::SchemaError(format!("Schema compilation error: {e}")))?;

        validator.validate(parameters).map_err(|errors| {
            let error_messages: Vec<String> = errors
                .map(|e| format!("At '{}': {}", e.instance_path, e))
                .collect();
            ToolError::ValidationError(error_messages.join("; "))
        })
    }

    /// Get list of available tools
    pub fn list_tools(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

/// Tool system errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Tool initialization failed: {0}")]
    InitializationError(String),
    #[error("Parameter validation failed: {0}")]
    ValidationError(String),
    #[error("Schema error: {0}")]
    SchemaError(String),
    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

//! Web search tool backed by the Serper API

use crate::config::SearchSection;
use crate::tools::{Tool, ToolDescription, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Web search tool using Serper API
pub struct WebSearchTool {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    max_results: usize,
    country: String,
    language: String,
}

impl WebSearchTool {
    /// Create a search tool; the key comes from resolved credentials, never the environment
    pub fn new(settings: &SearchSection, api_key: impl Into<String>) -> Result<Self, ToolError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ToolError::InitializationError(
                "search API key is required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ToolError::InitializationError(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/search", settings.base_url.trim_end_matches('/')),
            max_results: settings.max_results,
            country: settings.country.clone(),
            language: settings.language.clone(),
        })
    }

    /// Build search payload (pure function)
    fn build_search_payload(
        query: &str,
        num_results: usize,
        max_results: usize,
        country: &str,
        language: &str,
    ) -> Value {
        json!({
            "q": query,
            "num": std::cmp::min(num_results, max_results),
            "gl": country,
            "hl": language
        })
    }

    /// Parse search response (pure function)
    fn parse_search_response(search_result: &Value, num_results: usize) -> Vec<Value> {
        search_result
            .get("organic")
            .and_then(|o| o.as_array())
            .map(|organic| {
                organic
                    .iter()
                    .filter_map(|result| {
                        let title = result.get("title").and_then(|t| t.as_str())?;
                        let link = result.get("link").and_then(|l| l.as_str())?;
                        let snippet =
                            result.get("snippet").and_then(|s| s.as_str()).unwrap_or("");
                        Some(json!({
                            "title": title,
                            "url": link,
                            "snippet": snippet
                        }))
                    })
                    .take(num_results)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn extract_num_results(parameters: &Value, default: usize) -> usize {
        parameters
            .get("num_results")
            .and_then(|n| n.as_u64())
            .map(|n| n as usize)
            .unwrap_or(default)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "web_search".to_string(),
            description: "Search the web for job postings, career pages and company websites"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Search query"
                    },
                    "num_results": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 20,
                        "default": 10
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let query = parameters["query"]
            .as_str()
            .ok_or_else(|| ToolError::ExecutionError("Query parameter is required".to_string()))?;
        let num_results = Self::extract_num_results(parameters, self.max_results);

        let payload = Self::build_search_payload(
            query,
            num_results,
            self.max_results,
            &self.country,
            &self.language,
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ToolError::ExecutionError(format!(
                "Serper API error ({}): {}",
                status.as_u16(),
                error_text
            )));
        }

        let search_result: Value = response
            .json()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Failed to parse response: {e}")))?;

        let results = Self::parse_search_response(&search_result, num_results);
        Ok(json!({
            "query": query,
            "results": results
        }))
    }
}

//! Website scrape tool
//!
//! Fetches a page and reduces it to readable text with article_scraper
//! (Mozilla Readability), falling back to a plain tag stripper when the page
//! has no article structure.

use crate::config::ScrapeSection;
use crate::tools::{Tool, ToolDescription, ToolError};
use article_scraper::Readability;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Website scrape tool
pub struct ScrapeWebsiteTool {
    client: reqwest::Client,
    max_response_size: usize,
    max_text_chars: usize,
}

impl ScrapeWebsiteTool {
    pub fn new(settings: &ScrapeSection) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("jobscout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::InitializationError(e.to_string()))?;

        Ok(Self {
            client,
            max_response_size: settings.max_response_size,
            max_text_chars: settings.max_text_chars,
        })
    }

    /// Extract readable content from HTML using article_scraper
    async fn extract_readable_content(html: &str, url: &str) -> Result<String, String> {
        let parsed_url = match Url::parse(url) {
            Ok(u) => Some(u),
            Err(_) => {
                tracing::debug!("Failed to parse URL '{url}', using simple extraction");
                return Ok(Self::simple_html_to_text(html));
            }
        };

        // article_scraper can panic on malformed HTML
        let html_owned = html.to_string();
        let result = tokio::task::spawn_blocking(move || {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                tokio::runtime::Handle::current()
                    .block_on(async { Readability::extract(&html_owned, parsed_url).await })
            }))
        })
        .await;

        match result {
            Ok(Ok(Ok(article_text))) => {
                let text = Self::simple_html_to_text(&article_text);
                if text.is_empty() {
                    Ok(Self::simple_html_to_text(html))
                } else {
                    Ok(text)
                }
            }
            Ok(Ok(Err(e))) => {
                tracing::debug!("Article extraction failed: {}, falling back", e);
                Ok(Self::simple_html_to_text(html))
            }
            Ok(Err(_panic)) => Err(format!(
                "Content extraction failed for URL '{url}': HTML parser rejected this page's structure"
            )),
            Err(e) => {
                tracing::warn!("Article extraction task failed: {}", e);
                Ok(Self::simple_html_to_text(html))
            }
        }
    }

    /// Simple HTML to text conversion fallback (pure function)
    fn simple_html_to_text(html: &str) -> String {
        let mut result = String::new();
        let mut in_tag = false;
        let mut in_script = false;
        let mut in_style = false;
        let mut tag_name = String::new();

        for ch in html.chars() {
            match ch {
                '<' => {
                    in_tag = true;
                    tag_name.clear();
                }
                '>' if in_tag => {
                    let tag_lower = tag_name
                        .split_whitespace()
                        .next()
                        .unwrap_or("")
                        .to_lowercase();

                    match tag_lower.as_str() {
                        "script" => in_script = true,
                        "/script" => in_script = false,
                        "style" => in_style = true,
                        "/style" => in_style = false,
                        _ => {}
                    }

                    if matches!(
                        tag_lower.trim_start_matches('/').trim_end_matches('/'),
                        "div" | "p" | "br" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
                    ) {
                        result.push('\n');
                    }

                    in_tag = false;
                    tag_name.clear();
                }
                _ if in_tag => tag_name.push(ch),
                _ if in_script || in_style => {}
                _ if ch.is_whitespace() => {
                    if !result.ends_with(' ') && !result.ends_with('\n') {
                        result.push(' ');
                    }
                }
                _ => result.push(ch),
            }
        }

        result
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Cut text to at most `max_chars` characters (pure function)
    fn truncate_chars(text: String, max_chars: usize) -> (String, bool) {
        match text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
            None => (text, false),
        }
    }
}

#[async_trait]
impl Tool for ScrapeWebsiteTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "scrape_website".to_string(),
            description: "Fetch a web page (job posting, careers page, company site) and return its readable text".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "Absolute http(s) URL of the page to read"
                    }
                },
                "required": ["url"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let url = parameters["url"]
            .as_str()
            .ok_or_else(|| ToolError::ExecutionError("url parameter is required".to_string()))?;

        let parsed = Url::parse(url)
            .map_err(|e| ToolError::ExecutionError(format!("Invalid URL '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ToolError::ExecutionError(format!(
                "Unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionError(e.to_string()))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionError(e.to_string()))?;

        if body.len() > self.max_response_size {
            return Err(ToolError::ExecutionError(format!(
                "Response too large: {} bytes (max: {})",
                body.len(),
                self.max_response_size
            )));
        }

        let text = Self::extract_readable_content(&body, &final_url)
            .await
            .map_err(ToolError::ExecutionError)?;
        let (text, truncated) = Self::truncate_chars(text, self.max_text_chars);

        Ok(json!({
            "url": final_url,
            "status": status,
            "content": text,
            "truncated": truncated
        }))
    }
}

//! Tool system integration: builtin tools behind the registry, HTTP mocked
//!
//! Parameters are checked against each tool's schema before the tool runs, so
//! a bad call never reaches the network.

use jobscout::config::{ScrapeSection, SearchSection};
use jobscout::tools::builtin::{ScrapeWebsiteTool, WebSearchTool};
use jobscout::tools::{ToolError, ToolSystem};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn search_settings(server: &MockServer) -> SearchSection {
    SearchSection {
        base_url: server.uri(),
        max_results: 5,
        timeout_secs: 5,
        ..Default::default()
    }
}

fn tool_system(server: &MockServer) -> ToolSystem {
    let scrape = ScrapeSection {
        timeout_secs: 5,
        ..Default::default()
    };
    ToolSystem::new()
        .with_tool(Arc::new(
            WebSearchTool::new(&search_settings(server), "serper-test-key").unwrap(),
        ))
        .with_tool(Arc::new(ScrapeWebsiteTool::new(&scrape).unwrap()))
}

#[tokio::test]
async fn test_builtin_tools_are_registered_by_name() {
    let server = MockServer::start().await;
    let tools = tool_system(&server);

    assert_eq!(tools.list_tools(), ["scrape_website", "web_search"]);
    let described = tools.describe_tools(&["web_search"]).unwrap();
    assert_eq!(described[0].parameters["required"], json!(["query"]));
    assert!(matches!(
        tools.describe_tools(&["send_email"]),
        Err(ToolError::UnknownTool(name)) if name == "send_email"
    ));
}

#[tokio::test]
async fn test_web_search_maps_organic_results() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("X-API-KEY", "serper-test-key"))
        .and(body_partial_json(json!({
            "q": "data analyst intern New York",
            "num": 2,
            "gl": "us",
            "hl": "en"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organic": [
                {"title": "Data Analyst Intern - Acme", "link": "https://acme.example/jobs/1", "snippet": "Summer 2025"},
                {"title": "Missing link"},
                {"title": "Analytics Associate - Harbor", "link": "https://harbor.example/careers/7"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = tool_system(&server)
        .execute_tool(
            "web_search",
            &json!({"query": "data analyst intern New York", "num_results": 2}),
        )
        .await
        .unwrap();

    assert_eq!(result["query"], "data analyst intern New York");
    assert_eq!(
        result["results"],
        json!([
            {"title": "Data Analyst Intern - Acme", "url": "https://acme.example/jobs/1", "snippet": "Summer 2025"},
            {"title": "Analytics Associate - Harbor", "url": "https://harbor.example/careers/7", "snippet": ""}
        ])
    );
}

#[tokio::test]
async fn test_web_search_api_error_is_execution_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let err = tool_system(&server)
        .execute_tool("web_search", &json!({"query": "quant intern"}))
        .await
        .unwrap_err();

    match err {
        ToolError::ExecutionError(msg) => {
            assert!(msg.contains("403"));
            assert!(msg.contains("invalid key"));
        }
        other => panic!("Expected ExecutionError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_parameters_never_reach_the_api() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"organic": []})))
        .expect(0)
        .mount(&server)
        .await;

    let tools = tool_system(&server);
    for params in [
        json!({}),
        json!({"query": ""}),
        json!({"query": "x", "num_results": 0}),
        json!({"query": "x", "site": "linkedin.com"}),
    ] {
        let err = tools.execute_tool("web_search", &params).await.unwrap_err();
        assert!(
            matches!(err, ToolError::ValidationError(_)),
            "{params} should fail validation, got {err:?}"
        );
    }
}

#[tokio::test]
async fn test_unknown_tool() {
    let server = MockServer::start().await;
    let err = tool_system(&server)
        .execute_tool("file_write", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::UnknownTool(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scrape_returns_page_text() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/careers"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><head><title>Careers</title><style>p { color: red; }</style></head>\
             <body><h1>Open roles</h1><p>Data Analyst Intern</p><p>Apply by March 1</p></body></html>",
            "text/html",
        ))
        .mount(&server)
        .await;

    let url = format!("{}/careers", server.uri());
    let result = tool_system(&server)
        .execute_tool("scrape_website", &json!({"url": url}))
        .await
        .unwrap();

    assert_eq!(result["status"], 200);
    assert_eq!(result["url"], url);
    assert_eq!(result["truncated"], false);
    let content = result["content"].as_str().unwrap();
    assert!(!content.contains("color: red"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scrape_rejects_oversized_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&server)
        .await;

    let scrape = ScrapeSection {
        max_response_size: 1024,
        timeout_secs: 5,
        ..Default::default()
    };
    let tools = ToolSystem::new().with_tool(Arc::new(ScrapeWebsiteTool::new(&scrape).unwrap()));

    let err = tools
        .execute_tool("scrape_website", &json!({"url": format!("{}/huge", server.uri())}))
        .await
        .unwrap_err();

    assert!(matches!(err, ToolError::ExecutionError(msg) if msg.contains("too large")));
}

#[tokio::test]
async fn test_scrape_rejects_non_http_urls() {
    let server = MockServer::start().await;
    let err = tool_system(&server)
        .execute_tool("scrape_website", &json!({"url": "file:///etc/passwd"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::ExecutionError(msg) if msg.contains("scheme")));
}

//! `web_search` tool backed by Tavily

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{ToolHandler, json_schema};
use crate::tavily::{DEFAULT_MAX_RESULTS, TavilyClient};

const MAX_RESULTS_CAP: u64 = 20;

pub struct WebSearchTool {
    tavily: Arc<TavilyClient>,
    max_results: u32,
}

/// What the model sees for each hit
#[derive(Debug, Serialize)]
struct SearchHit<'a> {
    url: &'a str,
    content: &'a str,
}

impl WebSearchTool {
    pub fn new(tavily: Arc<TavilyClient>) -> Self {
        Self {
            tavily,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Input should be a search query. \
         Returns a JSON list of results, each with the page url and extracted content."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results (1-20)"
                }
            }),
            vec!["query"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let query = input
            .get("query")
            .and_then(|v| v.as_str())
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| anyhow!("Missing 'query' parameter"))?;
        let max_results = input
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|n| n.clamp(1, MAX_RESULTS_CAP) as u32)
            .unwrap_or(self.max_results);

        debug!("web_search: {}", query);
        let response = self.tavily.search(query, max_results).await?;
        let hits: Vec<SearchHit<'_>> = response
            .results
            .iter()
            .map(|r| SearchHit {
                url: &r.url,
                content: &r.content,
            })
            .collect();

        if hits.is_empty() {
            return Ok(format!("No results found for '{}'", query));
        }
        Ok(serde_json::to_string(&hits)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn tool_for(server: &MockServer) -> WebSearchTool {
        let client = TavilyClient::new("tvly-test").unwrap().with_base_url(server.uri());
        WebSearchTool::new(Arc::new(client))
    }

    #[tokio::test]
    async fn test_results_formatted_as_url_content_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({"query": "axum 0.8", "max_results": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"title": "axum", "url": "https://docs.rs/axum", "content": "Web framework", "score": 0.9}
                ]
            })))
            .mount(&server)
            .await;

        let output = tool_for(&server)
            .await
            .execute(json!({"query": "axum 0.8"}))
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(
            parsed,
            json!([{"url": "https://docs.rs/axum", "content": "Web framework"}])
        );
    }

    #[tokio::test]
    async fn test_max_results_clamped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"max_results": 20})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(1)
            .mount(&server)
            .await;

        let output = tool_for(&server)
            .await
            .execute(json!({"query": "rust", "max_results": 500}))
            .await
            .unwrap();
        assert_eq!(output, "No results found for 'rust'");
    }

    #[tokio::test]
    async fn test_missing_query() {
        let tool = WebSearchTool::new(Arc::new(TavilyClient::new("k").unwrap()));
        assert!(tool.execute(json!({})).await.is_err());
        assert!(tool.execute(json!({"query": ""})).await.is_err());
    }
}

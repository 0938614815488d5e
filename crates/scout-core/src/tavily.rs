//! Tavily search API client

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TAVILY_URL: &str = "https://api.tavily.com";
pub const DEFAULT_MAX_RESULTS: u32 = 5;

#[derive(Clone)]
pub struct TavilyClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for TavilyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: u32,
    search_depth: &'a str,
}

/// Response of `POST /search`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TavilyResponse {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<TavilyResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TavilyResult {
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_TAVILY_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn search(&self, query: &str, max_results: u32) -> Result<TavilyResponse> {
        if query.trim().is_empty() {
            return Err(anyhow!("Search query is empty"));
        }

        debug!("Tavily search: {} (max_results={})", query, max_results);
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&SearchRequest {
                query,
                max_results,
                search_depth: "basic",
            })
            .send()
            .await
            .context("Failed to send request to Tavily API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Tavily search failed with status {}: {}",
                status,
                body
            ));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .context("Failed to parse Tavily response")?;
        debug!("Tavily returned {} results", parsed.results.len());
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("authorization", "Bearer tvly-test"))
            .and(body_json(json!({
                "query": "rust async",
                "max_results": 2,
                "search_depth": "basic"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": "rust async",
                "results": [
                    {"title": "Tokio", "url": "https://tokio.rs", "content": "An async runtime", "score": 0.98},
                    {"title": "Async book", "url": "https://rust-lang.github.io/async-book", "content": "Async Rust"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TavilyClient::new("tvly-test").unwrap().with_base_url(server.uri());
        let response = client.search("rust async", 2).await.unwrap();
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].url, "https://tokio.rs");
        assert_eq!(response.results[1].score, 0.0);
        assert!(response.answer.is_none());
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(432).set_body_string("plan limit exceeded"))
            .mount(&server)
            .await;

        let client = TavilyClient::new("tvly-test").unwrap().with_base_url(server.uri());
        let err = client.search("anything", 5).await.unwrap_err();
        assert!(err.to_string().contains("plan limit exceeded"));
    }

    #[tokio::test]
    async fn test_empty_query_rejected_locally() {
        let client = TavilyClient::new("tvly-test")
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        assert!(client.search("  ", 5).await.is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let client = TavilyClient::new("tvly-secret").unwrap();
        assert!(!format!("{:?}", client).contains("tvly-secret"));
    }
}

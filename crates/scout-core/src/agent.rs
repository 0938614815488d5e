//! The search agent: one query in, one answer out

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::providers::LlmProvider;
use crate::tavily::TavilyClient;
use crate::tool_loop::run_tool_loop;
use crate::tools::ToolRegistry;
use crate::tools::search::WebSearchTool;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a web research assistant. \
Use the web_search tool to find current information, then answer the user's query \
concisely. Cite the URLs your answer relies on.";

/// Result of one search, as returned to HTTP and agent callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SearchOutcome {
    Success { result: String },
    Error { error: String },
}

impl SearchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Success { result } => serde_json::json!({"status": "success", "result": result}),
            Self::Error { error } => serde_json::json!({"status": "error", "error": error}),
        }
    }
}

pub struct SearchAgent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
}

impl SearchAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Agent whose only tool is `web_search` over `tavily`
    pub fn with_tavily(provider: Arc<dyn LlmProvider>, tavily: Arc<TavilyClient>) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(WebSearchTool::new(tavily)));
        Self::new(provider, Arc::new(registry))
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Run the tool loop for `query`; failures become an error outcome
    pub async fn search(&self, query: &str) -> SearchOutcome {
        info!("Searching: {}", query);
        match run_tool_loop(
            self.provider.as_ref(),
            query,
            &self.system_prompt,
            self.tools.as_ref(),
        )
        .await
        {
            Ok((result, usage)) => {
                info!(
                    "Search finished (tokens: in={} out={})",
                    usage.input_tokens, usage.output_tokens
                );
                SearchOutcome::Success { result }
            }
            Err(e) => {
                error!("Search failed: {:#}", e);
                SearchOutcome::Error {
                    error: format!("{:#}", e),
                }
            }
        }
    }

    /// Handle a `{"query": ...}` request body
    pub async fn handle_request(&self, body: &Value) -> Value {
        match body.get("query").and_then(|q| q.as_str()).map(str::trim) {
            Some(query) if !query.is_empty() => self.search(query).await.to_value(),
            _ => serde_json::json!({"error": "Missing search query"}),
        }
    }
}

impl std::fmt::Debug for SearchAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchAgent")
            .field("provider", &self.provider.provider_name())
            .field("model", &self.provider.model())
            .field("tools", &self.tools.len())
            .finish()
    }
}

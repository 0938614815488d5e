//! scout-core - the search side of the scout agent
//!
//! This crate provides:
//! - An OpenAI chat provider behind the [`LlmProvider`] trait
//! - A tool registry with a Tavily-backed `web_search` tool
//! - The tool-use loop that lets the model search before answering
//! - [`SearchAgent`], which turns a query into a [`SearchOutcome`]

pub mod agent;
pub mod providers;
pub mod tavily;
pub mod tool_loop;
pub mod tools;

pub use agent::{DEFAULT_SYSTEM_PROMPT, SearchAgent, SearchOutcome};
pub use providers::{LlmProvider, OpenAiProvider, ToolDefinition};
pub use tavily::{TavilyClient, TavilyResponse, TavilyResult};
pub use tool_loop::run_tool_loop;
pub use tools::{ToolExecutor, ToolHandler, ToolRegistry};

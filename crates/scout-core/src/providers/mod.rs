//! LLM provider abstraction
//!
//! Providers implement [`LlmProvider`]; the search agent only needs chat with tools.

pub mod openai;
pub mod types;

pub use openai::OpenAiProvider;
pub use types::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponse, ChatResponseBlock, ChatRole,
    ChatUsage, LlmProvider, StopReason, ToolDefinition,
};

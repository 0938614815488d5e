//! Provider-agnostic chat types

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool the model may call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Provider-agnostic chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: ChatMessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: ChatMessageContent::Text(text.into()),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// Plain text or structured blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatMessageContent {
    Text(String),
    Blocks(Vec<ChatBlock>),
}

/// A single block within a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatBlock {
    Text { text: String },
    ToolCall { id: String, name: String, input: Value },
    ToolResult { tool_call_id: String, content: String },
}

/// Provider-agnostic response from an LLM
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub blocks: Vec<ChatResponseBlock>,
    pub stop_reason: StopReason,
    pub usage: ChatUsage,
}

impl ChatResponse {
    /// Text blocks joined by newlines
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ChatResponseBlock::Text { text } => Some(text.as_str()),
                ChatResponseBlock::ToolCall { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A block in the response
#[derive(Debug, Clone)]
pub enum ChatResponseBlock {
    Text { text: String },
    ToolCall { id: String, name: String, input: Value },
}

impl From<ChatResponseBlock> for ChatBlock {
    fn from(block: ChatResponseBlock) -> Self {
        match block {
            ChatResponseBlock::Text { text } => ChatBlock::Text { text },
            ChatResponseBlock::ToolCall { id, name, input } => ChatBlock::ToolCall { id, name, input },
        }
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Unknown,
}

/// Token usage, per call or summed over a loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl ChatUsage {
    pub fn add(&mut self, other: ChatUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// Trait that all LLM providers implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "openai")
    fn provider_name(&self) -> &str;

    fn model(&self) -> &str;

    /// Send a chat request with optional tools and system prompt
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ChatResponse>;
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

impl StopReason {
    /// Whether the model wants to call tools
    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse)
    }
}

//! OpenAI chat completions provider

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::types::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponse, ChatResponseBlock, ChatRole,
    ChatUsage, LlmProvider, StopReason, ToolDefinition,
};

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, base_url: String, max_tokens: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_tokens,
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ChatResponse> {
        let request = CompletionRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: wire_messages(system, messages),
            tools: tools.iter().map(WireTool::from).collect(),
        };
        debug!(
            "OpenAI request: model={}, messages={}, tools={}",
            self.model,
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "OpenAI API request failed with status {}: {}",
                status,
                body
            ));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI API response")?;
        ChatResponse::try_from(completion)
    }
}

/// System prompt first, then the conversation. Tool results become
/// `tool` messages in the order the model asked for them.
fn wire_messages(system: &str, messages: &[ChatMessage]) -> Vec<WireMessage> {
    let mut wire = vec![WireMessage::text("system", system)];
    for message in messages {
        match (&message.role, &message.content) {
            (role, ChatMessageContent::Text(text)) => {
                wire.push(WireMessage::text(&role.to_string(), text));
            }
            (ChatRole::Assistant, ChatMessageContent::Blocks(blocks)) => {
                wire.push(assistant_turn(blocks));
            }
            (role, ChatMessageContent::Blocks(blocks)) => {
                wire.extend(blocks.iter().filter_map(|block| match block {
                    ChatBlock::ToolResult {
                        tool_call_id,
                        content,
                    } => Some(WireMessage {
                        role: "tool".to_string(),
                        content: Some(content.clone()),
                        tool_calls: None,
                        tool_call_id: Some(tool_call_id.clone()),
                    }),
                    ChatBlock::Text { text } => Some(WireMessage::text(&role.to_string(), text)),
                    ChatBlock::ToolCall { .. } => None,
                }));
            }
        }
    }
    wire
}

/// One assistant message carrying its text (if any) and every tool call
fn assistant_turn(blocks: &[ChatBlock]) -> WireMessage {
    let text: Vec<&str> = blocks
        .iter()
        .filter_map(|block| match block {
            ChatBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    let calls: Vec<WireToolCall> = blocks
        .iter()
        .filter_map(|block| match block {
            ChatBlock::ToolCall { id, name, input } => Some(WireToolCall {
                id: id.clone(),
                kind: "function".to_string(),
                function: WireFunction {
                    name: name.clone(),
                    arguments: input.to_string(),
                },
            }),
            _ => None,
        })
        .collect();

    WireMessage {
        role: "assistant".to_string(),
        content: (!text.is_empty()).then(|| text.join("\n")),
        tool_calls: (!calls.is_empty()).then_some(calls),
        tool_call_id: None,
    }
}

fn stop_reason(finish_reason: Option<&str>) -> StopReason {
    match finish_reason {
        Some("tool_calls") => StopReason::ToolUse,
        Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        _ => StopReason::Unknown,
    }
}

impl TryFrom<CompletionResponse> for ChatResponse {
    type Error = anyhow::Error;

    fn try_from(completion: CompletionResponse) -> Result<Self> {
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("OpenAI response had no choices"))?;
        debug!("OpenAI finish_reason={:?}", choice.finish_reason);

        let text = choice
            .message
            .content
            .filter(|c| !c.is_empty())
            .map(|text| ChatResponseBlock::Text { text });
        let calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ChatResponseBlock::ToolCall {
                id: call.id,
                name: call.function.name,
                // Malformed arguments reach the tool as an empty object
                input: serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| Value::Object(serde_json::Map::new())),
            });

        Ok(ChatResponse {
            blocks: text.into_iter().chain(calls).collect(),
            stop_reason: stop_reason(choice.finish_reason.as_deref()),
            usage: completion
                .usage
                .map(|u| ChatUsage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                })
                .unwrap_or_default(),
        })
    }
}

// ── Wire types ──

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

/// `{"type": "function", "function": {name, description, parameters}}`
#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: serde_json::json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
